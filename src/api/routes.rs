use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::CatalogStore;

pub fn create_router<S: CatalogStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Movies
        .route(
            "/movies",
            post(handlers::create_movie::<S>).get(handlers::list_movies::<S>),
        )
        .route(
            "/movies/search/by-title",
            get(handlers::search_movies_by_title::<S>),
        )
        .route(
            "/movies/search/by-year",
            get(handlers::search_movies_by_year::<S>),
        )
        .route("/movies/by-genre", get(handlers::movies_by_genre::<S>))
        .route("/movies/by-actor", get(handlers::movies_by_actor::<S>))
        .route(
            "/movies/:id",
            get(handlers::get_movie::<S>)
                .patch(handlers::update_movie::<S>)
                .delete(handlers::delete_movie::<S>),
        )
        .route("/movies/:id/actors", get(handlers::actors_in_movie::<S>))
        // Actors; `GET /actors` is one-based, `GET /actors?name=` zero-based
        .route(
            "/actors",
            post(handlers::create_actor::<S>).get(handlers::list_actors::<S>),
        )
        .route(
            "/actors/:id",
            get(handlers::get_actor::<S>)
                .patch(handlers::update_actor::<S>)
                .delete(handlers::delete_actor::<S>),
        )
        // Genres
        .route(
            "/genres",
            post(handlers::create_genre::<S>).get(handlers::list_genres::<S>),
        )
        .route(
            "/genres/:id",
            get(handlers::get_genre::<S>)
                .patch(handlers::update_genre::<S>)
                .delete(handlers::delete_genre::<S>),
        )
}
