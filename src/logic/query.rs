use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{CatalogError, CatalogResult};
use crate::logic::pagination::{Page, PageBase, PageLimits};
use crate::logic::projection::{self, ActorView, GenreView, MovieView, Related};
use crate::model::{EntityKind, Id, Movie};
use crate::store::{CatalogStore, UnitOfWork};

/// Resolve the genres and actors a batch of movies refers to and project them
pub(crate) async fn project_movies(
    uow: &mut dyn UnitOfWork,
    movies: &[Movie],
) -> CatalogResult<Vec<MovieView>> {
    if movies.is_empty() {
        return Ok(Vec::new());
    }
    let genre_ids: Vec<Id> = movies
        .iter()
        .map(|m| m.genre_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let actor_ids: Vec<Id> = movies
        .iter()
        .flat_map(|m| m.actor_ids.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let genres = uow.find_genres(&genre_ids).await?;
    let actors = if actor_ids.is_empty() {
        Vec::new()
    } else {
        uow.find_actors(&actor_ids).await?
    };
    projection::movie_views(movies, &Related::new(genres, actors))
}

/// Read side of the catalog: lookups, listings and filtered searches.
///
/// Page conventions per operation:
/// - `list_movies`, `list_genres`: zero-based, unpaged unless both values given
/// - `list_actors`: one-based, unpaged unless both values given
/// - `search_actors_by_name` and every movie search: zero-based, page 0 and
///   the configured default size when omitted
pub struct QueryEngine<S: CatalogStore> {
    store: Arc<S>,
    limits: PageLimits,
}

impl<S: CatalogStore> QueryEngine<S> {
    pub fn new(store: Arc<S>, limits: PageLimits) -> Self {
        Self { store, limits }
    }

    pub async fn get_movie(&self, id: Id) -> CatalogResult<MovieView> {
        let mut uow = self.store.read().await?;
        let movie = uow
            .get_movie(id)
            .await?
            .ok_or(CatalogError::not_found(EntityKind::Movie, id))?;
        let mut views = project_movies(&mut *uow, &[movie]).await?;
        views
            .pop()
            .ok_or_else(|| CatalogError::inconsistent(format!("movie {} vanished during projection", id)))
    }

    pub async fn list_movies(&self, page: Option<i64>, size: Option<i64>) -> CatalogResult<Vec<MovieView>> {
        let request = self.limits.optional(page, size, PageBase::Zero)?;
        let mut uow = self.store.read().await?;
        let movies = uow.list_movies(request.map(|r| r.window())).await?;
        project_movies(&mut *uow, &movies).await
    }

    pub async fn search_movies_by_title(
        &self,
        title: &str,
        page: Option<i64>,
        size: Option<i64>,
    ) -> CatalogResult<Page<MovieView>> {
        let request = self.limits.with_defaults(page, size, PageBase::Zero)?;
        let mut uow = self.store.read().await?;
        let movies = uow.movies_by_title(title, Some(request.window())).await?;
        Ok(Page::new(project_movies(&mut *uow, &movies).await?, request))
    }

    pub async fn search_movies_by_year(
        &self,
        release_year: Option<i32>,
        page: Option<i64>,
        size: Option<i64>,
    ) -> CatalogResult<Page<MovieView>> {
        let release_year =
            release_year.ok_or_else(|| CatalogError::validation("year", "is required"))?;
        let request = self.limits.with_defaults(page, size, PageBase::Zero)?;
        let mut uow = self.store.read().await?;
        let movies = uow
            .movies_by_year(release_year, Some(request.window()))
            .await?;
        Ok(Page::new(project_movies(&mut *uow, &movies).await?, request))
    }

    pub async fn movies_by_genre(
        &self,
        genre_id: Id,
        page: Option<i64>,
        size: Option<i64>,
    ) -> CatalogResult<Page<MovieView>> {
        let request = self.limits.with_defaults(page, size, PageBase::Zero)?;
        let mut uow = self.store.read().await?;
        if uow.get_genre(genre_id).await?.is_none() {
            return Err(CatalogError::not_found(EntityKind::Genre, genre_id));
        }
        let movies = uow
            .movies_by_genre(genre_id, Some(request.window()))
            .await?;
        Ok(Page::new(project_movies(&mut *uow, &movies).await?, request))
    }

    pub async fn movies_by_actor(
        &self,
        actor_id: Id,
        page: Option<i64>,
        size: Option<i64>,
    ) -> CatalogResult<Page<MovieView>> {
        let request = self.limits.with_defaults(page, size, PageBase::Zero)?;
        let mut uow = self.store.read().await?;
        if uow.get_actor(actor_id).await?.is_none() {
            return Err(CatalogError::not_found(EntityKind::Actor, actor_id));
        }
        let movies = uow
            .movies_by_actor(actor_id, Some(request.window()))
            .await?;
        Ok(Page::new(project_movies(&mut *uow, &movies).await?, request))
    }

    pub async fn actors_in_movie(&self, movie_id: Id) -> CatalogResult<Vec<ActorView>> {
        let mut uow = self.store.read().await?;
        let movie = uow
            .get_movie(movie_id)
            .await?
            .ok_or(CatalogError::not_found(EntityKind::Movie, movie_id))?;
        let actors = uow.find_actors(&movie.actor_ids).await?;
        projection::cast_views(&movie, &actors)
    }

    pub async fn get_actor(&self, id: Id) -> CatalogResult<ActorView> {
        let mut uow = self.store.read().await?;
        uow.get_actor(id)
            .await?
            .map(|actor| projection::actor_view(&actor))
            .ok_or(CatalogError::not_found(EntityKind::Actor, id))
    }

    pub async fn list_actors(&self, page: Option<i64>, size: Option<i64>) -> CatalogResult<Vec<ActorView>> {
        let request = self.limits.optional(page, size, PageBase::One)?;
        let mut uow = self.store.read().await?;
        let actors = uow.list_actors(request.map(|r| r.window())).await?;
        Ok(actors.iter().map(projection::actor_view).collect())
    }

    pub async fn search_actors_by_name(
        &self,
        name: &str,
        page: Option<i64>,
        size: Option<i64>,
    ) -> CatalogResult<Page<ActorView>> {
        let request = self.limits.with_defaults(page, size, PageBase::Zero)?;
        let mut uow = self.store.read().await?;
        let actors = uow.actors_by_name(name, Some(request.window())).await?;
        Ok(Page::new(
            actors.iter().map(projection::actor_view).collect(),
            request,
        ))
    }

    /// Genre detail view, including its movies
    pub async fn get_genre(&self, id: Id) -> CatalogResult<GenreView> {
        let mut uow = self.store.read().await?;
        let genre = uow
            .get_genre(id)
            .await?
            .ok_or(CatalogError::not_found(EntityKind::Genre, id))?;
        let movies = uow.movies_by_genre(id, None).await?;
        projection::genre_view(&genre, Some(movies.as_slice()))
    }

    pub async fn list_genres(
        &self,
        page: Option<i64>,
        size: Option<i64>,
        with_movies: bool,
    ) -> CatalogResult<Vec<GenreView>> {
        let request = self.limits.optional(page, size, PageBase::Zero)?;
        let mut uow = self.store.read().await?;
        let genres = uow.list_genres(request.map(|r| r.window())).await?;

        let mut views = Vec::with_capacity(genres.len());
        for genre in &genres {
            let view = if with_movies {
                let movies = uow.movies_by_genre(genre.id, None).await?;
                projection::genre_view(genre, Some(movies.as_slice()))?
            } else {
                projection::genre_view(genre, None)?
            };
            views.push(view);
        }
        Ok(views)
    }
}
