use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::error::{CatalogError, CatalogResult};
use crate::logic::projection::{self, ActorView, GenreView, MovieView, Related};
use crate::model::{
    normalize_ids, Actor, ActorUpdate, EntityKind, Genre, GenreUpdate, Id, Movie, MovieUpdate,
    NewActor, NewGenre, NewMovie, FIRST_RELEASE_YEAR,
};
use crate::store::{CatalogStore, UnitOfWork};

/// The single write path into the catalog.
///
/// Every operation runs inside one unit of work: referenced entities are
/// resolved, invariants checked and the change persisted before commit. Any
/// failure drops the unit of work, so nothing partial is ever stored.
///
/// Delete cascades are deliberately not uniform:
/// - movie and actor cascades only remove link rows; the other side survives
/// - a genre cascade deletes the genre's movies as well
pub struct AssociationManager<S: CatalogStore> {
    store: Arc<S>,
}

impl<S: CatalogStore> AssociationManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // Movies

    pub async fn create_movie(&self, new_movie: NewMovie) -> CatalogResult<MovieView> {
        let new_movie = NewMovie {
            actor_ids: normalize_ids(&new_movie.actor_ids),
            ..new_movie
        };
        validate_title(&new_movie.title)?;
        validate_release_year(new_movie.release_year)?;
        validate_duration(new_movie.duration)?;

        let mut uow = self.store.begin().await?;
        let genre = resolve_genre(&mut *uow, new_movie.genre_id).await?;
        let actors = resolve_actors(&mut *uow, &new_movie.actor_ids).await?;

        let movie = uow.insert_movie(&new_movie).await?;
        let view = projection::movie_view(&movie, &Related::new(vec![genre], actors))?;
        uow.commit().await?;

        log::info!(
            "Created movie {} '{}' with {} actors",
            movie.id,
            movie.title,
            movie.actor_ids.len()
        );
        Ok(view)
    }

    pub async fn update_movie(&self, id: Id, update: MovieUpdate) -> CatalogResult<MovieView> {
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        if let Some(release_year) = update.release_year {
            validate_release_year(release_year)?;
        }
        if let Some(duration) = update.duration {
            validate_duration(duration)?;
        }

        let mut uow = self.store.begin().await?;
        let mut movie = uow
            .get_movie(id)
            .await?
            .ok_or(CatalogError::not_found(EntityKind::Movie, id))?;

        movie.apply_update(&update);

        let genre_id = update.genre_id.unwrap_or(movie.genre_id);
        let genre = resolve_genre(&mut *uow, genre_id).await?;
        movie.genre_id = genre.id;

        let actors = match &update.actor_ids {
            // An explicit empty set cannot be told apart from a lookup that
            // matched nothing, so it is rejected the same way.
            Some(actor_ids) if actor_ids.is_empty() => {
                return Err(CatalogError::not_found_any(EntityKind::Actor));
            }
            Some(actor_ids) => {
                let actors = resolve_actors(&mut *uow, &normalize_ids(actor_ids)).await?;
                movie.actor_ids = actors.iter().map(|a| a.id).collect();
                actors
            }
            None => {
                // Locks the current cast. An actor removed by a delete that
                // committed after the movie was read took its link rows with
                // it, so the cast is whatever is still there.
                let actors = uow.find_actors(&movie.actor_ids).await?;
                movie.actor_ids = actors.iter().map(|a| a.id).collect();
                actors
            }
        };

        uow.update_movie(&movie).await?;
        let view = projection::movie_view(&movie, &Related::new(vec![genre], actors))?;
        uow.commit().await?;

        log::info!("Updated movie {}", movie.id);
        Ok(view)
    }

    pub async fn delete_movie(&self, id: Id, cascade: bool) -> CatalogResult<()> {
        let mut uow = self.store.begin().await?;
        let movie = uow
            .get_movie(id)
            .await?
            .ok_or(CatalogError::not_found(EntityKind::Movie, id))?;

        if !cascade && !movie.actor_ids.is_empty() {
            log::warn!(
                "Refusing to delete movie {}: {} actors still linked",
                id,
                movie.actor_ids.len()
            );
            return Err(CatalogError::conflict(
                EntityKind::Movie,
                id,
                movie.actor_ids.len(),
            ));
        }

        uow.delete_movie(id).await?;
        uow.commit().await?;

        log::info!(
            "Deleted movie {} (unlinked {} actors)",
            id,
            movie.actor_ids.len()
        );
        Ok(())
    }

    // Actors

    pub async fn create_actor(&self, new_actor: NewActor) -> CatalogResult<ActorView> {
        let new_actor = NewActor {
            movie_ids: normalize_ids(&new_actor.movie_ids),
            ..new_actor
        };
        validate_name(&new_actor.name)?;
        validate_birth_date(new_actor.birth_date)?;

        let mut uow = self.store.begin().await?;
        resolve_movies(&mut *uow, &new_actor.movie_ids).await?;

        let actor = uow.insert_actor(&new_actor).await?;
        uow.commit().await?;

        log::info!(
            "Created actor {} '{}' in {} movies",
            actor.id,
            actor.name,
            new_actor.movie_ids.len()
        );
        Ok(projection::actor_view(&actor))
    }

    pub async fn update_actor(&self, id: Id, update: ActorUpdate) -> CatalogResult<ActorView> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        if let Some(birth_date) = update.birth_date {
            validate_birth_date(birth_date)?;
        }

        let mut uow = self.store.begin().await?;
        let mut actor: Actor = uow
            .get_actor(id)
            .await?
            .ok_or(CatalogError::not_found(EntityKind::Actor, id))?;

        actor.apply_update(&update);
        uow.update_actor(&actor).await?;

        if let Some(movie_ids) = &update.movie_ids {
            let movie_ids = normalize_ids(movie_ids);
            resolve_movies(&mut *uow, &movie_ids).await?;
            uow.set_actor_movies(id, &movie_ids).await?;
        }
        uow.commit().await?;

        log::info!("Updated actor {}", id);
        Ok(projection::actor_view(&actor))
    }

    pub async fn delete_actor(&self, id: Id, cascade: bool) -> CatalogResult<()> {
        let mut uow = self.store.begin().await?;
        if uow.get_actor(id).await?.is_none() {
            return Err(CatalogError::not_found(EntityKind::Actor, id));
        }

        let movie_ids = uow.movie_ids_for_actor(id).await?;
        if !cascade && !movie_ids.is_empty() {
            log::warn!(
                "Refusing to delete actor {}: linked to {} movies",
                id,
                movie_ids.len()
            );
            return Err(CatalogError::conflict(EntityKind::Actor, id, movie_ids.len()));
        }

        uow.delete_actor(id).await?;
        uow.commit().await?;

        log::info!("Deleted actor {} (unlinked {} movies)", id, movie_ids.len());
        Ok(())
    }

    // Genres

    pub async fn create_genre(&self, new_genre: NewGenre) -> CatalogResult<GenreView> {
        validate_name(&new_genre.name)?;

        let mut uow = self.store.begin().await?;
        let genre = uow.insert_genre(&new_genre).await?;
        uow.commit().await?;

        log::info!("Created genre {} '{}'", genre.id, genre.name);
        projection::genre_view(&genre, None)
    }

    pub async fn update_genre(&self, id: Id, update: GenreUpdate) -> CatalogResult<GenreView> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }

        let mut uow = self.store.begin().await?;
        let mut genre: Genre = uow
            .get_genre(id)
            .await?
            .ok_or(CatalogError::not_found(EntityKind::Genre, id))?;

        genre.apply_update(update);
        uow.update_genre(&genre).await?;
        uow.commit().await?;

        log::info!("Updated genre {}", id);
        projection::genre_view(&genre, None)
    }

    /// Delete a genre. With `cascade` its movies (and their link rows) are
    /// deleted too.
    pub async fn delete_genre(&self, id: Id, cascade: bool) -> CatalogResult<()> {
        let mut uow = self.store.begin().await?;
        if uow.get_genre(id).await?.is_none() {
            return Err(CatalogError::not_found(EntityKind::Genre, id));
        }

        let dependents = uow.count_movies_for_genre(id).await?;
        if !cascade && dependents > 0 {
            log::warn!(
                "Refusing to delete genre {}: {} movies still belong to it",
                id,
                dependents
            );
            return Err(CatalogError::conflict(EntityKind::Genre, id, dependents));
        }

        let movies = uow.movies_by_genre(id, None).await?;
        for movie in &movies {
            uow.delete_movie(movie.id).await?;
        }
        uow.delete_genre(id).await?;
        uow.commit().await?;

        log::info!("Deleted genre {} and {} movies", id, movies.len());
        Ok(())
    }
}

async fn resolve_genre(uow: &mut dyn UnitOfWork, genre_id: Id) -> CatalogResult<Genre> {
    uow.get_genre(genre_id)
        .await?
        .ok_or(CatalogError::not_found(EntityKind::Genre, genre_id))
}

/// Resolve every id or fail on the first one that does not exist.
/// `ids` must already be normalized.
async fn resolve_actors(uow: &mut dyn UnitOfWork, ids: &[Id]) -> CatalogResult<Vec<Actor>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let actors = uow.find_actors(ids).await?;
    match first_missing(ids, actors.iter().map(|a| a.id)) {
        Some(missing) => Err(CatalogError::not_found(EntityKind::Actor, missing)),
        None => Ok(actors),
    }
}

async fn resolve_movies(uow: &mut dyn UnitOfWork, ids: &[Id]) -> CatalogResult<Vec<Movie>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let movies = uow.find_movies(ids).await?;
    match first_missing(ids, movies.iter().map(|m| m.id)) {
        Some(missing) => Err(CatalogError::not_found(EntityKind::Movie, missing)),
        None => Ok(movies),
    }
}

fn first_missing(requested: &[Id], found: impl Iterator<Item = Id>) -> Option<Id> {
    let found: std::collections::HashSet<Id> = found.collect();
    requested.iter().copied().find(|id| !found.contains(id))
}

fn validate_title(title: &str) -> CatalogResult<()> {
    if title.trim().is_empty() {
        return Err(CatalogError::validation("title", "Movie title is required"));
    }
    Ok(())
}

fn validate_name(name: &str) -> CatalogResult<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::validation("name", "Name is required"));
    }
    Ok(())
}

fn validate_release_year(release_year: i32) -> CatalogResult<()> {
    if release_year < FIRST_RELEASE_YEAR {
        return Err(CatalogError::validation(
            "releaseYear",
            format!("Release year must be {} or later", FIRST_RELEASE_YEAR),
        ));
    }
    Ok(())
}

fn validate_duration(duration: i32) -> CatalogResult<()> {
    if duration <= 0 {
        return Err(CatalogError::validation("duration", "Duration must be positive"));
    }
    Ok(())
}

fn validate_birth_date(birth_date: NaiveDate) -> CatalogResult<()> {
    if birth_date >= Utc::now().date_naive() {
        return Err(CatalogError::validation(
            "birthDate",
            "Birth date must be in the past",
        ));
    }
    Ok(())
}
