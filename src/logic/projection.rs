//! Client-facing views of the entity graph.
//!
//! Views are acyclic: a movie embeds its genre and actors, but an embedded
//! actor never carries its movies and an embedded genre never carries its
//! movies. Related entities are passed in already loaded; a reference that
//! cannot be satisfied is an `Inconsistent` error, never a partial view.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CatalogError, CatalogResult};
use crate::model::{Actor, Genre, Id, Movie};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieView {
    pub id: Id,
    pub title: String,
    pub release_year: i32,
    pub duration: i32,
    pub genre: GenreSummary,
    pub actors: Vec<ActorView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorView {
    pub id: Id,
    pub name: String,
    pub birth_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreSummary {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreView {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movies: Option<Vec<MovieSummary>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    pub id: Id,
    pub title: String,
    pub release_year: i32,
    pub duration: i32,
}

/// Genres and actors loaded for a batch of movies, keyed by id
#[derive(Debug, Default)]
pub struct Related {
    genres: HashMap<Id, Genre>,
    actors: HashMap<Id, Actor>,
}

impl Related {
    pub fn new(genres: Vec<Genre>, actors: Vec<Actor>) -> Self {
        Self {
            genres: genres.into_iter().map(|g| (g.id, g)).collect(),
            actors: actors.into_iter().map(|a| (a.id, a)).collect(),
        }
    }
}

pub fn actor_view(actor: &Actor) -> ActorView {
    ActorView {
        id: actor.id,
        name: actor.name.clone(),
        birth_date: actor.birth_date,
    }
}

pub fn movie_summary(movie: &Movie) -> MovieSummary {
    MovieSummary {
        id: movie.id,
        title: movie.title.clone(),
        release_year: movie.release_year,
        duration: movie.duration,
    }
}

pub fn movie_view(movie: &Movie, related: &Related) -> CatalogResult<MovieView> {
    let genre = related.genres.get(&movie.genre_id).ok_or_else(|| {
        CatalogError::inconsistent(format!(
            "movie {} references missing genre {}",
            movie.id, movie.genre_id
        ))
    })?;

    let actors = movie
        .actor_ids
        .iter()
        .map(|actor_id| {
            related.actors.get(actor_id).map(actor_view).ok_or_else(|| {
                CatalogError::inconsistent(format!(
                    "movie {} is linked to missing actor {}",
                    movie.id, actor_id
                ))
            })
        })
        .collect::<CatalogResult<Vec<_>>>()?;

    Ok(MovieView {
        id: movie.id,
        title: movie.title.clone(),
        release_year: movie.release_year,
        duration: movie.duration,
        genre: GenreSummary {
            id: genre.id,
            name: genre.name.clone(),
        },
        actors,
    })
}

pub fn movie_views(movies: &[Movie], related: &Related) -> CatalogResult<Vec<MovieView>> {
    movies.iter().map(|m| movie_view(m, related)).collect()
}

/// The actors of a movie, in the movie's link order. Every linked actor must
/// be present in `actors`.
pub fn cast_views(movie: &Movie, actors: &[Actor]) -> CatalogResult<Vec<ActorView>> {
    let by_id: HashMap<Id, &Actor> = actors.iter().map(|a| (a.id, a)).collect();
    movie
        .actor_ids
        .iter()
        .map(|actor_id| {
            by_id.get(actor_id).map(|a| actor_view(a)).ok_or_else(|| {
                CatalogError::inconsistent(format!(
                    "movie {} is linked to missing actor {}",
                    movie.id, actor_id
                ))
            })
        })
        .collect()
}

/// Genre view; `movies`, when given, must all belong to the genre.
pub fn genre_view(genre: &Genre, movies: Option<&[Movie]>) -> CatalogResult<GenreView> {
    let movies = match movies {
        Some(movies) => {
            if let Some(stray) = movies.iter().find(|m| m.genre_id != genre.id) {
                return Err(CatalogError::inconsistent(format!(
                    "movie {} listed under genre {} belongs to genre {}",
                    stray.id, genre.id, stray.genre_id
                )));
            }
            Some(movies.iter().map(movie_summary).collect())
        }
        None => None,
    };

    Ok(GenreView {
        id: genre.id,
        name: genre.name.clone(),
        movies,
    })
}
