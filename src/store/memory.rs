use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::model::{normalize_ids, Actor, Genre, Id, Movie, NewActor, NewGenre, NewMovie};
use crate::store::traits::{ActorStore, CatalogStore, GenreStore, MovieStore, UnitOfWork, Window};

/// Movie row without its links; links live in `Tables::movie_actors`.
#[derive(Debug, Clone)]
struct MovieRow {
    title: String,
    release_year: i32,
    duration: i32,
    genre_id: Id,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    genres: BTreeMap<Id, Genre>,
    actors: BTreeMap<Id, Actor>,
    movies: BTreeMap<Id, MovieRow>,
    /// (movie_id, actor_id)
    movie_actors: BTreeSet<(Id, Id)>,
    /// (actor_id, movie_id), kept in lock-step with `movie_actors`
    actor_movies: BTreeSet<(Id, Id)>,
}

impl Tables {
    fn actor_ids_of(&self, movie_id: Id) -> Vec<Id> {
        self.movie_actors
            .range((movie_id, Id::MIN)..=(movie_id, Id::MAX))
            .map(|(_, actor_id)| *actor_id)
            .collect()
    }

    fn movie_ids_of(&self, actor_id: Id) -> Vec<Id> {
        self.actor_movies
            .range((actor_id, Id::MIN)..=(actor_id, Id::MAX))
            .map(|(_, movie_id)| *movie_id)
            .collect()
    }

    fn movie(&self, id: Id) -> Option<Movie> {
        self.movies.get(&id).map(|row| Movie {
            id,
            title: row.title.clone(),
            release_year: row.release_year,
            duration: row.duration,
            genre_id: row.genre_id,
            actor_ids: self.actor_ids_of(id),
        })
    }

    fn movies_where(&self, window: Option<Window>, keep: impl Fn(Id, &MovieRow) -> bool) -> Vec<Movie> {
        let ids = self
            .movies
            .iter()
            .filter(|(id, row)| keep(**id, row))
            .map(|(id, _)| *id);
        Window::slice(window, ids)
            .into_iter()
            .filter_map(|id| self.movie(id))
            .collect()
    }

    fn link(&mut self, movie_id: Id, actor_id: Id) {
        self.movie_actors.insert((movie_id, actor_id));
        self.actor_movies.insert((actor_id, movie_id));
    }

    fn unlink_movie(&mut self, movie_id: Id) {
        for actor_id in self.actor_ids_of(movie_id) {
            self.movie_actors.remove(&(movie_id, actor_id));
            self.actor_movies.remove(&(actor_id, movie_id));
        }
    }

    fn unlink_actor(&mut self, actor_id: Id) {
        for movie_id in self.movie_ids_of(actor_id) {
            self.movie_actors.remove(&(movie_id, actor_id));
            self.actor_movies.remove(&(actor_id, movie_id));
        }
    }

    fn check_genre(&self, genre_id: Id) -> Result<()> {
        if self.genres.contains_key(&genre_id) {
            Ok(())
        } else {
            Err(anyhow!("foreign key violation: genre {} does not exist", genre_id))
        }
    }

    fn check_actors(&self, actor_ids: &[Id]) -> Result<()> {
        match actor_ids.iter().find(|id| !self.actors.contains_key(id)) {
            Some(missing) => Err(anyhow!("foreign key violation: actor {} does not exist", missing)),
            None => Ok(()),
        }
    }

    fn check_movies(&self, movie_ids: &[Id]) -> Result<()> {
        match movie_ids.iter().find(|id| !self.movies.contains_key(id)) {
            Some(missing) => Err(anyhow!("foreign key violation: movie {} does not exist", missing)),
            None => Ok(()),
        }
    }
}

/// Identity sequences. Not part of the staged tables, so a discarded unit of
/// work never hands the same identity out twice.
#[derive(Debug, Default)]
struct Sequences {
    genre: AtomicI64,
    actor: AtomicI64,
    movie: AtomicI64,
}

impl Sequences {
    fn next(counter: &AtomicI64) -> Id {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// In-process entity store.
///
/// Readers share the tables; a writer holds the write lock for the lifetime
/// of its unit of work and stages changes on a private copy that replaces the
/// tables on commit. Opening a write unit of work copies every table, so a
/// write costs time proportional to the size of the catalog.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    sequences: Arc<Sequences>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

enum Access {
    Read(OwnedRwLockReadGuard<Tables>),
    Write {
        guard: OwnedRwLockWriteGuard<Tables>,
        staged: Tables,
    },
}

pub struct MemoryUnitOfWork {
    access: Access,
    sequences: Arc<Sequences>,
}

impl MemoryUnitOfWork {
    fn tables(&self) -> &Tables {
        match &self.access {
            Access::Read(guard) => &**guard,
            Access::Write { staged, .. } => staged,
        }
    }

    fn tables_mut(&mut self) -> Result<&mut Tables> {
        match &mut self.access {
            Access::Read(_) => Err(anyhow!("write attempted through a read-only unit of work")),
            Access::Write { staged, .. } => Ok(staged),
        }
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().write_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            access: Access::Write { guard, staged },
            sequences: self.sequences.clone(),
        }))
    }

    async fn read(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().read_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            access: Access::Read(guard),
            sequences: self.sequences.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl GenreStore for MemoryUnitOfWork {
    async fn get_genre(&mut self, id: Id) -> Result<Option<Genre>> {
        Ok(self.tables().genres.get(&id).cloned())
    }

    async fn find_genres(&mut self, ids: &[Id]) -> Result<Vec<Genre>> {
        let tables = self.tables();
        Ok(normalize_ids(ids)
            .into_iter()
            .filter_map(|id| tables.genres.get(&id).cloned())
            .collect())
    }

    async fn list_genres(&mut self, window: Option<Window>) -> Result<Vec<Genre>> {
        Ok(Window::slice(window, self.tables().genres.values().cloned()))
    }

    async fn insert_genre(&mut self, genre: &NewGenre) -> Result<Genre> {
        let id = Sequences::next(&self.sequences.genre);
        let genre = Genre {
            id,
            name: genre.name.clone(),
        };
        self.tables_mut()?.genres.insert(id, genre.clone());
        log::debug!("memory: inserted genre {}", id);
        Ok(genre)
    }

    async fn update_genre(&mut self, genre: &Genre) -> Result<()> {
        let tables = self.tables_mut()?;
        match tables.genres.get_mut(&genre.id) {
            Some(existing) => {
                *existing = genre.clone();
                Ok(())
            }
            None => Err(anyhow!("genre {} does not exist", genre.id)),
        }
    }

    async fn delete_genre(&mut self, id: Id) -> Result<bool> {
        let tables = self.tables_mut()?;
        if tables.movies.values().any(|row| row.genre_id == id) {
            return Err(anyhow!("foreign key violation: genre {} still has movies", id));
        }
        Ok(tables.genres.remove(&id).is_some())
    }
}

#[async_trait::async_trait]
impl ActorStore for MemoryUnitOfWork {
    async fn get_actor(&mut self, id: Id) -> Result<Option<Actor>> {
        Ok(self.tables().actors.get(&id).cloned())
    }

    async fn find_actors(&mut self, ids: &[Id]) -> Result<Vec<Actor>> {
        let tables = self.tables();
        Ok(normalize_ids(ids)
            .into_iter()
            .filter_map(|id| tables.actors.get(&id).cloned())
            .collect())
    }

    async fn list_actors(&mut self, window: Option<Window>) -> Result<Vec<Actor>> {
        Ok(Window::slice(window, self.tables().actors.values().cloned()))
    }

    async fn actors_by_name(&mut self, fragment: &str, window: Option<Window>) -> Result<Vec<Actor>> {
        let needle = fragment.to_lowercase();
        let matches = self
            .tables()
            .actors
            .values()
            .filter(|actor| actor.name.to_lowercase().contains(&needle))
            .cloned();
        Ok(Window::slice(window, matches))
    }

    async fn insert_actor(&mut self, actor: &NewActor) -> Result<Actor> {
        let movie_ids = normalize_ids(&actor.movie_ids);
        self.tables().check_movies(&movie_ids)?;

        let id = Sequences::next(&self.sequences.actor);
        let actor = Actor {
            id,
            name: actor.name.clone(),
            birth_date: actor.birth_date,
        };
        let tables = self.tables_mut()?;
        tables.actors.insert(id, actor.clone());
        for movie_id in movie_ids {
            tables.link(movie_id, id);
        }
        log::debug!("memory: inserted actor {}", id);
        Ok(actor)
    }

    async fn update_actor(&mut self, actor: &Actor) -> Result<()> {
        let tables = self.tables_mut()?;
        match tables.actors.get_mut(&actor.id) {
            Some(existing) => {
                *existing = actor.clone();
                Ok(())
            }
            None => Err(anyhow!("actor {} does not exist", actor.id)),
        }
    }

    async fn set_actor_movies(&mut self, actor_id: Id, movie_ids: &[Id]) -> Result<()> {
        let movie_ids = normalize_ids(movie_ids);
        self.tables().check_movies(&movie_ids)?;
        self.tables().check_actors(&[actor_id])?;

        let tables = self.tables_mut()?;
        tables.unlink_actor(actor_id);
        for movie_id in movie_ids {
            tables.link(movie_id, actor_id);
        }
        Ok(())
    }

    async fn movie_ids_for_actor(&mut self, actor_id: Id) -> Result<Vec<Id>> {
        Ok(self.tables().movie_ids_of(actor_id))
    }

    async fn delete_actor(&mut self, id: Id) -> Result<bool> {
        let tables = self.tables_mut()?;
        tables.unlink_actor(id);
        Ok(tables.actors.remove(&id).is_some())
    }
}

#[async_trait::async_trait]
impl MovieStore for MemoryUnitOfWork {
    async fn get_movie(&mut self, id: Id) -> Result<Option<Movie>> {
        Ok(self.tables().movie(id))
    }

    async fn find_movies(&mut self, ids: &[Id]) -> Result<Vec<Movie>> {
        let tables = self.tables();
        Ok(normalize_ids(ids)
            .into_iter()
            .filter_map(|id| tables.movie(id))
            .collect())
    }

    async fn list_movies(&mut self, window: Option<Window>) -> Result<Vec<Movie>> {
        Ok(self.tables().movies_where(window, |_, _| true))
    }

    async fn movies_by_genre(&mut self, genre_id: Id, window: Option<Window>) -> Result<Vec<Movie>> {
        Ok(self
            .tables()
            .movies_where(window, |_, row| row.genre_id == genre_id))
    }

    async fn movies_by_year(&mut self, release_year: i32, window: Option<Window>) -> Result<Vec<Movie>> {
        Ok(self
            .tables()
            .movies_where(window, |_, row| row.release_year == release_year))
    }

    async fn movies_by_actor(&mut self, actor_id: Id, window: Option<Window>) -> Result<Vec<Movie>> {
        let tables = self.tables();
        let movie_ids = tables.movie_ids_of(actor_id);
        Ok(Window::slice(window, movie_ids.into_iter())
            .into_iter()
            .filter_map(|id| tables.movie(id))
            .collect())
    }

    async fn movies_by_title(&mut self, fragment: &str, window: Option<Window>) -> Result<Vec<Movie>> {
        let needle = fragment.to_lowercase();
        Ok(self
            .tables()
            .movies_where(window, |_, row| row.title.to_lowercase().contains(&needle)))
    }

    async fn count_movies_for_genre(&mut self, genre_id: Id) -> Result<usize> {
        Ok(self
            .tables()
            .movies
            .values()
            .filter(|row| row.genre_id == genre_id)
            .count())
    }

    async fn insert_movie(&mut self, movie: &NewMovie) -> Result<Movie> {
        let actor_ids = normalize_ids(&movie.actor_ids);
        self.tables().check_genre(movie.genre_id)?;
        self.tables().check_actors(&actor_ids)?;

        let id = Sequences::next(&self.sequences.movie);
        let tables = self.tables_mut()?;
        tables.movies.insert(
            id,
            MovieRow {
                title: movie.title.clone(),
                release_year: movie.release_year,
                duration: movie.duration,
                genre_id: movie.genre_id,
            },
        );
        for actor_id in &actor_ids {
            tables.link(id, *actor_id);
        }
        log::debug!("memory: inserted movie {} with {} actors", id, actor_ids.len());
        Ok(Movie {
            id,
            title: movie.title.clone(),
            release_year: movie.release_year,
            duration: movie.duration,
            genre_id: movie.genre_id,
            actor_ids,
        })
    }

    async fn update_movie(&mut self, movie: &Movie) -> Result<()> {
        let actor_ids = normalize_ids(&movie.actor_ids);
        self.tables().check_genre(movie.genre_id)?;
        self.tables().check_actors(&actor_ids)?;

        let tables = self.tables_mut()?;
        let Some(row) = tables.movies.get_mut(&movie.id) else {
            return Err(anyhow!("movie {} does not exist", movie.id));
        };
        row.title = movie.title.clone();
        row.release_year = movie.release_year;
        row.duration = movie.duration;
        row.genre_id = movie.genre_id;

        tables.unlink_movie(movie.id);
        for actor_id in actor_ids {
            tables.link(movie.id, actor_id);
        }
        Ok(())
    }

    async fn delete_movie(&mut self, id: Id) -> Result<bool> {
        let tables = self.tables_mut()?;
        tables.unlink_movie(id);
        Ok(tables.movies.remove(&id).is_some())
    }
}

#[async_trait::async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        match this.access {
            Access::Write { mut guard, staged } => {
                *guard = staged;
                Ok(())
            }
            Access::Read(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_movie(title: &str, genre_id: Id, actor_ids: Vec<Id>) -> NewMovie {
        NewMovie {
            title: title.to_string(),
            release_year: 1999,
            duration: 120,
            genre_id,
            actor_ids,
        }
    }

    fn new_actor(name: &str) -> NewActor {
        NewActor {
            name: name.to_string(),
            birth_date: NaiveDate::from_ymd_opt(1964, 9, 2).unwrap(),
            movie_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();

        let mut uow = store.begin().await.unwrap();
        let genre = uow.insert_genre(&NewGenre { name: "Drama".into() }).await.unwrap();
        uow.commit().await.unwrap();

        let mut reader = store.read().await.unwrap();
        assert_eq!(reader.get_genre(genre.id).await.unwrap(), Some(genre));
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes_but_not_identities() {
        let store = MemoryStore::new();

        let mut uow = store.begin().await.unwrap();
        let discarded = uow.insert_genre(&NewGenre { name: "Noir".into() }).await.unwrap();
        drop(uow);

        let mut uow = store.begin().await.unwrap();
        assert!(uow.get_genre(discarded.id).await.unwrap().is_none());
        let kept = uow.insert_genre(&NewGenre { name: "Noir".into() }).await.unwrap();
        uow.commit().await.unwrap();

        assert!(kept.id > discarded.id);
    }

    #[tokio::test]
    async fn test_read_only_unit_of_work_rejects_writes() {
        let store = MemoryStore::new();
        let mut reader = store.read().await.unwrap();
        let err = reader
            .insert_genre(&NewGenre { name: "Drama".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn test_links_are_symmetric() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let genre = uow.insert_genre(&NewGenre { name: "Sci-Fi".into() }).await.unwrap();
        let keanu = uow.insert_actor(&new_actor("Keanu Reeves")).await.unwrap();
        let carrie = uow.insert_actor(&new_actor("Carrie-Anne Moss")).await.unwrap();
        let movie = uow
            .insert_movie(&new_movie("The Matrix", genre.id, vec![carrie.id, keanu.id, keanu.id]))
            .await
            .unwrap();

        assert_eq!(movie.actor_ids, vec![keanu.id, carrie.id]);
        assert_eq!(uow.movie_ids_for_actor(keanu.id).await.unwrap(), vec![movie.id]);

        uow.set_actor_movies(keanu.id, &[]).await.unwrap();
        let movie = uow.get_movie(movie.id).await.unwrap().unwrap();
        assert_eq!(movie.actor_ids, vec![carrie.id]);

        uow.delete_actor(carrie.id).await.unwrap();
        let movie = uow.get_movie(movie.id).await.unwrap().unwrap();
        assert!(movie.actor_ids.is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_dangling_references() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        assert!(uow.insert_movie(&new_movie("Orphan", 42, vec![])).await.is_err());

        let genre = uow.insert_genre(&NewGenre { name: "Drama".into() }).await.unwrap();
        assert!(uow.insert_movie(&new_movie("Orphan", genre.id, vec![9])).await.is_err());
    }

    #[tokio::test]
    async fn test_genre_with_movies_cannot_be_removed_directly() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let genre = uow.insert_genre(&NewGenre { name: "Drama".into() }).await.unwrap();
        let movie = uow.insert_movie(&new_movie("Heat", genre.id, vec![])).await.unwrap();

        assert!(uow.delete_genre(genre.id).await.is_err());
        assert!(uow.delete_movie(movie.id).await.unwrap());
        assert!(uow.delete_genre(genre.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_title_search_is_case_insensitive_and_ordered() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let genre = uow.insert_genre(&NewGenre { name: "Sci-Fi".into() }).await.unwrap();
        let first = uow.insert_movie(&new_movie("The Matrix", genre.id, vec![])).await.unwrap();
        uow.insert_movie(&new_movie("Inception", genre.id, vec![])).await.unwrap();
        let third = uow
            .insert_movie(&new_movie("The Matrix Reloaded", genre.id, vec![]))
            .await
            .unwrap();

        let found = uow.movies_by_title("MATRIX", None).await.unwrap();
        let ids: Vec<Id> = found.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);

        let second_page = uow
            .movies_by_title("matrix", Some(Window::new(1, 1)))
            .await
            .unwrap();
        assert_eq!(second_page[0].id, third.id);
    }
}
