use crate::model::{Actor, Genre, Id, Movie, NewActor, NewGenre, NewMovie};
use anyhow::Result;

/// A bounded slice of an ordered result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl Window {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Apply the window to an already ordered iterator
    pub fn slice<T>(window: Option<Window>, rows: impl Iterator<Item = T>) -> Vec<T> {
        match window {
            Some(w) => rows
                .skip(usize::try_from(w.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(w.limit).unwrap_or(usize::MAX))
                .collect(),
            None => rows.collect(),
        }
    }
}

#[async_trait::async_trait]
pub trait GenreStore: Send {
    async fn get_genre(&mut self, id: Id) -> Result<Option<Genre>>;
    /// Genres for the given ids that exist, ascending by id
    async fn find_genres(&mut self, ids: &[Id]) -> Result<Vec<Genre>>;
    async fn list_genres(&mut self, window: Option<Window>) -> Result<Vec<Genre>>;
    async fn insert_genre(&mut self, genre: &NewGenre) -> Result<Genre>;
    async fn update_genre(&mut self, genre: &Genre) -> Result<()>;
    /// Delete the genre row only; dependent movies must already be gone
    async fn delete_genre(&mut self, id: Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait ActorStore: Send {
    async fn get_actor(&mut self, id: Id) -> Result<Option<Actor>>;
    /// Actors for the given ids that exist, ascending by id
    async fn find_actors(&mut self, ids: &[Id]) -> Result<Vec<Actor>>;
    async fn list_actors(&mut self, window: Option<Window>) -> Result<Vec<Actor>>;
    /// Case-insensitive substring match on the actor name
    async fn actors_by_name(&mut self, fragment: &str, window: Option<Window>) -> Result<Vec<Actor>>;
    /// Persist the actor and its link rows to `movie_ids`
    async fn insert_actor(&mut self, actor: &NewActor) -> Result<Actor>;
    async fn update_actor(&mut self, actor: &Actor) -> Result<()>;
    /// Replace every link row of the actor with links to `movie_ids`
    async fn set_actor_movies(&mut self, actor_id: Id, movie_ids: &[Id]) -> Result<()>;
    async fn movie_ids_for_actor(&mut self, actor_id: Id) -> Result<Vec<Id>>;
    /// Delete the actor and its link rows
    async fn delete_actor(&mut self, id: Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait MovieStore: Send {
    async fn get_movie(&mut self, id: Id) -> Result<Option<Movie>>;
    /// Movies for the given ids that exist, ascending by id
    async fn find_movies(&mut self, ids: &[Id]) -> Result<Vec<Movie>>;
    async fn list_movies(&mut self, window: Option<Window>) -> Result<Vec<Movie>>;
    async fn movies_by_genre(&mut self, genre_id: Id, window: Option<Window>) -> Result<Vec<Movie>>;
    async fn movies_by_year(&mut self, release_year: i32, window: Option<Window>) -> Result<Vec<Movie>>;
    async fn movies_by_actor(&mut self, actor_id: Id, window: Option<Window>) -> Result<Vec<Movie>>;
    /// Case-insensitive substring match on the title
    async fn movies_by_title(&mut self, fragment: &str, window: Option<Window>) -> Result<Vec<Movie>>;
    async fn count_movies_for_genre(&mut self, genre_id: Id) -> Result<usize>;
    /// Persist the movie together with its full link-row set
    async fn insert_movie(&mut self, movie: &NewMovie) -> Result<Movie>;
    /// Overwrite the movie row and its full link-row set
    async fn update_movie(&mut self, movie: &Movie) -> Result<()>;
    /// Delete the movie and its link rows; actors are untouched
    async fn delete_movie(&mut self, id: Id) -> Result<bool>;
}

/// One atomic scope against the store. Writes become visible on `commit`;
/// dropping the unit of work discards them.
#[async_trait::async_trait]
pub trait UnitOfWork: GenreStore + ActorStore + MovieStore + Send {
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open a unit of work for writing. Writers are serialized against each
    /// other for the lifetime of the unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
    /// Open a unit of work that only reads
    async fn read(&self) -> Result<Box<dyn UnitOfWork>>;
}
