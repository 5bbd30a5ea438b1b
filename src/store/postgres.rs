use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;

use crate::model::{normalize_ids, Actor, Genre, Id, Movie, NewActor, NewGenre, NewMovie};
use crate::store::traits::{ActorStore, CatalogStore, GenreStore, MovieStore, UnitOfWork, Window};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS genres (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS actors (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        birth_date DATE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movies (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        release_year INTEGER NOT NULL CHECK (release_year >= 1888),
        duration INTEGER NOT NULL CHECK (duration > 0),
        genre_id BIGINT NOT NULL REFERENCES genres(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movie_actors (
        movie_id BIGINT NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
        actor_id BIGINT NOT NULL REFERENCES actors(id) ON DELETE CASCADE,
        PRIMARY KEY (movie_id, actor_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS movies_genre_id_idx ON movies (genre_id)",
    "CREATE INDEX IF NOT EXISTS movie_actors_actor_id_idx ON movie_actors (actor_id)",
];

const READ_SNAPSHOT: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

const MOVIE_COLUMNS: &str = "id, title, release_year, duration, genre_id";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the catalog tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create catalog schema")?;
        }
        log::info!("PostgreSQL catalog schema is ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(Box::new(PgUnitOfWork { tx, writable: true }))
    }

    async fn read(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        // One snapshot for every statement, so a multi-query read never sees
        // a delete that committed halfway through it
        sqlx::query(READ_SNAPSHOT)
            .execute(&mut *tx)
            .await
            .context("Failed to open read-only snapshot")?;
        Ok(Box::new(PgUnitOfWork {
            tx,
            writable: false,
        }))
    }
}

/// A unit of work backed by one database transaction.
///
/// In a writable unit of work, rows about to be mutated are read `FOR UPDATE`
/// and rows merely referenced are read `FOR SHARE`, so a concurrent delete of
/// a referenced entity blocks until this transaction ends.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    writable: bool,
}

impl PgUnitOfWork {
    fn for_update(&self) -> &'static str {
        if self.writable {
            " FOR UPDATE"
        } else {
            ""
        }
    }

    fn for_share(&self) -> &'static str {
        if self.writable {
            " FOR SHARE"
        } else {
            ""
        }
    }

    /// Load the link rows for a batch of movie rows and assemble entities
    async fn assemble_movies(&mut self, rows: Vec<PgRow>) -> Result<Vec<Movie>> {
        let ids: Vec<Id> = rows.iter().map(|row| row.get("id")).collect();
        let mut links: HashMap<Id, Vec<Id>> = HashMap::new();
        if !ids.is_empty() {
            let link_rows = sqlx::query(
                "SELECT movie_id, actor_id FROM movie_actors WHERE movie_id = ANY($1) ORDER BY movie_id, actor_id",
            )
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to fetch movie actor links")?;

            for row in link_rows {
                links
                    .entry(row.get("movie_id"))
                    .or_default()
                    .push(row.get("actor_id"));
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id: Id = row.get("id");
                Movie {
                    id,
                    title: row.get("title"),
                    release_year: row.get("release_year"),
                    duration: row.get("duration"),
                    genre_id: row.get("genre_id"),
                    actor_ids: links.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn write_links_for_movie(&mut self, movie_id: Id, actor_ids: &[Id]) -> Result<()> {
        sqlx::query("DELETE FROM movie_actors WHERE movie_id = $1")
            .bind(movie_id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to clear movie actor links")?;

        if !actor_ids.is_empty() {
            sqlx::query(
                "INSERT INTO movie_actors (movie_id, actor_id) SELECT $1, actor_id FROM UNNEST($2::BIGINT[]) AS actor_id",
            )
            .bind(movie_id)
            .bind(actor_ids)
            .execute(&mut *self.tx)
            .await
            .context("Failed to write movie actor links")?;
        }
        Ok(())
    }
}

fn genre_from_row(row: &PgRow) -> Genre {
    Genre {
        id: row.get("id"),
        name: row.get("name"),
    }
}

fn actor_from_row(row: &PgRow) -> Actor {
    Actor {
        id: row.get("id"),
        name: row.get("name"),
        birth_date: row.get("birth_date"),
    }
}

/// LIMIT/OFFSET bind values; a NULL limit means no limit
fn limit_offset(window: Option<Window>) -> (Option<i64>, i64) {
    match window {
        Some(w) => (
            Some(i64::try_from(w.limit).unwrap_or(i64::MAX)),
            i64::try_from(w.offset).unwrap_or(i64::MAX),
        ),
        None => (None, 0),
    }
}

/// Escape LIKE metacharacters so user input only matches literally
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait::async_trait]
impl GenreStore for PgUnitOfWork {
    async fn get_genre(&mut self, id: Id) -> Result<Option<Genre>> {
        let sql = format!("SELECT id, name FROM genres WHERE id = $1{}", self.for_update());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to fetch genre")?;
        Ok(row.as_ref().map(genre_from_row))
    }

    async fn find_genres(&mut self, ids: &[Id]) -> Result<Vec<Genre>> {
        let sql = format!(
            "SELECT id, name FROM genres WHERE id = ANY($1) ORDER BY id{}",
            self.for_share()
        );
        let rows = sqlx::query(&sql)
            .bind(normalize_ids(ids))
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to fetch genres")?;
        Ok(rows.iter().map(genre_from_row).collect())
    }

    async fn list_genres(&mut self, window: Option<Window>) -> Result<Vec<Genre>> {
        let (limit, offset) = limit_offset(window);
        let rows = sqlx::query("SELECT id, name FROM genres ORDER BY id LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to list genres")?;
        Ok(rows.iter().map(genre_from_row).collect())
    }

    async fn insert_genre(&mut self, genre: &NewGenre) -> Result<Genre> {
        let row = sqlx::query("INSERT INTO genres (name) VALUES ($1) RETURNING id, name")
            .bind(&genre.name)
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to insert genre")?;
        Ok(genre_from_row(&row))
    }

    async fn update_genre(&mut self, genre: &Genre) -> Result<()> {
        sqlx::query("UPDATE genres SET name = $2 WHERE id = $1")
            .bind(genre.id)
            .bind(&genre.name)
            .execute(&mut *self.tx)
            .await
            .context("Failed to update genre")?;
        Ok(())
    }

    async fn delete_genre(&mut self, id: Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM genres WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete genre")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl ActorStore for PgUnitOfWork {
    async fn get_actor(&mut self, id: Id) -> Result<Option<Actor>> {
        let sql = format!(
            "SELECT id, name, birth_date FROM actors WHERE id = $1{}",
            self.for_update()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to fetch actor")?;
        Ok(row.as_ref().map(actor_from_row))
    }

    async fn find_actors(&mut self, ids: &[Id]) -> Result<Vec<Actor>> {
        let sql = format!(
            "SELECT id, name, birth_date FROM actors WHERE id = ANY($1) ORDER BY id{}",
            self.for_share()
        );
        let rows = sqlx::query(&sql)
            .bind(normalize_ids(ids))
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to fetch actors")?;
        Ok(rows.iter().map(actor_from_row).collect())
    }

    async fn list_actors(&mut self, window: Option<Window>) -> Result<Vec<Actor>> {
        let (limit, offset) = limit_offset(window);
        let rows =
            sqlx::query("SELECT id, name, birth_date FROM actors ORDER BY id LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut *self.tx)
                .await
                .context("Failed to list actors")?;
        Ok(rows.iter().map(actor_from_row).collect())
    }

    async fn actors_by_name(&mut self, fragment: &str, window: Option<Window>) -> Result<Vec<Actor>> {
        let (limit, offset) = limit_offset(window);
        let rows = sqlx::query(
            "SELECT id, name, birth_date FROM actors WHERE name ILIKE $1 ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(like_pattern(fragment))
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to search actors by name")?;
        Ok(rows.iter().map(actor_from_row).collect())
    }

    async fn insert_actor(&mut self, actor: &NewActor) -> Result<Actor> {
        let row = sqlx::query(
            "INSERT INTO actors (name, birth_date) VALUES ($1, $2) RETURNING id, name, birth_date",
        )
        .bind(&actor.name)
        .bind(actor.birth_date)
        .fetch_one(&mut *self.tx)
        .await
        .context("Failed to insert actor")?;
        let inserted = actor_from_row(&row);

        self.set_actor_movies(inserted.id, &actor.movie_ids).await?;
        Ok(inserted)
    }

    async fn update_actor(&mut self, actor: &Actor) -> Result<()> {
        sqlx::query("UPDATE actors SET name = $2, birth_date = $3 WHERE id = $1")
            .bind(actor.id)
            .bind(&actor.name)
            .bind(actor.birth_date)
            .execute(&mut *self.tx)
            .await
            .context("Failed to update actor")?;
        Ok(())
    }

    async fn set_actor_movies(&mut self, actor_id: Id, movie_ids: &[Id]) -> Result<()> {
        sqlx::query("DELETE FROM movie_actors WHERE actor_id = $1")
            .bind(actor_id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to clear actor movie links")?;

        let movie_ids = normalize_ids(movie_ids);
        if !movie_ids.is_empty() {
            sqlx::query(
                "INSERT INTO movie_actors (movie_id, actor_id) SELECT movie_id, $1 FROM UNNEST($2::BIGINT[]) AS movie_id",
            )
            .bind(actor_id)
            .bind(&movie_ids)
            .execute(&mut *self.tx)
            .await
            .context("Failed to write actor movie links")?;
        }
        Ok(())
    }

    async fn movie_ids_for_actor(&mut self, actor_id: Id) -> Result<Vec<Id>> {
        let rows =
            sqlx::query("SELECT movie_id FROM movie_actors WHERE actor_id = $1 ORDER BY movie_id")
                .bind(actor_id)
                .fetch_all(&mut *self.tx)
                .await
                .context("Failed to fetch actor movie links")?;
        Ok(rows.iter().map(|row| row.get("movie_id")).collect())
    }

    async fn delete_actor(&mut self, id: Id) -> Result<bool> {
        sqlx::query("DELETE FROM movie_actors WHERE actor_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete actor movie links")?;
        let result = sqlx::query("DELETE FROM actors WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete actor")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl MovieStore for PgUnitOfWork {
    async fn get_movie(&mut self, id: Id) -> Result<Option<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies WHERE id = $1{}",
            MOVIE_COLUMNS,
            self.for_update()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to fetch movie")?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(self.assemble_movies(vec![row]).await?.pop())
    }

    async fn find_movies(&mut self, ids: &[Id]) -> Result<Vec<Movie>> {
        let sql = format!(
            "SELECT {} FROM movies WHERE id = ANY($1) ORDER BY id{}",
            MOVIE_COLUMNS,
            self.for_share()
        );
        let rows = sqlx::query(&sql)
            .bind(normalize_ids(ids))
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to fetch movies")?;
        self.assemble_movies(rows).await
    }

    async fn list_movies(&mut self, window: Option<Window>) -> Result<Vec<Movie>> {
        let (limit, offset) = limit_offset(window);
        let sql = format!(
            "SELECT {} FROM movies ORDER BY id LIMIT $1 OFFSET $2",
            MOVIE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to list movies")?;
        self.assemble_movies(rows).await
    }

    async fn movies_by_genre(&mut self, genre_id: Id, window: Option<Window>) -> Result<Vec<Movie>> {
        let (limit, offset) = limit_offset(window);
        let sql = format!(
            "SELECT {} FROM movies WHERE genre_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            MOVIE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(genre_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to fetch movies by genre")?;
        self.assemble_movies(rows).await
    }

    async fn movies_by_year(&mut self, release_year: i32, window: Option<Window>) -> Result<Vec<Movie>> {
        let (limit, offset) = limit_offset(window);
        let sql = format!(
            "SELECT {} FROM movies WHERE release_year = $1 ORDER BY id LIMIT $2 OFFSET $3",
            MOVIE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(release_year)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to fetch movies by release year")?;
        self.assemble_movies(rows).await
    }

    async fn movies_by_actor(&mut self, actor_id: Id, window: Option<Window>) -> Result<Vec<Movie>> {
        let (limit, offset) = limit_offset(window);
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.title, m.release_year, m.duration, m.genre_id
            FROM movies m
            JOIN movie_actors ma ON ma.movie_id = m.id
            WHERE ma.actor_id = $1
            ORDER BY m.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(actor_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to fetch movies by actor")?;
        self.assemble_movies(rows).await
    }

    async fn movies_by_title(&mut self, fragment: &str, window: Option<Window>) -> Result<Vec<Movie>> {
        let (limit, offset) = limit_offset(window);
        let sql = format!(
            "SELECT {} FROM movies WHERE title ILIKE $1 ORDER BY id LIMIT $2 OFFSET $3",
            MOVIE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(like_pattern(fragment))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await
            .context("Failed to search movies by title")?;
        self.assemble_movies(rows).await
    }

    async fn count_movies_for_genre(&mut self, genre_id: Id) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies WHERE genre_id = $1")
            .bind(genre_id)
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to count movies for genre")?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn insert_movie(&mut self, movie: &NewMovie) -> Result<Movie> {
        let sql = format!(
            "INSERT INTO movies (title, release_year, duration, genre_id) VALUES ($1, $2, $3, $4) RETURNING {}",
            MOVIE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&movie.title)
            .bind(movie.release_year)
            .bind(movie.duration)
            .bind(movie.genre_id)
            .fetch_one(&mut *self.tx)
            .await
            .context("Failed to insert movie")?;
        let id: Id = row.get("id");

        let actor_ids = normalize_ids(&movie.actor_ids);
        self.write_links_for_movie(id, &actor_ids).await?;

        Ok(Movie {
            id,
            title: row.get("title"),
            release_year: row.get("release_year"),
            duration: row.get("duration"),
            genre_id: row.get("genre_id"),
            actor_ids,
        })
    }

    async fn update_movie(&mut self, movie: &Movie) -> Result<()> {
        sqlx::query(
            "UPDATE movies SET title = $2, release_year = $3, duration = $4, genre_id = $5 WHERE id = $1",
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(movie.release_year)
        .bind(movie.duration)
        .bind(movie.genre_id)
        .execute(&mut *self.tx)
        .await
        .context("Failed to update movie")?;

        self.write_links_for_movie(movie.id, &normalize_ids(&movie.actor_ids))
            .await
    }

    async fn delete_movie(&mut self, id: Id) -> Result<bool> {
        sqlx::query("DELETE FROM movie_actors WHERE movie_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete movie actor links")?;
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete movie")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx
            .commit()
            .await
            .context("Failed to commit transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("matrix"), "%matrix%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("c:\\"), "%c:\\\\%");
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(limit_offset(None), (None, 0));
        assert_eq!(limit_offset(Some(Window::new(20, 10))), (Some(10), 20));
    }
}
