use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CatalogError;
use crate::logic::{
    ActorView, AssociationManager, GenreView, MovieView, Page, PageLimits, QueryEngine,
};
use crate::model::{ActorUpdate, GenreUpdate, Id, MovieUpdate, NewActor, NewGenre, NewMovie};
use crate::store::CatalogStore;

/// Services shared by every handler, wired once at start-up
pub struct Catalog<S: CatalogStore> {
    pub associations: AssociationManager<S>,
    pub queries: QueryEngine<S>,
}

impl<S: CatalogStore> Catalog<S> {
    pub fn new(store: Arc<S>, limits: PageLimits) -> Self {
        Self {
            associations: AssociationManager::new(store.clone()),
            queries: QueryEngine::new(store, limits),
        }
    }
}

pub type AppState<S> = Arc<Catalog<S>>;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(message: &str, kind: &str) -> Self {
        Self {
            error: message.to_string(),
            kind: kind.to_string(),
        }
    }
}

fn status_for(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
        CatalogError::Validation { .. } => StatusCode::BAD_REQUEST,
        CatalogError::Conflict { .. } => StatusCode::CONFLICT,
        CatalogError::Inconsistent { .. } | CatalogError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: CatalogError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&err);
    if status.is_server_error() {
        log::error!("Request failed: {:#}", err);
    }
    (
        status,
        Json(ErrorResponse::new(&err.to_string(), err.kind_name())),
    )
}

/// Unwrap a JSON body, reporting a malformed one as a validation failure
/// rather than axum's plain-text 422
fn json_body<T>(payload: Result<RequestJson<T>, JsonRejection>) -> ApiResult<T> {
    match payload {
        Ok(RequestJson(value)) => Ok(value),
        Err(rejection) => {
            let reason = rejection.body_text();
            let field = missing_field(&reason).unwrap_or("body").to_string();
            Err(error_response(CatalogError::validation(field, reason)))
        }
    }
}

/// serde reports absent fields as "missing field `name`"
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.split("missing field `").nth(1)?;
    rest.split('`').next()
}

// Query parameters

/// `page`/`size` listing; both are needed to select a window
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TitleSearchQuery {
    pub title: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct YearSearchQuery {
    pub year: Option<i32>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GenreFilterQuery {
    #[serde(rename = "genreId")]
    pub genre_id: Id,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ActorFilterQuery {
    #[serde(rename = "actorId")]
    pub actor_id: Id,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ActorListQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenreListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// `movies` embeds each genre's movies
    pub expand: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub cascade: bool,
}

/// `GET /actors` lists every actor, or searches by name when `name` is given
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ActorListing {
    All(Vec<ActorView>),
    Search(Page<ActorView>),
}

// Movie endpoints

pub async fn create_movie<S: CatalogStore>(
    State(state): State<AppState<S>>,
    payload: Result<RequestJson<NewMovie>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MovieView>)> {
    let new_movie = json_body(payload)?;
    let movie = state
        .associations
        .create_movie(new_movie)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(movie)))
}

pub async fn get_movie<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
) -> ApiResult<Json<MovieView>> {
    state
        .queries
        .get_movie(id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_movies<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<PageQuery>,
) -> ApiResult<Json<Vec<MovieView>>> {
    state
        .queries
        .list_movies(params.page, params.size)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn search_movies_by_title<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<TitleSearchQuery>,
) -> ApiResult<Json<Page<MovieView>>> {
    let title = params
        .title
        .ok_or_else(|| error_response(CatalogError::validation("title", "is required")))?;
    state
        .queries
        .search_movies_by_title(&title, params.page, params.size)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn search_movies_by_year<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<YearSearchQuery>,
) -> ApiResult<Json<Page<MovieView>>> {
    state
        .queries
        .search_movies_by_year(params.year, params.page, params.size)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn movies_by_genre<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<GenreFilterQuery>,
) -> ApiResult<Json<Page<MovieView>>> {
    state
        .queries
        .movies_by_genre(params.genre_id, params.page, params.size)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn movies_by_actor<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<ActorFilterQuery>,
) -> ApiResult<Json<Page<MovieView>>> {
    state
        .queries
        .movies_by_actor(params.actor_id, params.page, params.size)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_movie<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
    payload: Result<RequestJson<MovieUpdate>, JsonRejection>,
) -> ApiResult<Json<MovieView>> {
    let update = json_body(payload)?;
    state
        .associations
        .update_movie(id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_movie<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
    Query(params): Query<DeleteQuery>,
) -> ApiResult<StatusCode> {
    state
        .associations
        .delete_movie(id, params.cascade)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn actors_in_movie<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<ActorView>>> {
    state
        .queries
        .actors_in_movie(id)
        .await
        .map(Json)
        .map_err(error_response)
}

// Actor endpoints

pub async fn create_actor<S: CatalogStore>(
    State(state): State<AppState<S>>,
    payload: Result<RequestJson<NewActor>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ActorView>)> {
    let new_actor = json_body(payload)?;
    let actor = state
        .associations
        .create_actor(new_actor)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(actor)))
}

pub async fn get_actor<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
) -> ApiResult<Json<ActorView>> {
    state
        .queries
        .get_actor(id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_actors<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<ActorListQuery>,
) -> ApiResult<Json<ActorListing>> {
    let listing = match params.name {
        Some(name) if !name.is_empty() => state
            .queries
            .search_actors_by_name(&name, params.page, params.size)
            .await
            .map(ActorListing::Search),
        _ => state
            .queries
            .list_actors(params.page, params.size)
            .await
            .map(ActorListing::All),
    };
    listing.map(Json).map_err(error_response)
}

pub async fn update_actor<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
    payload: Result<RequestJson<ActorUpdate>, JsonRejection>,
) -> ApiResult<Json<ActorView>> {
    let update = json_body(payload)?;
    state
        .associations
        .update_actor(id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_actor<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
    Query(params): Query<DeleteQuery>,
) -> ApiResult<StatusCode> {
    state
        .associations
        .delete_actor(id, params.cascade)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

// Genre endpoints

pub async fn create_genre<S: CatalogStore>(
    State(state): State<AppState<S>>,
    payload: Result<RequestJson<NewGenre>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GenreView>)> {
    let new_genre = json_body(payload)?;
    let genre = state
        .associations
        .create_genre(new_genre)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(genre)))
}

pub async fn get_genre<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
) -> ApiResult<Json<GenreView>> {
    state
        .queries
        .get_genre(id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_genres<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Query(params): Query<GenreListQuery>,
) -> ApiResult<Json<Vec<GenreView>>> {
    let with_movies = params.expand.as_deref() == Some("movies");
    state
        .queries
        .list_genres(params.page, params.page_size, with_movies)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_genre<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
    payload: Result<RequestJson<GenreUpdate>, JsonRejection>,
) -> ApiResult<Json<GenreView>> {
    let update = json_body(payload)?;
    state
        .associations
        .update_genre(id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_genre<S: CatalogStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
    Query(params): Query<DeleteQuery>,
) -> ApiResult<StatusCode> {
    state
        .associations
        .delete_genre(id, params.cascade)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&CatalogError::not_found(EntityKind::Movie, 1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&CatalogError::validation("size", "must be at least 1")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&CatalogError::conflict(EntityKind::Genre, 1, 2)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&CatalogError::inconsistent("dangling genre")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&CatalogError::Storage(anyhow::anyhow!("connection reset"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_carries_kind() {
        let (status, Json(body)) = error_response(CatalogError::conflict(EntityKind::Actor, 7, 3));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.kind, "conflict");
        assert_eq!(body.error, "cannot delete actor 7: it has 3 associated movies");
    }

    #[test]
    fn test_missing_field_is_named() {
        let message = "Failed to deserialize the JSON body into the target type: missing field `title` at line 1 column 45";
        assert_eq!(missing_field(message), Some("title"));
        assert_eq!(missing_field("expected value at line 1 column 1"), None);
    }

    #[test]
    fn test_cascade_defaults_to_false() {
        let params: DeleteQuery = serde_json::from_str("{}").unwrap();
        assert!(!params.cascade);
    }
}
