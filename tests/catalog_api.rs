use movie_catalog::{build_app, run_server, MemoryStore, PageLimits};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    /// Start a server on an ephemeral port, backed by a fresh in-memory store
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let app = build_app(Arc::new(MemoryStore::new()), PageLimits::default());
        tokio::spawn(run_server(app, listener));

        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    async fn patch(&self, path: &str, json: Value) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    async fn create(&self, path: &str, json: Value) -> Value {
        let response = self.post(path, json).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        let response = self.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
        response.json().await.unwrap()
    }
}

fn id_of(value: &Value) -> i64 {
    value["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let client = TestClient::spawn().await;
    let body = client.get_json("/health").await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_movie_lifecycle() {
    let client = TestClient::spawn().await;

    let genre = client.create("/genres", json!({"name": "Sci-Fi"})).await;
    let keanu = client
        .create("/actors", json!({"name": "Keanu Reeves", "birthDate": "1964-09-02"}))
        .await;
    let carrie = client
        .create("/actors", json!({"name": "Carrie-Anne Moss", "birthDate": "1967-08-21"}))
        .await;

    let movie = client
        .create(
            "/movies",
            json!({
                "title": "The Matrix",
                "releaseYear": 1999,
                "duration": 136,
                "genreId": id_of(&genre),
                "actorIds": [id_of(&keanu), id_of(&carrie)]
            }),
        )
        .await;
    assert_eq!(movie["genre"]["name"], "Sci-Fi");
    assert_eq!(movie["actors"].as_array().unwrap().len(), 2);

    let movie_path = format!("/movies/{}", id_of(&movie));
    let cast = client.get_json(&format!("{}/actors", movie_path)).await;
    let cast = cast.as_array().unwrap();
    assert_eq!(cast.len(), 2);
    assert_eq!(cast[0]["name"], "Keanu Reeves");
    assert_eq!(cast[0]["birthDate"], "1964-09-02");
    assert!(cast[0].get("movies").is_none());

    let updated = client
        .patch(&movie_path, json!({"duration": 138, "actorIds": [id_of(&carrie)]}))
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: Value = updated.json().await.unwrap();
    assert_eq!(updated["title"], "The Matrix");
    assert_eq!(updated["duration"], 138);
    assert_eq!(updated["actors"].as_array().unwrap().len(), 1);

    let blocked = client.delete(&movie_path).await;
    assert_eq!(blocked.status(), StatusCode::CONFLICT);
    let body: Value = blocked.json().await.unwrap();
    assert_eq!(body["kind"], "conflict");

    let deleted = client.delete(&format!("{}?cascade=true", movie_path)).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(client.get(&movie_path).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        client.get(&format!("/actors/{}", id_of(&carrie))).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_create_movie_with_unknown_actor_persists_nothing() {
    let client = TestClient::spawn().await;
    let genre = client.create("/genres", json!({"name": "Drama"})).await;
    let actor = client
        .create("/actors", json!({"name": "Al Pacino", "birthDate": "1940-04-25"}))
        .await;

    let response = client
        .post(
            "/movies",
            json!({
                "title": "Heat",
                "releaseYear": 1995,
                "duration": 170,
                "genreId": id_of(&genre),
                "actorIds": [id_of(&actor), 9999]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "not_found");

    let movies = client.get_json("/movies").await;
    assert!(movies.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_validation_errors_are_bad_requests() {
    let client = TestClient::spawn().await;
    let genre = client.create("/genres", json!({"name": "Drama"})).await;

    let response = client
        .post(
            "/movies",
            json!({"title": "", "releaseYear": 1999, "duration": 100, "genreId": id_of(&genre)}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.get("/movies?page=0&size=0").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.get("/movies/search/by-year").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let client = TestClient::spawn().await;
    let genre = client.create("/genres", json!({"name": "Drama"})).await;

    let response = client
        .post(
            "/movies",
            json!({"releaseYear": 1999, "duration": 100, "genreId": id_of(&genre)}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("title"));

    let response = client.post("/actors", json!({"name": "A"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "validation");

    let response = client
        .patch(&format!("/genres/{}", id_of(&genre)), json!({"name": 7}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let movies = client.get_json("/movies").await;
    assert!(movies.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_paging_and_searches() {
    let client = TestClient::spawn().await;
    let genre = client.create("/genres", json!({"name": "Sci-Fi"})).await;
    let other = client.create("/genres", json!({"name": "Thriller"})).await;

    for i in 0..25 {
        let title = match i {
            0 => "The Matrix".to_string(),
            1 => "Inception".to_string(),
            n => format!("Feature {}", n),
        };
        client
            .create(
                "/movies",
                json!({
                    "title": title,
                    "releaseYear": 2000 + (i % 5),
                    "duration": 100,
                    "genreId": if i % 2 == 0 { id_of(&genre) } else { id_of(&other) }
                }),
            )
            .await;
    }

    let mut seen = Vec::new();
    for page in 0..3 {
        let movies = client
            .get_json(&format!("/movies?page={}&size=10", page))
            .await;
        seen.extend(movies.as_array().unwrap().iter().map(id_of));
    }
    assert_eq!(seen.len(), 25);
    let mut deduped = seen.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), 25);

    let found = client.get_json("/movies/search/by-title?title=matrix").await;
    assert_eq!(found["numberOfElements"], 1);
    assert_eq!(found["content"][0]["title"], "The Matrix");
    assert_eq!(found["page"], 0);
    assert_eq!(found["size"], 10);

    let by_year = client.get_json("/movies/search/by-year?year=2003&size=50").await;
    assert_eq!(by_year["numberOfElements"], 5);

    let by_genre = client
        .get_json(&format!("/movies/by-genre?genreId={}&page=1&size=10", id_of(&genre)))
        .await;
    assert_eq!(by_genre["numberOfElements"], 3);

    let missing = client.get("/movies/by-genre?genreId=4040").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_actor_listing_conventions() {
    let client = TestClient::spawn().await;
    for name in ["Ann Baker", "Bob Carter", "Cid Baker"] {
        client
            .create("/actors", json!({"name": name, "birthDate": "1980-01-01"}))
            .await;
    }

    let first = client.get_json("/actors?page=1&size=2").await;
    assert_eq!(first.as_array().unwrap().len(), 2);
    assert_eq!(client.get("/actors?page=0&size=2").await.status(), StatusCode::BAD_REQUEST);

    let all = client.get_json("/actors").await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let blank_name = client.get_json("/actors?name=").await;
    assert_eq!(blank_name.as_array().unwrap().len(), 3);

    let bakers = client.get_json("/actors?name=baker").await;
    assert_eq!(bakers["numberOfElements"], 2);
    assert_eq!(bakers["page"], 0);
}

#[tokio::test]
async fn test_genre_cascade_deletes_movies() {
    let client = TestClient::spawn().await;
    let genre = client.create("/genres", json!({"name": "Western"})).await;
    let mut movie_ids = Vec::new();
    for title in ["Unforgiven", "Tombstone"] {
        let movie = client
            .create(
                "/movies",
                json!({"title": title, "releaseYear": 1992, "duration": 130, "genreId": id_of(&genre)}),
            )
            .await;
        movie_ids.push(id_of(&movie));
    }

    let genre_path = format!("/genres/{}", id_of(&genre));
    let detail = client.get_json(&genre_path).await;
    assert_eq!(detail["movies"].as_array().unwrap().len(), 2);

    let plain = client.get_json("/genres").await;
    assert!(plain[0].get("movies").is_none());
    let expanded = client.get_json("/genres?expand=movies&page=0&page_size=5").await;
    assert_eq!(expanded[0]["movies"].as_array().unwrap().len(), 2);

    let blocked = client.delete(&genre_path).await;
    assert_eq!(blocked.status(), StatusCode::CONFLICT);

    let deleted = client.delete(&format!("{}?cascade=true", genre_path)).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(client.get(&genre_path).await.status(), StatusCode::NOT_FOUND);
    for id in movie_ids {
        assert_eq!(
            client.get(&format!("/movies/{}", id)).await.status(),
            StatusCode::NOT_FOUND
        );
    }
}

#[tokio::test]
async fn test_actor_delete_requires_cascade() {
    let client = TestClient::spawn().await;
    let genre = client.create("/genres", json!({"name": "Crime"})).await;
    let movie = client
        .create(
            "/movies",
            json!({"title": "Heat", "releaseYear": 1995, "duration": 170, "genreId": id_of(&genre)}),
        )
        .await;
    let actor = client
        .create(
            "/actors",
            json!({"name": "Val Kilmer", "birthDate": "1959-12-31", "movieIds": [id_of(&movie)]}),
        )
        .await;

    let actor_path = format!("/actors/{}", id_of(&actor));
    assert_eq!(client.delete(&actor_path).await.status(), StatusCode::CONFLICT);
    assert_eq!(client.get(&actor_path).await.status(), StatusCode::OK);

    let renamed = client.patch(&actor_path, json!({"name": "Val E. Kilmer"})).await;
    assert_eq!(renamed.status(), StatusCode::OK);

    let filmography = client
        .get_json(&format!("/movies/by-actor?actorId={}", id_of(&actor)))
        .await;
    assert_eq!(filmography["content"][0]["title"], "Heat");

    let deleted = client.delete(&format!("{}?cascade=true", actor_path)).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let movie = client.get_json(&format!("/movies/{}", id_of(&movie))).await;
    assert!(movie["actors"].as_array().unwrap().is_empty());
}
