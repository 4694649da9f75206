//! Shared setup for the REST integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query},
    http::{Method, Request, StatusCode, header},
    routing::get,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use movienight_api::routes;
use movienight_api::state::{AppState, AppStateInner};
use movienight_api::tmdb::TmdbClient;
use movienight_db::Database;
use movienight_gateway::relay::Relay;

pub const JWT_SECRET: &str = "test-secret";

/// Nothing listens here, so every lookup fails fast.
pub const UNREACHABLE_TMDB: &str = "http://127.0.0.1:1";

pub struct TestApp {
    pub state: AppState,
    pub uploads: TempDir,
}

impl TestApp {
    pub fn new(tmdb_base: &str) -> Self {
        let uploads = TempDir::new().unwrap();
        let state = Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            jwt_secret: JWT_SECRET.into(),
            relay: Relay::new(),
            tmdb: TmdbClient::new(tmdb_base, "test-key"),
            upload_dir: PathBuf::from(uploads.path()),
        });
        Self { state, uploads }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = routes::router(self.state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    /// Sign up `name` with a JSON body; returns (token, user id).
    pub async fn signup(&self, name: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/signup",
                None,
                Some(json!({
                    "username": name,
                    "email": format!("{}@example.com", name),
                    "password": "correct horse battery",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Create a watchlist owned by `token`; returns its JSON.
    pub async fn create_watchlist(&self, token: &str, title: &str, visibility: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/watchlists",
                Some(token),
                Some(json!({ "title": title, "visibility": visibility })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body
    }
}

/// Serve a stand-in for the movie database on an ephemeral port; returns its base URL.
pub async fn fake_tmdb() -> String {
    let app = Router::new()
        .route(
            "/search/movie",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let get = |k: &str| params.get(k).cloned().unwrap_or_default();
                Json(json!({
                    "page": get("page").parse::<u32>().unwrap_or(0),
                    "results": [{ "id": 550, "title": get("query") }],
                    "api_key_seen": get("api_key"),
                }))
            }),
        )
        .route(
            "/movie/{id}",
            get(|Path(id): Path<i64>| async move { Json(json!({ "id": id, "title": "Fight Club" })) }),
        )
        .route(
            "/movie/{id}/videos",
            get(|Path(id): Path<i64>| async move {
                Json(json!({
                    "id": id,
                    "results": [
                        { "key": "teaser", "site": "YouTube", "type": "Teaser" },
                        { "key": format!("trailer-{}", id), "site": "YouTube", "type": "Trailer" },
                    ],
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
