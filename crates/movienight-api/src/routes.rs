use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
};
use serde_json::json;

use crate::auth::{self, MAX_AVATAR_SIZE};
use crate::state::AppState;
use crate::tmdb;
use crate::watchlists;

/// Room for multipart framing and text fields around the avatar itself.
const SIGNUP_BODY_LIMIT: usize = MAX_AVATAR_SIZE + 1024 * 1024;

/// The REST surface, to be nested under `/api`.
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route(
            "/auth/signup",
            post(auth::signup).layer(DefaultBodyLimit::max(SIGNUP_BODY_LIMIT)),
        )
        .route("/auth/login", post(auth::login));

    let tmdb_routes = Router::new()
        .route("/tmdb/search", get(tmdb::search))
        .route("/tmdb/movie/{id}", get(tmdb::details));

    let watchlist_routes = Router::new()
        .route("/watchlists", get(watchlists::list).post(watchlists::create))
        .route("/watchlists/join/{code}", post(watchlists::join_invite))
        .route(
            "/watchlists/{id}",
            get(watchlists::get_one)
                .put(watchlists::update)
                .delete(watchlists::delete),
        )
        .route("/watchlists/{id}/movies", post(watchlists::add_movie))
        .route(
            "/watchlists/{id}/movies/{tmdb_id}",
            axum::routing::delete(watchlists::remove_movie),
        )
        .route("/watchlists/{id}/invite", post(watchlists::generate_invite))
        .route("/watchlists/{id}/party", put(watchlists::set_party_time))
        .route("/watchlists/{id}/visibility", patch(watchlists::toggle_visibility));

    Router::new()
        .merge(auth_routes)
        .merge(tmdb_routes)
        .merge(watchlist_routes)
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .with_state(state)
}
