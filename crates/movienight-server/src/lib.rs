pub mod config;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderValue, Method, header},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use movienight_api::error::ApiError;
use movienight_api::routes;
use movienight_api::session::decode_token;
use movienight_api::state::AppState;
use movienight_gateway::connection::{self, Identity};

#[derive(Debug, Deserialize)]
struct SocketParams {
    token: Option<String>,
}

/// Compose the full HTTP surface: REST under `/api`, the realtime socket,
/// and uploaded avatars.
pub fn build_app(state: AppState, client_url: Option<&str>) -> anyhow::Result<Router> {
    let cors = match client_url {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_str(origin)?))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    };

    let socket_route = Router::new()
        .route("/socket", get(ws_upgrade))
        .with_state(state.clone());

    Ok(Router::new()
        .nest("/api", routes::router(state.clone()))
        .nest_service("/uploads", ServeDir::new(&state.upload_dir))
        .merge(socket_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Upgrade to the realtime relay. A `?token=` makes the socket speak as that
/// user; without one it is a guest.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<SocketParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let identity = match params.token.filter(|t| !t.is_empty()) {
        Some(token) => {
            let claims = decode_token(&state.jwt_secret, &token).map_err(|e| {
                warn!("Rejected socket upgrade with bad token: {}", e);
                ApiError::Unauthorized("Token invalid")
            })?;
            Some(Identity {
                user_id: claims.sub,
                username: claims.username,
            })
        }
        None => None,
    };

    let relay = state.relay.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, relay, db, identity)))
}
