use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{info, warn};
use uuid::Uuid;

use movienight_db::models::{NewWatchlist, WatchlistPatch};
use movienight_types::api::{
    AddMovieRequest, CreateWatchlistRequest, InviteResponse, PartyTimeRequest, StatusMessage,
    UpdateWatchlistRequest, VisibilityRequest, WatchlistMessage,
};
use movienight_types::events::ServerEvent;
use movienight_types::models::{MovieEntry, Visibility, Watchlist};

use crate::error::{ApiError, AppJson};
use crate::session::{AuthUser, MaybeUser};
use crate::state::AppState;

pub const INVITE_CODE_LEN: usize = 8;

/// Short lowercase alphanumeric token used in invite links.
pub fn generate_invite_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

fn parse_watchlist_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound("Watchlist not found"))
}

async fn load(state: &AppState, id: Uuid) -> Result<Watchlist, ApiError> {
    state
        .run_db(move |db| db.get_watchlist(id))
        .await?
        .ok_or(ApiError::NotFound("Watchlist not found"))
}

/// Load a watchlist the caller must own.
async fn load_owned(
    state: &AppState,
    raw_id: &str,
    user_id: Uuid,
    denied: &'static str,
) -> Result<Watchlist, ApiError> {
    let wl = load(state, parse_watchlist_id(raw_id)?).await?;
    if !wl.is_owner(user_id) {
        return Err(ApiError::Forbidden(denied));
    }
    Ok(wl)
}

async fn apply_patch(state: &AppState, id: Uuid, patch: WatchlistPatch) -> Result<Watchlist, ApiError> {
    state
        .run_db(move |db| db.update_watchlist(id, &patch))
        .await?
        .ok_or(ApiError::NotFound("Watchlist not found"))
}

fn room(wl: &Watchlist) -> String {
    wl.id.to_string()
}

/// POST /watchlists
pub async fn create(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    AppJson(req): AppJson<CreateWatchlistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("Title is required".into()))?;

    let new = NewWatchlist {
        id: Uuid::new_v4(),
        title,
        description: req.description,
        visibility: req.visibility.unwrap_or_default(),
        owner_id: claims.sub,
    };
    let wl = state.run_db(move |db| db.create_watchlist(&new)).await?;

    info!("{} created watchlist {}", claims.username, wl.id);
    Ok((StatusCode::CREATED, Json(wl)))
}

/// GET /watchlists
pub async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = viewer.user_id();
    let lists = state.run_db(move |db| db.list_visible_watchlists(viewer)).await?;
    Ok(Json(lists))
}

/// GET /watchlists/{id}
pub async fn get_one(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wl = load(&state, parse_watchlist_id(&id)?).await?;
    if !wl.is_visible_to(viewer.user_id()) {
        return Err(ApiError::Forbidden("Forbidden"));
    }
    Ok(Json(wl))
}

/// PUT /watchlists/{id}
pub async fn update(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateWatchlistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let wl = load_owned(&state, &id, claims.sub, "Only owner can edit").await?;

    let title = match req.title {
        Some(title) if title.trim().is_empty() => {
            return Err(ApiError::Validation("Title cannot be empty".into()));
        }
        Some(title) => Some(title.trim().to_string()),
        None => None,
    };
    let party_time_changed = req.party_time.is_some();

    let patch = WatchlistPatch {
        title,
        description: req.description,
        visibility: req.visibility,
        party_time: req.party_time,
    };
    let wl = apply_patch(&state, wl.id, patch).await?;

    if party_time_changed {
        state
            .relay
            .emit(&room(&wl), ServerEvent::PartyTimeUpdated { party_time: wl.party_time })
            .await;
    }

    Ok(Json(wl))
}

/// DELETE /watchlists/{id}
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wl = load_owned(&state, &id, claims.sub, "Only owner").await?;

    let wid = wl.id;
    state.run_db(move |db| db.delete_watchlist(wid)).await?;

    info!("{} deleted watchlist {}", claims.username, wid);
    Ok(Json(StatusMessage { msg: "Deleted".into() }))
}

/// POST /watchlists/{id}/movies
pub async fn add_movie(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<AddMovieRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tmdb_id = req
        .tmdb_id
        .ok_or_else(|| ApiError::Validation("tmdbId is required".into()))?;

    let wl = load(&state, parse_watchlist_id(&id)?).await?;
    if !wl.is_owner_or_member(claims.sub) {
        return Err(ApiError::Forbidden("Not allowed"));
    }
    if wl.has_movie(tmdb_id) {
        return Err(ApiError::Duplicate("Already added"));
    }

    // A failed trailer lookup never blocks the add
    let trailer_key = match state.tmdb.trailer_key(tmdb_id).await {
        Ok(key) => key,
        Err(e) => {
            warn!("Trailer lookup for movie {} failed, adding without one: {}", tmdb_id, e);
            None
        }
    };

    let entry = MovieEntry {
        tmdb_id,
        title: req.title,
        poster_path: req.poster_path,
        release_date: req.release_date,
        overview: req.overview,
        trailer_key,
        added_by: claims.sub,
        added_at: chrono::Utc::now(),
    };

    let wid = wl.id;
    let stored = entry.clone();
    let inserted = state.run_db(move |db| db.add_movie(wid, &stored)).await?;
    if !inserted {
        // Lost a race with a concurrent add of the same movie
        return Err(ApiError::Duplicate("Already added"));
    }

    let wl = load(&state, wid).await?;
    state.relay.emit(&room(&wl), ServerEvent::NewMovie(entry)).await;

    Ok(Json(wl))
}

/// DELETE /watchlists/{id}/movies/{tmdb_id}
pub async fn remove_movie(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((id, tmdb_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let tmdb_id: i64 = tmdb_id
        .parse()
        .map_err(|_| ApiError::Validation("Invalid movie id".into()))?;
    let wl = load_owned(&state, &id, claims.sub, "Only the owner can delete movies").await?;

    let wid = wl.id;
    let removed = state.run_db(move |db| db.remove_movie(wid, tmdb_id)).await?;

    let wl = load(&state, wid).await?;
    if removed {
        state
            .relay
            .emit(&room(&wl), ServerEvent::MovieRemoved { tmdb_id })
            .await;
    }

    Ok(Json(WatchlistMessage {
        msg: "Movie removed".into(),
        watchlist: wl,
    }))
}

/// POST /watchlists/{id}/invite
pub async fn generate_invite(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wl = load_owned(&state, &id, claims.sub, "Not allowed").await?;

    let wid = wl.id;
    let code = state
        .run_db(move |db| db.ensure_invite_code(wid, generate_invite_code))
        .await?
        .ok_or(ApiError::NotFound("Watchlist not found"))?;

    Ok(Json(InviteResponse { code }))
}

/// POST /watchlists/join/{code}
pub async fn join_invite(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wl = state
        .run_db(move |db| db.find_watchlist_by_invite(&code))
        .await?
        .ok_or(ApiError::NotFound("Invalid invite link"))?;

    let wl = if wl.is_owner_or_member(claims.sub) {
        wl
    } else {
        let (wid, uid) = (wl.id, claims.sub);
        state.run_db(move |db| db.add_member(wid, uid)).await?;
        info!("{} joined watchlist {} via invite", claims.username, wid);
        load(&state, wid).await?
    };

    Ok(Json(WatchlistMessage {
        msg: "Joined watchlist".into(),
        watchlist: wl,
    }))
}

/// PUT /watchlists/{id}/party
pub async fn set_party_time(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<PartyTimeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let wl = load_owned(&state, &id, claims.sub, "Only owner can update party time").await?;

    let patch = WatchlistPatch {
        party_time: Some(req.party_time),
        ..Default::default()
    };
    let wl = apply_patch(&state, wl.id, patch).await?;

    state
        .relay
        .emit(&room(&wl), ServerEvent::PartyTimeUpdated { party_time: wl.party_time })
        .await;

    Ok(Json(wl))
}

/// PATCH /watchlists/{id}/visibility
///
/// The body is optional: `{"isPublic": bool}` forces a value, no body flips it.
pub async fn toggle_visibility(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: VisibilityRequest = if body.iter().all(u8::is_ascii_whitespace) {
        VisibilityRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?
    };

    let wl = load_owned(&state, &id, claims.sub, "Not authorized").await?;

    let visibility = match req.is_public {
        Some(true) => Visibility::Public,
        Some(false) => Visibility::Private,
        None => wl.visibility.flipped(),
    };
    let patch = WatchlistPatch {
        visibility: Some(visibility),
        ..Default::default()
    };

    Ok(Json(apply_patch(&state, wl.id, patch).await?))
}
