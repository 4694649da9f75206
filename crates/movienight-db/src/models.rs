//! Database row types. These map directly to SQLite rows; `queries`
//! assembles them into the `movienight-types` documents.

use chrono::{DateTime, Utc};
use movienight_types::models::Visibility;
use uuid::Uuid;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct WatchlistRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub visibility: String,
    pub owner_id: String,
    pub owner_username: Option<String>,
    pub owner_avatar_url: Option<String>,
    pub invite_code: Option<String>,
    pub party_time: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MovieRow {
    pub tmdb_id: i64,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub overview: Option<String>,
    pub trailer_key: Option<String>,
    pub added_by: String,
    pub added_at: String,
}

pub struct ChatMessageRow {
    pub id: String,
    pub watchlist_id: String,
    pub user_id: Option<String>,
    pub username: String,
    pub text: String,
    pub created_at: String,
}

/// Input for a new watchlist; the owner becomes its first member.
pub struct NewWatchlist {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub owner_id: Uuid,
}

/// Partial watchlist update. `party_time: Some(None)` clears the party time.
#[derive(Default)]
pub struct WatchlistPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub party_time: Option<Option<DateTime<Utc>>>,
}
