use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{Visibility, Watchlist};

// -- JWT Claims --

/// Bearer credential payload, shared by the REST session gate and the
/// realtime socket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Account,
}

// -- Watchlists --

#[derive(Debug, Deserialize)]
pub struct CreateWatchlistRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWatchlistRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    /// `None` when absent, `Some(None)` when sent as `null` to clear it.
    #[serde(default, deserialize_with = "present_or_null")]
    pub party_time: Option<Option<DateTime<Utc>>>,
}

fn present_or_null<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMovieRequest {
    pub tmdb_id: Option<i64>,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub overview: Option<String>,
}

/// `null` or a missing field clears the party time.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyTimeRequest {
    #[serde(default)]
    pub party_time: Option<DateTime<Utc>>,
}

/// With `is_public` set the visibility is forced, otherwise it is flipped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteResponse {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub msg: String,
}

/// A status line together with the resulting watchlist state.
#[derive(Debug, Serialize, Deserialize)]
pub struct WatchlistMessage {
    pub msg: String,
    pub watchlist: Watchlist,
}

// -- Movie lookup --

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_tells_absent_party_time_from_null() {
        let absent: UpdateWatchlistRequest = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(absent.party_time, None);

        let cleared: UpdateWatchlistRequest = serde_json::from_str(r#"{"partyTime": null}"#).unwrap();
        assert_eq!(cleared.party_time, Some(None));

        let set: UpdateWatchlistRequest =
            serde_json::from_str(r#"{"partyTime": "2030-01-01T20:00:00Z"}"#).unwrap();
        assert!(matches!(set.party_time, Some(Some(_))));
    }
}
