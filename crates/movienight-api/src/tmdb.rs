//! Movie lookup proxy: forwards queries to the external movie database.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use movienight_types::api::SearchQuery;

use crate::error::ApiError;
use crate::session::AuthUser;
use crate::state::AppState;

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Videos on this site with this type count as a trailer.
const TRAILER_SITE: &str = "YouTube";
const TRAILER_TYPE: &str = "Trailer";

#[derive(Debug, Error)]
pub enum TmdbError {
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<TmdbError> for ApiError {
    fn from(e: TmdbError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    key: String,
    #[serde(default)]
    site: String,
    #[serde(default, rename = "type")]
    kind: String,
}

/// Thin client over the movie database's v3 REST API. No caching, no retries.
#[derive(Clone)]
pub struct TmdbClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn get_json<T>(&self, path: &str, params: &[(&str, String)]) -> Result<T, TmdbError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Movie database GET {}", path);

        let wrap = |source: reqwest::Error| TmdbError::Request {
            path: path.to_string(),
            source,
        };

        self.http
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(wrap)?
            .error_for_status()
            .map_err(wrap)?
            .json::<T>()
            .await
            .map_err(wrap)
    }

    /// Search by title. The upstream payload is returned untouched.
    pub async fn search(&self, query: &str, page: u32) -> Result<Value, TmdbError> {
        self.get_json(
            "/search/movie",
            &[("query", query.to_string()), ("page", page.to_string())],
        )
        .await
    }

    /// Full details for one movie. The upstream payload is returned untouched.
    pub async fn details(&self, tmdb_id: i64) -> Result<Value, TmdbError> {
        self.get_json(&format!("/movie/{}", tmdb_id), &[]).await
    }

    /// Key of the first trailer in the movie's video listing, if any.
    pub async fn trailer_key(&self, tmdb_id: i64) -> Result<Option<String>, TmdbError> {
        let videos: VideoList = self
            .get_json(&format!("/movie/{}/videos", tmdb_id), &[])
            .await?;
        Ok(pick_trailer(&videos.results))
    }
}

fn pick_trailer(videos: &[Video]) -> Option<String> {
    videos
        .iter()
        .find(|v| v.site == TRAILER_SITE && v.kind == TRAILER_TYPE && !v.key.is_empty())
        .map(|v| v.key.clone())
}

/// GET /tmdb/search?q=&page=
pub async fn search(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Query q required".into()))?;
    let page = query.page.unwrap_or(1).max(1);

    Ok(Json(state.tmdb.search(&q, page).await?))
}

/// GET /tmdb/movie/{id}
pub async fn details(
    State(state): State<AppState>,
    AuthUser(_claims): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tmdb_id: i64 = id
        .parse()
        .map_err(|_| ApiError::Validation("Invalid movie id".into()))?;

    Ok(Json(state.tmdb.details(tmdb_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(key: &str, site: &str, kind: &str) -> Video {
        Video {
            key: key.into(),
            site: site.into(),
            kind: kind.into(),
        }
    }

    #[test]
    fn first_youtube_trailer_wins() {
        let videos = vec![
            video("teaser", "YouTube", "Teaser"),
            video("vimeo", "Vimeo", "Trailer"),
            video("first", "YouTube", "Trailer"),
            video("second", "YouTube", "Trailer"),
        ];
        assert_eq!(pick_trailer(&videos).as_deref(), Some("first"));
    }

    #[test]
    fn no_trailer_yields_none() {
        assert_eq!(pick_trailer(&[video("clip", "YouTube", "Clip")]), None);
        assert_eq!(pick_trailer(&[]), None);
    }

    #[test]
    fn video_listing_tolerates_missing_fields() {
        let list: VideoList =
            serde_json::from_str(r#"{"id": 550, "results": [{"key": "k"}]}"#).unwrap();
        assert_eq!(list.results.len(), 1);
        assert_eq!(pick_trailer(&list.results), None);
    }
}
