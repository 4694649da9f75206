use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::warn;

use movienight_api::tmdb::DEFAULT_BASE_URL;

/// Signing secrets that only exist for local development.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    /// Browser origin allowed by CORS. `None` allows any origin.
    pub client_url: Option<String>,
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port: u16 = get("MOVIENIGHT_PORT", "5000")
            .parse()
            .map_err(|e| anyhow::anyhow!("MOVIENIGHT_PORT is not a valid port: {}", e))?;

        let jwt_secret = get("MOVIENIGHT_JWT_SECRET", "dev-secret-change-me");
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("MOVIENIGHT_JWT_SECRET is unset or a placeholder; tokens are forgeable. Set it before deploying.");
        }

        let tmdb_api_key = get("TMDB_API_KEY", "");
        if tmdb_api_key.is_empty() {
            warn!("TMDB_API_KEY is unset; movie search and trailer lookups will fail");
        }

        Ok(Self {
            host: get("MOVIENIGHT_HOST", "0.0.0.0"),
            port,
            db_path: get("MOVIENIGHT_DB_PATH", "movienight.db").into(),
            jwt_secret,
            upload_dir: get("MOVIENIGHT_UPLOAD_DIR", "./uploads").into(),
            client_url: var("MOVIENIGHT_CLIENT_URL").filter(|v| !v.trim().is_empty()),
            tmdb_api_key,
            tmdb_base_url: get("TMDB_BASE_URL", DEFAULT_BASE_URL),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
