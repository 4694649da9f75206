use std::path::PathBuf;
use std::sync::Arc;

use movienight_db::Database;
use movienight_gateway::relay::Relay;

use crate::error::ApiError;
use crate::tmdb::TmdbClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub relay: Relay,
    pub tmdb: TmdbClient,
    /// Where avatar images are written; served under `/uploads`.
    pub upload_dir: PathBuf,
}

impl AppStateInner {
    /// Run a blocking store operation off the async runtime.
    pub async fn run_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db)).await?;
        Ok(result?)
    }
}
