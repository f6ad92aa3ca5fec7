use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::models::{PageRequest, DEFAULT_PER_PAGE};
use crate::repo::Repo;

/// Repository settings derived from the environment.
#[derive(Clone, Debug, Default)]
pub struct RepoConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub data_dir: Option<PathBuf>,
    pub page_size: u32,
}

impl RepoConfig {
    /// Reads `DATABASE_URL`, `FORUM_DB_MAX_CONNECTIONS`, `FORUM_DATA_DIR` and
    /// `FORUM_PAGE_SIZE`. Debug builds pick up a `.env` file first.
    pub fn from_env() -> Self {
        if cfg!(debug_assertions) {
            let _ = dotenv::dotenv();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| get(name).filter(|v| !v.trim().is_empty());
        let u32_var = |name: &str, default: u32| {
            non_empty(name)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        Self {
            database_url: non_empty("DATABASE_URL"),
            max_connections: u32_var("FORUM_DB_MAX_CONNECTIONS", 5),
            data_dir: non_empty("FORUM_DATA_DIR").map(PathBuf::from),
            page_size: u32_var("FORUM_PAGE_SIZE", DEFAULT_PER_PAGE),
        }
    }

    /// First page at the configured size.
    pub fn default_page(&self) -> PageRequest {
        PageRequest::new(if self.page_size == 0 { DEFAULT_PER_PAGE } else { self.page_size })
    }
}

/// Postgres when `DATABASE_URL` is set and `postgres-store` is enabled,
/// otherwise the in-memory backend.
pub async fn build_repo(config: &RepoConfig) -> anyhow::Result<Arc<dyn Repo>> {
    if let Some(url) = config.database_url.as_deref() {
        if cfg!(feature = "postgres-store") {
            return connect_postgres(url, config.max_connections).await;
        }
        warn!("DATABASE_URL is set but the postgres-store feature is disabled; ignoring it");
    }
    fallback_repo(config).await
}

#[cfg(feature = "postgres-store")]
async fn connect_postgres(url: &str, max_connections: u32) -> anyhow::Result<Arc<dyn Repo>> {
    use anyhow::Context;
    use sqlx::postgres::PgPoolOptions;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    let repo = crate::repo::pg::PgRepo::new(pool);
    repo.migrate().await.context("failed to run migrations")?;
    info!(max_connections, "Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "postgres-store"))]
async fn connect_postgres(_url: &str, _max_connections: u32) -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("postgres-store feature is disabled")
}

#[cfg(feature = "inmem-store")]
async fn fallback_repo(config: &RepoConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use crate::repo::inmem::InMemRepo;

    let repo = match config.data_dir.as_ref() {
        Some(dir) => InMemRepo::open(dir).await,
        None => InMemRepo::new(),
    };
    info!(snapshot_dir = ?config.data_dir, "Using in-memory repository backend");
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "inmem-store"))]
async fn fallback_repo(_config: &RepoConfig) -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("DATABASE_URL must be set when the inmem-store feature is disabled")
}
