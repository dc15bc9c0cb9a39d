use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::app::error::{FlaxfeedError, Result};
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::parallel::{ParallelFetcher, DEFAULT_WORKERS};
use crate::fetcher::Fetcher;
use crate::mobilizer::ChromeMobilizer;
use crate::normalizer::Normalizer;
use crate::notify::Notifications;
use crate::prefs::Preferences;
use crate::service::{ServiceContext, TcpProbe};
use crate::store::sqlite::SqliteStore;

const DATABASE_FILE: &str = "flaxfeed.db";
const PREFERENCES_FILE: &str = "preferences.toml";
const SESSION_FILE: &str = "session.json";
const LOG_FILE: &str = "flaxfeed.log";

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub parallel_fetcher: ParallelFetcher,
    pub normalizer: Normalizer,
    pub prefs: Arc<Preferences>,
    pub notifications: Arc<Notifications>,
    /// `None` for in-memory contexts.
    data_dir: Option<PathBuf>,
}

impl AppContext {
    pub fn new(data_dir: Option<PathBuf>, workers: usize, request_timeout: Duration) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => Self::default_data_dir()?,
        };
        std::fs::create_dir_all(&data_dir)?;

        let store = Arc::new(SqliteStore::new(data_dir.join(DATABASE_FILE))?);
        let prefs = Arc::new(Preferences::load(data_dir.join(PREFERENCES_FILE))?);
        Self::assemble(store, prefs, Some(data_dir), workers, request_timeout)
    }

    pub fn in_memory() -> Result<Self> {
        Self::assemble(
            Arc::new(SqliteStore::in_memory()?),
            Arc::new(Preferences::in_memory()),
            None,
            DEFAULT_WORKERS,
            crate::fetcher::http_fetcher::DEFAULT_TIMEOUT,
        )
    }

    fn assemble(
        store: Arc<SqliteStore>,
        prefs: Arc<Preferences>,
        data_dir: Option<PathBuf>,
        workers: usize,
        request_timeout: Duration,
    ) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> =
            Arc::new(HttpFetcher::with_timeout(request_timeout)?);
        let parallel_fetcher = ParallelFetcher::with_workers(fetcher.clone(), workers);

        Ok(Self {
            store,
            fetcher,
            parallel_fetcher,
            normalizer: Normalizer::new(),
            prefs,
            notifications: Arc::new(Notifications::new()),
            data_dir,
        })
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| FlaxfeedError::Config("Could not find data directory".into()))?;
        Ok(data_dir.join("flaxfeed"))
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn session_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(SESSION_FILE))
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(LOG_FILE))
    }

    /// Everything the background service needs, sharing this context's
    /// store, preferences and notifications.
    pub fn service_context(&self, config: &Config, workers: usize) -> Result<ServiceContext<SqliteStore>> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::with_timeout(
            Duration::from_secs(config.network.request_timeout_secs),
        )?);
        Ok(ServiceContext {
            store: self.store.clone(),
            fetcher: ParallelFetcher::with_workers(fetcher, workers),
            normalizer: self.normalizer.clone(),
            mobilizer: Arc::new(ChromeMobilizer::new(config.mobilizer.clone())),
            mobilizer_config: config.mobilizer.clone(),
            prefs: self.prefs.clone(),
            notifications: self.notifications.clone(),
            connectivity: Arc::new(TcpProbe::new(&config.network)),
        })
    }
}
