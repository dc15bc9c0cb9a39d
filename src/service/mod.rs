//! Background fetch/mobilization service.
//!
//! A single actor task that receives `Start`/`Stop` messages through a
//! [`ServiceHandle`]. Work runs one message at a time; the `is_refreshing`
//! preference is set for the duration of a refresh so views can show it.

pub mod connectivity;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::app::{FlaxfeedError, Result};
use crate::domain::Feed;
use crate::fetcher::parallel::ParallelFetcher;
use crate::mobilizer::{self, Mobilizer, MobilizerConfig};
use crate::normalizer::Normalizer;
use crate::notify::Notifications;
use crate::prefs::{Preferences, IS_REFRESHING, REFRESH_ENABLED, REFRESH_INTERVAL};
use crate::store::Store;
use crate::view::ViewScope;

pub use connectivity::{Connectivity, NetworkConfig, TcpProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    RefreshFeeds,
    MobilizeFeeds,
}

/// Which feeds a refresh covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Feed(i64),
    Group(i64),
}

impl Target {
    pub fn for_scope(scope: &ViewScope) -> Self {
        match scope {
            ViewScope::SingleFeed(id) if !scope.is_all_entries() => Target::Feed(*id),
            ViewScope::FeedGroup(id) => Target::Group(*id),
            _ => Target::All,
        }
    }
}

#[derive(Debug)]
pub enum ServiceMessage {
    Start { action: ServiceAction, target: Target },
    Stop,
}

#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<ServiceMessage>,
    busy: Arc<AtomicBool>,
}

impl ServiceHandle {
    /// A handle and the receiving end its messages go to.
    pub fn channel() -> (Self, mpsc::Receiver<ServiceMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = Self {
            tx,
            busy: Arc::new(AtomicBool::new(false)),
        };
        (handle, rx)
    }

    /// Queue work without waiting. Returns false if the service is gone or
    /// its queue is full.
    pub fn start(&self, action: ServiceAction, target: Target) -> bool {
        match self.tx.try_send(ServiceMessage::Start { action, target }) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to start {:?}: {}", action, e);
                false
            }
        }
    }

    pub async fn stop(&self) {
        let _ = self.tx.send(ServiceMessage::Stop).await;
    }

    /// True while the service is working on a message.
    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Resolves once the service has shut down.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Everything the service works with.
pub struct ServiceContext<S: Store + Send + Sync + 'static> {
    pub store: Arc<S>,
    pub fetcher: ParallelFetcher,
    pub normalizer: Normalizer,
    pub mobilizer: Arc<dyn Mobilizer>,
    pub mobilizer_config: MobilizerConfig,
    pub prefs: Arc<Preferences>,
    pub notifications: Arc<Notifications>,
    pub connectivity: Arc<dyn Connectivity>,
}

pub struct FetcherService<S: Store + Send + Sync + 'static> {
    ctx: ServiceContext<S>,
    rx: mpsc::Receiver<ServiceMessage>,
    busy: Arc<AtomicBool>,
}

impl<S: Store + Send + Sync + 'static> FetcherService<S> {
    pub fn new(ctx: ServiceContext<S>) -> (Self, ServiceHandle) {
        let (handle, rx) = ServiceHandle::channel();
        let busy = handle.busy.clone();
        (Self { ctx, rx, busy }, handle)
    }

    pub async fn run(mut self) {
        info!("Background service started");
        // A crash mid-refresh must not block the next one.
        self.set_refreshing(false);

        while let Some(msg) = self.rx.recv().await {
            match msg {
                ServiceMessage::Start { action, target } => {
                    self.busy.store(true, Ordering::SeqCst);
                    match action {
                        ServiceAction::RefreshFeeds => {
                            if let Err(e) = self.refresh(target).await {
                                warn!("Refresh of {:?} failed: {}", target, e);
                            }
                        }
                        ServiceAction::MobilizeFeeds => {
                            self.mobilize().await;
                        }
                    }
                    self.busy.store(false, Ordering::SeqCst);
                }
                ServiceMessage::Stop => {
                    info!("Background service shutting down");
                    break;
                }
            }
        }
    }

    fn set_refreshing(&self, refreshing: bool) {
        if let Err(e) = self.ctx.prefs.set_bool(IS_REFRESHING, refreshing) {
            error!("Failed to update refresh state: {}", e);
        }
    }

    fn feeds_for(&self, target: Target) -> Result<Vec<Feed>> {
        match target {
            Target::All => self.ctx.store.get_all_feeds(),
            Target::Feed(id) => self
                .ctx
                .store
                .get_feed(id)?
                .map(|feed| vec![feed])
                .ok_or_else(|| FlaxfeedError::FeedNotFound(id.to_string())),
            Target::Group(id) => self.ctx.store.get_feeds_in_group(id),
        }
    }

    /// Fetch the target feeds. Returns the number of new entries.
    pub async fn refresh(&self, target: Target) -> Result<usize> {
        if self.ctx.prefs.get_bool(IS_REFRESHING) {
            info!("Refresh already running, skipping {:?}", target);
            return Ok(0);
        }
        if !self.ctx.connectivity.is_online().await {
            return Err(FlaxfeedError::Offline);
        }

        self.set_refreshing(true);
        let result = self.refresh_feeds(target).await;
        self.set_refreshing(false);
        result
    }

    async fn refresh_feeds(&self, target: Target) -> Result<usize> {
        let feeds = self.feeds_for(target)?;
        info!("Refreshing {} feeds", feeds.len());

        let results = self
            .ctx
            .fetcher
            .fetch_all(feeds, self.ctx.store.clone(), &self.ctx.normalizer)
            .await;

        let mut new_entries = 0;
        let mut full_text = Vec::new();
        for (feed, result) in results {
            match result {
                Ok(ids) => {
                    new_entries += ids.len();
                    if feed.retrieve_full_text {
                        full_text.extend(ids);
                    }
                }
                Err(e) => warn!("Failed to refresh {}: {}", feed.url, e),
            }
        }
        info!("Refresh done, {} new entries", new_entries);
        self.ctx.notifications.add(new_entries);

        if !full_text.is_empty() {
            self.ctx.store.add_mobilization_tasks(&full_text)?;
            self.mobilize().await;
        }
        Ok(new_entries)
    }

    /// Work through the mobilization queue. Returns entries mobilized.
    pub async fn mobilize(&self) -> usize {
        if !self.ctx.connectivity.is_online().await {
            warn!("Offline, leaving mobilization tasks queued");
            return 0;
        }
        let config = &self.ctx.mobilizer_config;
        match mobilizer::mobilize_pending(
            &*self.ctx.store,
            &*self.ctx.mobilizer,
            config.batch_size,
            config.max_concurrency,
        )
        .await
        {
            Ok(count) => count,
            Err(e) => {
                error!("Mobilization failed: {}", e);
                0
            }
        }
    }
}

/// Spawn the service as a tokio task.
pub fn spawn_service<S: Store + Send + Sync + 'static>(ctx: ServiceContext<S>) -> ServiceHandle {
    let (service, handle) = FetcherService::new(ctx);
    tokio::spawn(service.run());
    handle
}

fn next_refresh(prefs: &Preferences) -> Option<Instant> {
    prefs.refresh_interval().map(|interval| Instant::now() + interval)
}

/// Periodically start a refresh of all feeds, following the
/// `refresh_enabled` and `refresh_interval` preferences. A change of either
/// re-arms the timer. The task ends with the service.
pub fn spawn_auto_refresh(prefs: Arc<Preferences>, handle: ServiceHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = prefs.subscribe();
        let mut deadline = next_refresh(&prefs);
        info!("Auto refresh every {:?}", prefs.refresh_interval());

        loop {
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = timer => {
                    debug!("Auto refresh due");
                    handle.start(ServiceAction::RefreshFeeds, Target::All);
                    deadline = next_refresh(&prefs);
                }
                change = changes.recv() => match change {
                    Ok(key) if key == REFRESH_ENABLED || key == REFRESH_INTERVAL => {
                        info!("Auto refresh re-armed: every {:?}", prefs.refresh_interval());
                        deadline = next_refresh(&prefs);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        deadline = next_refresh(&prefs);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = handle.closed() => break,
            }
        }
        debug!("Auto refresh stopped");
    })
}
