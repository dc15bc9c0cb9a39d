//! Push-based observation of store queries.
//!
//! A [`Subscription`] is a spawned task that runs its query once and then
//! again after every store write, delivering each result as a
//! [`LiveEvent`] tagged with the owner's generation. Dropping the
//! subscription aborts the task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::Result;
use crate::domain::EntryWithFeed;
use crate::store::Store;
use crate::view::{CountQuery, EntryQuery};

pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveQuery {
    Ids(EntryQuery),
    Page { query: EntryQuery, limit: usize },
    NewCount(CountQuery),
    TaskCount(String),
}

impl LiveQuery {
    fn run<S: Store>(&self, store: &S) -> Result<LiveUpdate> {
        Ok(match self {
            LiveQuery::Ids(query) => LiveUpdate::Ids(store.query_ids(query)?),
            LiveQuery::Page { query, limit } => LiveUpdate::Page {
                limit: *limit,
                entries: store.query_entries(query, *limit, 0)?,
            },
            LiveQuery::NewCount(query) => LiveUpdate::NewCount(store.count_new(query)?),
            LiveQuery::TaskCount(entry_id) => {
                LiveUpdate::TaskCount(store.mobilization_task_count(entry_id)?)
            }
        })
    }

    fn label(&self) -> String {
        match self {
            LiveQuery::Ids(query) => format!("ids {}", query),
            LiveQuery::Page { query, limit } => format!("page {} limit {}", query, limit),
            LiveQuery::NewCount(query) => query.to_string(),
            LiveQuery::TaskCount(entry_id) => format!("task-count({})", entry_id),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LiveUpdate {
    Ids(Vec<String>),
    Page {
        limit: usize,
        entries: Vec<EntryWithFeed>,
    },
    NewCount(i64),
    TaskCount(i64),
}

#[derive(Debug, Clone)]
pub struct LiveEvent {
    pub generation: u64,
    pub update: LiveUpdate,
}

/// Handle on a running observation. Aborts the task when dropped.
#[derive(Debug)]
pub struct Subscription {
    label: String,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start observing `query`. Results go to `tx` until the subscription is
/// dropped or the receiver closes.
pub fn observe<S: Store + Send + Sync + 'static>(
    store: Arc<S>,
    query: LiveQuery,
    generation: u64,
    tx: mpsc::Sender<LiveEvent>,
) -> Subscription {
    let label = query.label();
    debug!("Subscribing to {} (generation {})", label, generation);

    let mut changes = store.subscribe_changes();
    let task_label = label.clone();
    let handle = tokio::spawn(async move {
        loop {
            changes.borrow_and_update();
            match query.run(&*store) {
                Ok(update) => {
                    if tx.send(LiveEvent { generation, update }).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Live query {} failed: {}", task_label, e),
            }
            if changes.changed().await.is_err() {
                break;
            }
        }
    });

    Subscription { label, handle }
}

/// One subscription per slot; replacing cancels the previous one first.
#[derive(Debug, Default)]
pub struct Slot {
    current: Option<Subscription>,
}

impl Slot {
    pub fn replace(&mut self, start: impl FnOnce() -> Subscription) {
        self.cancel();
        self.current = Some(start());
    }

    pub fn cancel(&mut self) {
        if let Some(old) = self.current.take() {
            debug!("Cancelling {}", old.label());
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn label(&self) -> Option<&str> {
        self.current.as_ref().map(Subscription::label)
    }
}
