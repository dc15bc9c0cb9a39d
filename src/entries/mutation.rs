//! Background entry-state mutations.
//!
//! Every dispatch runs on its own tokio task and hands back a
//! [`MutationTicket`]. Callers may drop the ticket or await it. A failure is
//! logged and invalidates the store, so live views drop their optimistic
//! state and show what is stored. Two mutations touching the same entry are
//! not ordered.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::app::{FlaxfeedError, Result};
use crate::store::Store;

/// Most ids handed to a single store call.
pub const MAX_BATCH_SIZE: usize = 300;

pub fn batches(ids: &[String]) -> std::slice::Chunks<'_, String> {
    ids.chunks(MAX_BATCH_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    MarkRead(Vec<String>),
    MarkUnread(Vec<String>),
    SetFavorite { id: String, favorite: bool },
}

impl Mutation {
    /// The mutation that restores `previous`, the read state of every id as
    /// it was before `self` ran.
    pub fn inverse(&self, previous: &HashMap<String, bool>) -> Mutation {
        match self {
            Mutation::MarkRead(ids) => Mutation::MarkUnread(
                ids.iter()
                    .filter(|id| previous.get(*id) == Some(&false))
                    .cloned()
                    .collect(),
            ),
            Mutation::MarkUnread(ids) => Mutation::MarkRead(
                ids.iter()
                    .filter(|id| previous.get(*id) == Some(&true))
                    .cloned()
                    .collect(),
            ),
            Mutation::SetFavorite { id, favorite } => Mutation::SetFavorite {
                id: id.clone(),
                favorite: !favorite,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Mutation::MarkRead(ids) | Mutation::MarkUnread(ids) => ids.is_empty(),
            Mutation::SetFavorite { .. } => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Mutation::MarkRead(ids) => format!("mark {} read", ids.len()),
            Mutation::MarkUnread(ids) => format!("mark {} unread", ids.len()),
            Mutation::SetFavorite { favorite, .. } => format!("set favorite={}", favorite),
        }
    }

    /// Apply against the store in batches. Returns rows touched.
    pub fn apply<S: Store>(&self, store: &S) -> Result<usize> {
        match self {
            Mutation::MarkRead(ids) => {
                let mut touched = 0;
                for batch in batches(ids) {
                    touched += store.mark_read(batch)?;
                }
                Ok(touched)
            }
            Mutation::MarkUnread(ids) => {
                let mut touched = 0;
                for batch in batches(ids) {
                    touched += store.mark_unread(batch)?;
                }
                Ok(touched)
            }
            Mutation::SetFavorite { id, favorite } => {
                store.set_favorite(id, *favorite)?;
                Ok(1)
            }
        }
    }
}

/// Completion signal of a dispatched mutation.
#[derive(Debug)]
pub struct MutationTicket {
    rx: oneshot::Receiver<Result<usize>>,
}

impl MutationTicket {
    /// Rows touched, or the error the mutation failed with.
    pub async fn wait(self) -> Result<usize> {
        self.rx
            .await
            .map_err(|_| FlaxfeedError::Other("mutation task dropped".into()))?
    }

    /// Non-blocking check; `None` while the mutation is still running.
    pub fn try_result(&mut self) -> Option<Result<usize>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(FlaxfeedError::Other("mutation task dropped".into())))
            }
        }
    }
}

pub struct MutationDispatcher<S: Store + Send + Sync + 'static> {
    store: Arc<S>,
}

impl<S: Store + Send + Sync + 'static> Clone for MutationDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store + Send + Sync + 'static> MutationDispatcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn dispatch(&self, mutation: Mutation) -> MutationTicket {
        let (tx, rx) = oneshot::channel();
        let store = self.store.clone();
        tokio::spawn(async move {
            let result = mutation.apply(&*store);
            match &result {
                Ok(touched) => debug!("{}: {} rows", mutation.describe(), touched),
                Err(e) => {
                    error!("Failed to {}: {}", mutation.describe(), e);
                    store.invalidate();
                }
            }
            let _ = tx.send(result);
        });
        MutationTicket { rx }
    }
}

/// Pending undo of a user-visible mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoAction {
    pub label: String,
    pub inverse: Mutation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entry, Feed};
    use crate::store::SqliteStore;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{}", i)).collect()
    }

    fn seeded(n: usize) -> (Arc<SqliteStore>, Vec<String>) {
        let store = SqliteStore::in_memory().unwrap();
        let feed_id = store
            .add_feed(&Feed::new("https://example.com/feed.xml".into()))
            .unwrap();
        let entries: Vec<Entry> = (0..n)
            .map(|i| Entry::new(feed_id, "https://example.com/feed.xml", &i.to_string()))
            .collect();
        let ids = store.add_entries(&entries).unwrap();
        (Arc::new(store), ids)
    }

    #[test]
    fn test_batches_split_at_limit() {
        for (n, expected) in [(0, 0), (1, 1), (300, 1), (301, 2), (650, 3)] {
            let ids = ids(n);
            let chunks: Vec<&[String]> = batches(&ids).collect();
            assert_eq!(chunks.len(), expected, "n = {}", n);
            assert!(chunks.iter().all(|c| c.len() <= MAX_BATCH_SIZE));
            assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), n);
        }
    }

    #[test]
    fn test_inverse_of_mark_read_only_unmarks_previously_unread() {
        let previous: HashMap<String, bool> = [("a", false), ("b", true)]
            .into_iter()
            .map(|(id, read)| (id.to_string(), read))
            .collect();
        let mutation = Mutation::MarkRead(vec!["a".into(), "b".into(), "gone".into()]);
        assert_eq!(
            mutation.inverse(&previous),
            Mutation::MarkUnread(vec!["a".into()])
        );
    }

    #[test]
    fn test_inverse_of_favorite_flips() {
        let mutation = Mutation::SetFavorite {
            id: "x".into(),
            favorite: true,
        };
        assert_eq!(
            mutation.inverse(&HashMap::new()),
            Mutation::SetFavorite {
                id: "x".into(),
                favorite: false
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_reports_rows_touched() {
        let (store, ids) = seeded(650);
        let dispatcher = MutationDispatcher::new(store.clone());

        let touched = dispatcher
            .dispatch(Mutation::MarkRead(ids.clone()))
            .wait()
            .await
            .unwrap();
        assert_eq!(touched, 650);
        assert!(store.read_states(&ids).unwrap().values().all(|read| *read));
    }

    #[tokio::test]
    async fn test_undo_restores_exact_previous_state() {
        let (store, ids) = seeded(400);
        let dispatcher = MutationDispatcher::new(store.clone());

        let already_read: Vec<String> = ids.iter().step_by(3).cloned().collect();
        store.mark_read(&already_read[..]).unwrap();
        let before = store.read_states(&ids).unwrap();

        let mutation = Mutation::MarkRead(ids.clone());
        let inverse = mutation.inverse(&before);
        dispatcher.dispatch(mutation).wait().await.unwrap();
        dispatcher.dispatch(inverse).wait().await.unwrap();

        assert_eq!(store.read_states(&ids).unwrap(), before);
    }

    #[tokio::test]
    async fn test_failure_surfaces_through_ticket() {
        let (store, _) = seeded(0);
        let mut changes = store.subscribe_changes();
        changes.mark_unchanged();
        let dispatcher = MutationDispatcher::new(store);
        let result = dispatcher
            .dispatch(Mutation::SetFavorite {
                id: "missing".into(),
                favorite: true,
            })
            .wait()
            .await;
        assert!(matches!(result, Err(FlaxfeedError::EntryNotFound(_))));
        // Observers are told to re-read even though nothing was written.
        assert!(changes.has_changed().unwrap());
    }
}
