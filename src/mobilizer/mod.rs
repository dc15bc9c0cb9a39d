//! Full-text extraction ("mobilization").
//!
//! Entries queue a mobilization task when the reader asks for the full
//! article or when their feed has `retrieve_full_text` set. The background
//! service drains the queue through a [`Mobilizer`]:
//!
//! ```text
//! mobilization_tasks → Mobilizer::extract(link) → entries.mobilized_content
//! ```

mod chrome;
mod config;
mod extractor;

pub use chrome::ChromeMobilizer;
pub use config::MobilizerConfig;
pub use extractor::ContentExtractor;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::app::Result;
use crate::domain::Entry;
use crate::store::Store;

#[async_trait]
pub trait Mobilizer: Send + Sync {
    /// Extract the article at `url` as HTML.
    async fn extract(&self, url: &str) -> Result<String>;
}

async fn mobilize_entry<S: Store>(store: &S, mobilizer: &dyn Mobilizer, entry: Entry) -> bool {
    let stored = match entry.link.as_deref() {
        None => {
            warn!("Entry {} has no link to mobilize", entry.short_id());
            false
        }
        Some(link) => match mobilizer.extract(link).await {
            Ok(content) => match store.update_mobilized_content(&entry.id, &content) {
                Ok(()) => {
                    info!(
                        "Mobilized entry {} ({} chars)",
                        entry.short_id(),
                        content.len()
                    );
                    true
                }
                Err(e) => {
                    warn!("Failed to store full text of {}: {}", entry.short_id(), e);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to mobilize {}: {}", link, e);
                false
            }
        },
    };

    // The task goes away whatever happened, so a broken page is not retried forever.
    if let Err(e) = store.remove_mobilization_task(&entry.id) {
        warn!("Failed to remove mobilization task {}: {}", entry.short_id(), e);
    }
    stored
}

/// Drain the task queue. Returns how many entries got full text.
pub async fn mobilize_pending<S: Store + Sync>(
    store: &S,
    mobilizer: &dyn Mobilizer,
    batch_size: usize,
    concurrency: usize,
) -> Result<usize> {
    let mut mobilized = 0;
    loop {
        let pending = store.pending_mobilization_tasks(batch_size.max(1))?;
        if pending.is_empty() {
            return Ok(mobilized);
        }
        mobilized += stream::iter(pending)
            .map(|entry| mobilize_entry(store, mobilizer, entry))
            .buffer_unordered(concurrency.max(1))
            .filter(|stored| futures::future::ready(*stored))
            .count()
            .await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::FlaxfeedError;
    use crate::domain::Feed;
    use crate::store::SqliteStore;

    /// Returns a fixed article, or fails for links containing "broken".
    pub struct StubMobilizer;

    #[async_trait]
    impl Mobilizer for StubMobilizer {
        async fn extract(&self, url: &str) -> Result<String> {
            if url.contains("broken") {
                Err(FlaxfeedError::Mobilizer("no content extracted".into()))
            } else {
                Ok(format!("<p>full text of {}</p>", url))
            }
        }
    }

    fn entry_with_link(store: &SqliteStore, feed_id: i64, key: &str, link: Option<&str>) -> Entry {
        let mut entry = Entry::new(feed_id, "https://example.com/feed.xml", key);
        entry.link = link.map(String::from);
        store.add_entries(&[entry.clone()]).unwrap();
        store.add_mobilization_tasks(&[entry.id.clone()]).unwrap();
        entry
    }

    #[tokio::test]
    async fn test_mobilize_pending_drains_queue() {
        let store = SqliteStore::in_memory().unwrap();
        let feed_id = store
            .add_feed(&Feed::new("https://example.com/feed.xml".into()))
            .unwrap();
        let good = entry_with_link(&store, feed_id, "1", Some("https://example.com/a"));
        let broken = entry_with_link(&store, feed_id, "2", Some("https://example.com/broken"));
        let linkless = entry_with_link(&store, feed_id, "3", None);

        let mobilized = mobilize_pending(&store, &StubMobilizer, 2, 2).await.unwrap();
        assert_eq!(mobilized, 1);

        for id in [&good.id, &broken.id, &linkless.id] {
            assert_eq!(store.mobilization_task_count(id).unwrap(), 0);
        }
        assert_eq!(
            store.get_entry(&good.id).unwrap().unwrap().mobilized_content.as_deref(),
            Some("<p>full text of https://example.com/a</p>")
        );
        assert!(store
            .get_entry(&broken.id)
            .unwrap()
            .unwrap()
            .mobilized_content
            .is_none());
    }
}
