use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::app::{FlaxfeedError, Result};
use crate::domain::{Feed, FeedUpdate};
use crate::fetcher::{FetchResult, Fetcher, Validators};
use crate::normalizer::Normalizer;
use crate::store::Store;
use crate::view::now_millis;

pub const DEFAULT_WORKERS: usize = 10;

/// Outcome of refreshing one feed: the ids of entries it added.
pub type FeedRefresh = (Feed, Result<Vec<String>>);

pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    semaphore: Arc<Semaphore>,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetcher + Send + Sync>, workers: usize) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn fetch_all<S: Store + Send + Sync + 'static>(
        &self,
        feeds: Vec<Feed>,
        store: Arc<S>,
        normalizer: &Normalizer,
    ) -> Vec<FeedRefresh> {
        let mut handles = Vec::new();

        for feed in feeds {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let store = store.clone();
            let normalizer = normalizer.clone();

            handles.push(tokio::spawn(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => fetch_single_feed(&fetcher, &feed, &store, &normalizer).await,
                    Err(e) => Err(FlaxfeedError::Other(format!("worker pool closed: {}", e))),
                };
                (feed, result)
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Task join error: {}", e),
            }
        }

        results
    }
}

async fn fetch_single_feed<S: Store>(
    fetcher: &Arc<dyn Fetcher + Send + Sync>,
    feed: &Feed,
    store: &Arc<S>,
    normalizer: &Normalizer,
) -> Result<Vec<String>> {
    let result = fetcher.fetch(&feed.url, &Validators::of(feed)).await?;

    match result {
        FetchResult::NotModified => {
            tracing::debug!("Feed {} not modified", feed.url);
            Ok(Vec::new())
        }
        FetchResult::Content { body, validators } => {
            let fetched_at = now_millis();
            let (meta, entries) = normalizer.normalize(feed.id, &feed.url, &body, fetched_at)?;

            store.update_feed(
                feed.id,
                &FeedUpdate {
                    title: meta.title,
                    description: meta.description,
                    etag: validators.etag,
                    last_modified: validators.last_modified,
                    last_fetched_at: Some(fetched_at),
                },
            )?;

            let inserted = store.add_fetched_entries(&entries)?;
            tracing::info!("Added {} new entries from {}", inserted.len(), feed.url);
            Ok(inserted)
        }
    }
}
