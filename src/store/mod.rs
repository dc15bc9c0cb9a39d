pub mod filter;
pub mod sqlite;

use std::collections::HashMap;

use tokio::sync::watch;

use crate::app::Result;
use crate::domain::{Entry, EntryWithFeed, Feed, FeedUpdate, FeedWithCount, Group};
use crate::view::{CountQuery, EntryQuery};

pub use sqlite::SqliteStore;

pub trait Store {
    // Feed operations
    fn add_feed(&self, feed: &Feed) -> Result<i64>;
    fn get_feed(&self, id: i64) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn get_all_feeds(&self) -> Result<Vec<Feed>>;
    fn get_feeds_in_group(&self, group_id: i64) -> Result<Vec<Feed>>;
    fn get_feeds_with_counts(&self) -> Result<Vec<FeedWithCount>>;
    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()>;
    fn set_feed_group(&self, feed_id: i64, group_id: Option<i64>) -> Result<()>;
    fn set_retrieve_full_text(&self, feed_id: i64, enabled: bool) -> Result<()>;
    fn delete_feed(&self, id: i64) -> Result<()>;
    fn get_unread_count(&self, feed_id: i64) -> Result<i64>;

    // Group operations
    fn add_group(&self, title: &str) -> Result<i64>;
    fn get_group_by_title(&self, title: &str) -> Result<Option<Group>>;
    fn get_all_groups(&self) -> Result<Vec<Group>>;
    fn delete_group(&self, id: i64) -> Result<()>;

    // Entry operations
    /// Inserts new entries, skipping known ids. Returns the ids actually inserted.
    fn add_entries(&self, entries: &[Entry]) -> Result<Vec<String>>;
    /// Like `add_entries`, but `fetched_at` is the time of insertion.
    fn add_fetched_entries(&self, entries: &[Entry]) -> Result<Vec<String>>;
    fn get_entry(&self, id: &str) -> Result<Option<Entry>>;
    fn get_entry_with_feed(&self, id: &str) -> Result<Option<EntryWithFeed>>;
    fn update_mobilized_content(&self, id: &str, content: &str) -> Result<()>;

    // List queries
    fn query_ids(&self, query: &EntryQuery) -> Result<Vec<String>>;
    fn query_entries(
        &self,
        query: &EntryQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EntryWithFeed>>;
    fn count_new(&self, query: &CountQuery) -> Result<i64>;

    // State operations
    fn mark_read(&self, ids: &[String]) -> Result<usize>;
    fn mark_unread(&self, ids: &[String]) -> Result<usize>;
    fn set_favorite(&self, id: &str, favorite: bool) -> Result<()>;
    /// Read flag per known id; unknown ids are absent from the map.
    fn read_states(&self, ids: &[String]) -> Result<HashMap<String, bool>>;

    // Mobilization task queue
    fn add_mobilization_tasks(&self, entry_ids: &[String]) -> Result<usize>;
    fn mobilization_task_count(&self, entry_id: &str) -> Result<i64>;
    fn pending_mobilization_tasks(&self, limit: usize) -> Result<Vec<Entry>>;
    fn remove_mobilization_task(&self, entry_id: &str) -> Result<()>;

    /// Counter bumped after every write.
    fn subscribe_changes(&self) -> watch::Receiver<u64>;
    /// Bump the change counter without writing, so observers re-read.
    fn invalidate(&self);
}
