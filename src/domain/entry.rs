use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub feed_id: i64,
    pub title: Option<String>,
    pub link: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    /// Full article text extracted from `link`.
    pub mobilized_content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Insertion time; bounds the visible list against the display date.
    pub fetched_at: DateTime<Utc>,
    pub read: bool,
    pub favorite: bool,
}

impl Entry {
    pub fn new(feed_id: i64, feed_url: &str, entry_id: &str) -> Self {
        let id = Self::generate_id(feed_url, entry_id);
        Self {
            id,
            feed_id,
            title: None,
            link: None,
            content: None,
            summary: None,
            mobilized_content: None,
            author: None,
            published_at: None,
            fetched_at: Utc::now(),
            read: false,
            favorite: false,
        }
    }

    /// Generate a deterministic ID from feed URL and entry ID
    pub fn generate_id(feed_url: &str, entry_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(feed_url.as_bytes());
        hasher.update(entry_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    /// Feed-provided body: content, else summary.
    pub fn original_content(&self) -> &str {
        self.content
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or("")
    }

    /// Body to show in the reading view.
    pub fn display_content(&self, prefer_full_text: bool) -> &str {
        match (&self.mobilized_content, prefer_full_text) {
            (Some(mobilized), true) => mobilized,
            _ => self.original_content(),
        }
    }

    /// Short id prefix for log lines.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// An entry joined with the title of the feed it belongs to.
#[derive(Debug, Clone)]
pub struct EntryWithFeed {
    pub entry: Entry,
    pub feed_title: String,
}
