use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel feed id standing for "every feed". Selecting it behaves like the
/// all-entries scope.
pub const ALL_ENTRIES_ID: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub group_id: Option<i64>,
    /// Queue new entries of this feed for full-text extraction.
    pub retrieve_full_text: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Feed {
    pub fn new(url: String) -> Self {
        Self {
            id: 0,
            url,
            title: None,
            description: None,
            group_id: None,
            retrieve_full_text: false,
            etag: None,
            last_modified: None,
            last_fetched_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// A named folder of feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub title: String,
}

/// A feed together with its number of unread entries.
#[derive(Debug, Clone)]
pub struct FeedWithCount {
    pub feed: Feed,
    pub unread: i64,
}
