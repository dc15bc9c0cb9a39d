//! Feed downloading.
//!
//! Requests are conditional: the validators stored with a feed go out as
//! `If-None-Match`/`If-Modified-Since`, and an unchanged feed costs no
//! parsing at all.

pub mod http_fetcher;
pub mod parallel;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::Feed;

/// Cache validators the server handed out with the last body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn of(feed: &Feed) -> Self {
        Self {
            etag: feed.etag.clone(),
            last_modified: feed.last_modified.clone(),
        }
    }
}

#[derive(Debug)]
pub enum FetchResult {
    Content { body: Vec<u8>, validators: Validators },
    /// HTTP 304
    NotModified,
}

#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &str, validators: &Validators) -> Result<FetchResult>;
}
