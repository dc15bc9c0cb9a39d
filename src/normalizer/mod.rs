use chrono::{DateTime, Utc};
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{FlaxfeedError, Result};
use crate::domain::Entry;

#[derive(Debug, Clone)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse a feed document. Every entry gets `fetched_at` as its insertion
    /// time so one refresh lands as one batch against the display date.
    pub fn normalize(
        &self,
        feed_id: i64,
        feed_url: &str,
        body: &[u8],
        fetched_at: DateTime<Utc>,
    ) -> Result<(FeedMeta, Vec<Entry>)> {
        let feed = parser::parse(body).map_err(|e| FlaxfeedError::FeedParse(e.to_string()))?;

        let meta = FeedMeta {
            title: feed.title.map(|t| decode_html_entities(&t.content).to_string()),
            description: feed
                .description
                .map(|d| decode_html_entities(&d.content).to_string()),
        };

        let entries = feed
            .entries
            .into_iter()
            .map(|parsed| {
                let link = parsed.links.first().map(|l| l.href.clone());
                let key = if parsed.id.is_empty() {
                    link.clone().unwrap_or_default()
                } else {
                    parsed.id.clone()
                };

                let mut entry = Entry::new(feed_id, feed_url, &key);
                entry.title = parsed
                    .title
                    .map(|t| decode_html_entities(&t.content).to_string());
                entry.link = link;
                entry.content = parsed
                    .content
                    .and_then(|c| c.body)
                    .map(|b| decode_html_entities(&b).to_string());
                entry.summary = parsed
                    .summary
                    .map(|s| decode_html_entities(&s.content).to_string());
                entry.author = parsed.authors.first().map(|a| a.name.clone());
                entry.published_at = parsed
                    .published
                    .or(parsed.updated)
                    .map(|dt| dt.with_timezone(&Utc));
                entry.fetched_at = fetched_at;
                entry
            })
            .collect();

        Ok((meta, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <description>A test feed</description>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/item1</link>
      <guid>item-1</guid>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
      <description>This is item 1</description>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/item2</link>
      <description>This is item 2</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test Feed</title>
  <subtitle>An Atom test feed</subtitle>
  <entry>
    <title>Atom Entry 1</title>
    <link href="https://example.com/atom1"/>
    <id>atom-entry-1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <summary>This is Atom entry 1</summary>
  </entry>
</feed>"#;

    fn fetched() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_parse_rss() {
        let (meta, entries) = Normalizer::new()
            .normalize(1, "https://example.com/feed.xml", RSS_SAMPLE.as_bytes(), fetched())
            .unwrap();

        assert_eq!(meta.title.as_deref(), Some("Test Feed"));
        assert_eq!(meta.description.as_deref(), Some("A test feed"));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("First & foremost"));
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/item1"));
        assert!(entries[0].published_at.is_some());
        assert!(entries.iter().all(|e| e.fetched_at == fetched()));
    }

    #[test]
    fn test_parse_atom() {
        let (meta, entries) = Normalizer::new()
            .normalize(1, "https://example.com/feed.atom", ATOM_SAMPLE.as_bytes(), fetched())
            .unwrap();

        assert_eq!(meta.title.as_deref(), Some("Atom Test Feed"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary.as_deref(), Some("This is Atom entry 1"));
    }

    #[test]
    fn test_entry_ids_are_stable_across_refreshes() {
        let normalizer = Normalizer::new();
        let (_, first) = normalizer
            .normalize(1, "https://example.com/feed.xml", RSS_SAMPLE.as_bytes(), fetched())
            .unwrap();
        let (_, second) = normalizer
            .normalize(1, "https://example.com/feed.xml", RSS_SAMPLE.as_bytes(), Utc::now())
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[1].id, second[1].id);
        assert_ne!(first[0].id, first[1].id);
    }

    #[test]
    fn test_invalid_document() {
        let result = Normalizer::new().normalize(1, "u", b"not a feed", fetched());
        assert!(matches!(result, Err(FlaxfeedError::FeedParse(_))));
    }
}
