use std::path::Path;

use crate::app::{AppContext, FlaxfeedError, Result};
use crate::cli::opml::parse_opml;
use crate::domain::Feed;
use crate::fetcher::parallel::FeedRefresh;
use crate::store::Store;
use crate::view::{now_millis, EntryQuery, FilterTab};

const LIST_LIMIT: usize = 50;

/// Id of the group titled `title`, created if missing.
fn ensure_group(ctx: &AppContext, title: &str) -> Result<i64> {
    match ctx.store.get_group_by_title(title)? {
        Some(group) => Ok(group.id),
        None => ctx.store.add_group(title),
    }
}

fn find_group(ctx: &AppContext, title: &str) -> Result<i64> {
    ctx.store
        .get_group_by_title(title)?
        .map(|group| group.id)
        .ok_or_else(|| FlaxfeedError::GroupNotFound(title.to_string()))
}

fn find_feed(ctx: &AppContext, url: &str) -> Result<Feed> {
    ctx.store
        .get_feed_by_url(url)?
        .ok_or_else(|| FlaxfeedError::FeedNotFound(url.to_string()))
}

/// Insert a feed and fetch it once. Returns the stored feed and the result
/// of the first fetch.
async fn subscribe(ctx: &AppContext, url: &str, group: Option<&str>) -> Result<FeedRefresh> {
    let mut feed = Feed::new(url.to_string());
    feed.group_id = group.map(|title| ensure_group(ctx, title)).transpose()?;
    let feed_id = ctx.store.add_feed(&feed)?;
    let feed = ctx
        .store
        .get_feed(feed_id)?
        .ok_or_else(|| FlaxfeedError::FeedNotFound(url.to_string()))?;

    ctx.parallel_fetcher
        .fetch_all(vec![feed], ctx.store.clone(), &ctx.normalizer)
        .await
        .pop()
        .ok_or_else(|| FlaxfeedError::Other(format!("fetch of {} did not finish", url)))
}

pub async fn add_feed(ctx: &AppContext, url: &str, group: Option<&str>) -> Result<()> {
    url::Url::parse(url)?;
    if ctx.store.get_feed_by_url(url)?.is_some() {
        println!("Feed already exists: {}", url);
        return Ok(());
    }

    let (feed, result) = subscribe(ctx, url, group).await?;
    println!("Added feed: {}", url);
    match result {
        Ok(ids) => {
            if let Some(feed) = ctx.store.get_feed(feed.id)? {
                if let Some(title) = &feed.title {
                    println!("Feed title: {}", title);
                }
            }
            println!("Fetched {} entries", ids.len());
        }
        Err(e) => eprintln!("First fetch failed, will retry on update: {}", e),
    }
    Ok(())
}

pub async fn remove_feed(ctx: &AppContext, url: &str) -> Result<()> {
    let feed = find_feed(ctx, url)?;
    ctx.store.delete_feed(feed.id)?;
    println!("Removed feed: {}", url);
    Ok(())
}

pub async fn update_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.get_all_feeds()?;

    if feeds.is_empty() {
        println!("No feeds to update");
        return Ok(());
    }

    println!("Updating {} feeds...", feeds.len());

    let results = ctx
        .parallel_fetcher
        .fetch_all(feeds, ctx.store.clone(), &ctx.normalizer)
        .await;

    let mut total_new = 0;
    let mut errors = 0;
    let mut full_text = Vec::new();

    for (feed, result) in results {
        match result {
            Ok(ids) => {
                total_new += ids.len();
                if !ids.is_empty() {
                    println!("  {} new entries from {}", ids.len(), feed.display_title());
                }
                if feed.retrieve_full_text {
                    full_text.extend(ids);
                }
            }
            Err(e) => {
                errors += 1;
                eprintln!("  Error updating {}: {}", feed.display_title(), e);
            }
        }
    }

    if !full_text.is_empty() {
        let queued = ctx.store.add_mobilization_tasks(&full_text)?;
        println!("Queued {} entries for full-text extraction", queued);
    }
    println!("Update complete: {} new entries, {} errors", total_new, errors);
    Ok(())
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.get_feeds_with_counts()?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for entry in feeds {
        let marker = if entry.feed.retrieve_full_text { " [full text]" } else { "" };
        println!(
            "{} ({} unread){}\n  {}",
            entry.feed.display_title(),
            entry.unread,
            marker,
            entry.feed.url
        );
    }

    Ok(())
}

pub fn list_entries(ctx: &AppContext) -> Result<()> {
    let query = EntryQuery::Global {
        tab: FilterTab::All,
        until: now_millis(),
        sort_desc: true,
    };
    let entries = ctx.store.query_entries(&query, LIST_LIMIT, 0)?;

    if entries.is_empty() {
        println!("No entries");
        return Ok(());
    }

    for item in entries {
        let read_marker = if item.entry.read { " " } else { "●" };
        let favorite_marker = if item.entry.favorite { "★" } else { " " };
        let date = item
            .entry
            .published_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "          ".to_string());

        println!(
            "{}{} {} {} - {}",
            read_marker,
            favorite_marker,
            date,
            item.entry.display_title(),
            item.feed_title
        );
    }

    Ok(())
}

pub fn add_group(ctx: &AppContext, title: &str) -> Result<()> {
    if ctx.store.get_group_by_title(title)?.is_some() {
        println!("Group already exists: {}", title);
        return Ok(());
    }
    ctx.store.add_group(title)?;
    println!("Added group: {}", title);
    Ok(())
}

pub fn list_groups(ctx: &AppContext) -> Result<()> {
    let groups = ctx.store.get_all_groups()?;
    if groups.is_empty() {
        println!("No groups");
        return Ok(());
    }
    for group in groups {
        let feeds = ctx.store.get_feeds_in_group(group.id)?;
        println!("{} ({} feeds)", group.title, feeds.len());
        for feed in feeds {
            println!("  {}", feed.display_title());
        }
    }
    Ok(())
}

pub fn remove_group(ctx: &AppContext, title: &str) -> Result<()> {
    let id = find_group(ctx, title)?;
    ctx.store.delete_group(id)?;
    println!("Removed group: {}", title);
    Ok(())
}

pub fn assign_group(ctx: &AppContext, url: &str, group: Option<&str>) -> Result<()> {
    let feed = find_feed(ctx, url)?;
    let group_id = group.map(|title| find_group(ctx, title)).transpose()?;
    ctx.store.set_feed_group(feed.id, group_id)?;
    match group {
        Some(title) => println!("Moved {} to {}", feed.display_title(), title),
        None => println!("Removed {} from its group", feed.display_title()),
    }
    Ok(())
}

pub fn set_full_text(ctx: &AppContext, url: &str, enabled: bool) -> Result<()> {
    let feed = find_feed(ctx, url)?;
    ctx.store.set_retrieve_full_text(feed.id, enabled)?;
    println!(
        "Full-text extraction {} for {}",
        if enabled { "enabled" } else { "disabled" },
        feed.display_title()
    );
    Ok(())
}

/// Import feeds from an OPML file. Nested outlines become groups.
pub async fn import_opml(ctx: &AppContext, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let feeds = parse_opml(&content);

    if feeds.is_empty() {
        println!("No feeds found in OPML file");
        return Ok(());
    }

    println!("Found {} feeds in OPML file", feeds.len());

    let mut added = 0;
    let mut skipped = 0;
    let mut errors = 0;

    for outline in feeds {
        if ctx.store.get_feed_by_url(&outline.url)?.is_some() {
            skipped += 1;
            continue;
        }

        let (feed, result) = subscribe(ctx, &outline.url, outline.group.as_deref()).await?;
        match result {
            Ok(ids) => {
                let group = outline
                    .group
                    .as_deref()
                    .map(|g| format!(" in {}", g))
                    .unwrap_or_default();
                println!("  + {}{} ({} entries)", outline.title, group, ids.len());
                added += 1;
            }
            Err(e) => {
                eprintln!("  ! {} - {}", outline.title, e);
                ctx.store.delete_feed(feed.id)?;
                errors += 1;
            }
        }
    }

    println!(
        "\nImport complete: {} added, {} skipped (already exist), {} errors",
        added, skipped, errors
    );

    Ok(())
}
