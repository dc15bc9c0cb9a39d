use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use tokio::sync::watch;

use crate::app::{FlaxfeedError, Result};
use crate::domain::{Entry, EntryWithFeed, Feed, FeedUpdate, FeedWithCount, Group};
use crate::store::filter::{self, ENTRY_FROM, UNREAD};
use crate::store::Store;
use crate::view::{now_millis, CountQuery, EntryQuery};

const FEED_COLUMNS: &str = "f.id, f.url, f.title, f.description, f.group_id, f.retrieve_full_text,
     f.etag, f.last_modified, f.last_fetched_at, f.created_at";

const ENTRY_COLUMNS: &str = "e.id, e.feed_id, e.title, e.link, e.content, e.summary,
     e.mobilized_content, e.author, e.published_at, e.fetched_at,
     COALESCE(s.is_read, 0), COALESCE(s.is_favorite, 0), COALESCE(f.title, f.url)";

/// Ids per statement for lookups that take arbitrary id lists.
const ID_CHUNK: usize = 500;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: watch::Sender<u64>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // SQLite only folds ASCII case; search needs the full Unicode rules.
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
        )?;
        let (changes, _) = watch::channel(0);
        let store = Self {
            conn: Mutex::new(conn),
            changes,
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Make every read/favorite write fail from now on.
    #[cfg(test)]
    pub(crate) fn reject_state_writes(&self) {
        self.conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_state_insert BEFORE INSERT ON entry_state
                 BEGIN SELECT RAISE(ABORT, 'entry state is read-only'); END;
                 CREATE TRIGGER reject_state_update BEFORE UPDATE ON entry_state
                 BEGIN SELECT RAISE(ABORT, 'entry state is read-only'); END;",
            )
            .unwrap();
    }

    /// Insert entries, ignoring ids already stored. With `stamp_now` every
    /// row gets the current time as `fetched_at`, taken once the connection
    /// is held so no display date can pass it before the rows land.
    fn insert_entries(&self, entries: &[Entry], stamp_now: bool) -> Result<Vec<String>> {
        let inserted = {
            let mut conn = self.conn()?;
            let stamp = stamp_now.then(|| now_millis().timestamp_millis());
            let tx = conn.transaction()?;
            let mut inserted = Vec::new();
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO entries
                     (id, feed_id, title, link, content, summary, author, published_at, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for entry in entries {
                    let changed = stmt.execute(params![
                        entry.id,
                        entry.feed_id,
                        entry.title,
                        entry.link,
                        entry.content,
                        entry.summary,
                        entry.author,
                        entry.published_at.map(|at| at.timestamp_millis()),
                        stamp.unwrap_or_else(|| entry.fetched_at.timestamp_millis()),
                    ])?;
                    if changed > 0 {
                        inserted.push(entry.id.clone());
                    }
                }
            }
            tx.commit()?;
            inserted
        };
        if !inserted.is_empty() {
            self.notify_changed();
        }
        Ok(inserted)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations.to_latest(&mut conn)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            FlaxfeedError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            group_id: row.get(4)?,
            retrieve_full_text: row.get(5)?,
            etag: row.get(6)?,
            last_modified: row.get(7)?,
            last_fetched_at: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| Self::parse_datetime(&s)),
            created_at: row
                .get::<_, String>(9)
                .ok()
                .and_then(|s| Self::parse_datetime(&s))
                .unwrap_or_else(Utc::now),
        })
    }

    fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<EntryWithFeed> {
        let entry = Entry {
            id: row.get(0)?,
            feed_id: row.get(1)?,
            title: row.get(2)?,
            link: row.get(3)?,
            content: row.get(4)?,
            summary: row.get(5)?,
            mobilized_content: row.get(6)?,
            author: row.get(7)?,
            published_at: row
                .get::<_, Option<i64>>(8)?
                .and_then(DateTime::from_timestamp_millis),
            fetched_at: DateTime::from_timestamp_millis(row.get(9)?).unwrap_or_default(),
            read: row.get(10)?,
            favorite: row.get(11)?,
        };
        Ok(EntryWithFeed {
            entry,
            feed_title: row.get(12)?,
        })
    }

    fn query_feeds(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Feed>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let feeds = stmt
            .query_map(params, Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feeds)
    }

    fn id_values(ids: &[String]) -> Vec<Value> {
        ids.iter().map(|id| Value::Text(id.clone())).collect()
    }
}

impl Store for SqliteStore {
    fn add_feed(&self, feed: &Feed) -> Result<i64> {
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO feeds (url, title, description, group_id, retrieve_full_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    feed.url,
                    feed.title,
                    feed.description,
                    feed.group_id,
                    feed.retrieve_full_text,
                    feed.created_at.to_rfc3339()
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.notify_changed();
        Ok(id)
    }

    fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        let feed = conn
            .query_row(
                &format!("SELECT {} FROM feeds f WHERE f.id = ?1", FEED_COLUMNS),
                params![id],
                Self::feed_from_row,
            )
            .optional()?;
        Ok(feed)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;
        let feed = conn
            .query_row(
                &format!("SELECT {} FROM feeds f WHERE f.url = ?1", FEED_COLUMNS),
                params![url],
                Self::feed_from_row,
            )
            .optional()?;
        Ok(feed)
    }

    fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        self.query_feeds(
            &format!("SELECT {} FROM feeds f ORDER BY f.title, f.url", FEED_COLUMNS),
            [],
        )
    }

    fn get_feeds_in_group(&self, group_id: i64) -> Result<Vec<Feed>> {
        self.query_feeds(
            &format!(
                "SELECT {} FROM feeds f WHERE f.group_id = ?1 ORDER BY f.title, f.url",
                FEED_COLUMNS
            ),
            params![group_id],
        )
    }

    fn get_feeds_with_counts(&self) -> Result<Vec<FeedWithCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {},
                (SELECT COUNT(*) FROM entries e
                 LEFT JOIN entry_state s ON s.entry_id = e.id
                 WHERE e.feed_id = f.id AND {})
             FROM feeds f ORDER BY f.title, f.url",
            FEED_COLUMNS, UNREAD
        ))?;
        let feeds = stmt
            .query_map([], |row| {
                Ok(FeedWithCount {
                    feed: Self::feed_from_row(row)?,
                    unread: row.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feeds)
    }

    fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()> {
        {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE feeds SET
                    title = COALESCE(?1, title),
                    description = COALESCE(?2, description),
                    etag = COALESCE(?3, etag),
                    last_modified = COALESCE(?4, last_modified),
                    last_fetched_at = COALESCE(?5, last_fetched_at)
                 WHERE id = ?6",
                params![
                    update.title,
                    update.description,
                    update.etag,
                    update.last_modified,
                    update.last_fetched_at.map(|at| at.to_rfc3339()),
                    id
                ],
            )?;
        }
        self.notify_changed();
        Ok(())
    }

    fn set_feed_group(&self, feed_id: i64, group_id: Option<i64>) -> Result<()> {
        {
            let conn = self.conn()?;
            if let Some(group_id) = group_id {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?1)",
                    params![group_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(FlaxfeedError::GroupNotFound(group_id.to_string()));
                }
            }
            let changed = conn.execute(
                "UPDATE feeds SET group_id = ?1 WHERE id = ?2",
                params![group_id, feed_id],
            )?;
            if changed == 0 {
                return Err(FlaxfeedError::FeedNotFound(feed_id.to_string()));
            }
        }
        self.notify_changed();
        Ok(())
    }

    fn set_retrieve_full_text(&self, feed_id: i64, enabled: bool) -> Result<()> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE feeds SET retrieve_full_text = ?1 WHERE id = ?2",
                params![enabled, feed_id],
            )?;
            if changed == 0 {
                return Err(FlaxfeedError::FeedNotFound(feed_id.to_string()));
            }
        }
        self.notify_changed();
        Ok(())
    }

    fn delete_feed(&self, id: i64) -> Result<()> {
        {
            let conn = self.conn()?;
            let changed = conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(FlaxfeedError::FeedNotFound(id.to_string()));
            }
        }
        self.notify_changed();
        Ok(())
    }

    fn get_unread_count(&self, feed_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM entries e
                 LEFT JOIN entry_state s ON s.entry_id = e.id
                 WHERE e.feed_id = ?1 AND {}",
                UNREAD
            ),
            params![feed_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn add_group(&self, title: &str) -> Result<i64> {
        let id = {
            let conn = self.conn()?;
            conn.execute("INSERT INTO groups (title) VALUES (?1)", params![title])?;
            conn.last_insert_rowid()
        };
        self.notify_changed();
        Ok(id)
    }

    fn get_group_by_title(&self, title: &str) -> Result<Option<Group>> {
        let conn = self.conn()?;
        let group = conn
            .query_row(
                "SELECT id, title FROM groups WHERE title = ?1",
                params![title],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        title: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    fn get_all_groups(&self) -> Result<Vec<Group>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, title FROM groups ORDER BY title COLLATE NOCASE")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(Group {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn delete_group(&self, id: i64) -> Result<()> {
        {
            let conn = self.conn()?;
            let changed = conn.execute("DELETE FROM groups WHERE id = ?1", params![id])?;
            if changed == 0 {
                return Err(FlaxfeedError::GroupNotFound(id.to_string()));
            }
        }
        self.notify_changed();
        Ok(())
    }

    fn add_entries(&self, entries: &[Entry]) -> Result<Vec<String>> {
        self.insert_entries(entries, false)
    }

    fn add_fetched_entries(&self, entries: &[Entry]) -> Result<Vec<String>> {
        self.insert_entries(entries, true)
    }

    fn get_entry(&self, id: &str) -> Result<Option<Entry>> {
        Ok(self.get_entry_with_feed(id)?.map(|found| found.entry))
    }

    fn get_entry_with_feed(&self, id: &str) -> Result<Option<EntryWithFeed>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} {} WHERE e.id = ?1", ENTRY_COLUMNS, ENTRY_FROM),
                params![id],
                Self::entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn update_mobilized_content(&self, id: &str, content: &str) -> Result<()> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                "UPDATE entries SET mobilized_content = ?1 WHERE id = ?2",
                params![content, id],
            )?;
            if changed == 0 {
                return Err(FlaxfeedError::EntryNotFound(id.to_string()));
            }
        }
        self.notify_changed();
        Ok(())
    }

    fn query_ids(&self, query: &EntryQuery) -> Result<Vec<String>> {
        let filter = filter::entry_filter(query);
        let sql = format!(
            "SELECT e.id {} {} {}",
            ENTRY_FROM,
            filter.where_clause(),
            filter::order_clause(query)
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(filter.params.iter()), |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn query_entries(
        &self,
        query: &EntryQuery,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<EntryWithFeed>> {
        let mut filter = filter::entry_filter(query);
        let sql = format!(
            "SELECT {} {} {} {} LIMIT ? OFFSET ?",
            ENTRY_COLUMNS,
            ENTRY_FROM,
            filter.where_clause(),
            filter::order_clause(query)
        );
        filter.params.push(Value::Integer(limit as i64));
        filter.params.push(Value::Integer(offset as i64));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(filter.params.iter()), Self::entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn count_new(&self, query: &CountQuery) -> Result<i64> {
        let filter = filter::count_filter(query);
        let sql = format!(
            "SELECT COUNT(*) FROM entries e JOIN feeds f ON f.id = e.feed_id {}",
            filter.where_clause()
        );
        let conn = self.conn()?;
        let count = conn.query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))?;
        Ok(count)
    }

    fn mark_read(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = {
            let conn = self.conn()?;
            let sql = format!(
                "INSERT INTO entry_state (entry_id, is_read, read_at)
                 SELECT id, 1, ? FROM entries WHERE id IN ({})
                 ON CONFLICT(entry_id) DO UPDATE
                 SET is_read = 1, read_at = excluded.read_at
                 WHERE entry_state.is_read = 0",
                filter::placeholders(ids.len())
            );
            let mut values = vec![Value::Text(Utc::now().to_rfc3339())];
            values.extend(Self::id_values(ids));
            conn.execute(&sql, params_from_iter(values.iter()))?
        };
        if changed > 0 {
            self.notify_changed();
        }
        Ok(changed)
    }

    fn mark_unread(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = {
            let conn = self.conn()?;
            let sql = format!(
                "UPDATE entry_state SET is_read = 0, read_at = NULL
                 WHERE is_read = 1 AND entry_id IN ({})",
                filter::placeholders(ids.len())
            );
            conn.execute(&sql, params_from_iter(Self::id_values(ids).iter()))?
        };
        if changed > 0 {
            self.notify_changed();
        }
        Ok(changed)
    }

    fn set_favorite(&self, id: &str, favorite: bool) -> Result<()> {
        {
            let conn = self.conn()?;
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM entries WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(FlaxfeedError::EntryNotFound(id.to_string()));
            }
            let favorite_at = favorite.then(|| Utc::now().to_rfc3339());
            conn.execute(
                "INSERT INTO entry_state (entry_id, is_favorite, favorite_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(entry_id) DO UPDATE
                 SET is_favorite = excluded.is_favorite, favorite_at = excluded.favorite_at",
                params![id, favorite, favorite_at],
            )?;
        }
        self.notify_changed();
        Ok(())
    }

    fn read_states(&self, ids: &[String]) -> Result<HashMap<String, bool>> {
        let conn = self.conn()?;
        let mut states = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT e.id, COALESCE(s.is_read, 0) FROM entries e
                 LEFT JOIN entry_state s ON s.entry_id = e.id
                 WHERE e.id IN ({})",
                filter::placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(Self::id_values(chunk).iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
            })?;
            for row in rows {
                let (id, read) = row?;
                states.insert(id, read);
            }
        }
        Ok(states)
    }

    fn add_mobilization_tasks(&self, entry_ids: &[String]) -> Result<usize> {
        let added = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let mut added = 0;
            {
                let now = Utc::now().timestamp_millis();
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO mobilization_tasks (entry_id, created_at)
                     SELECT id, ?2 FROM entries WHERE id = ?1",
                )?;
                for id in entry_ids {
                    added += stmt.execute(params![id, now])?;
                }
            }
            tx.commit()?;
            added
        };
        if added > 0 {
            self.notify_changed();
        }
        Ok(added)
    }

    fn mobilization_task_count(&self, entry_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM mobilization_tasks WHERE entry_id = ?1",
            params![entry_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn pending_mobilization_tasks(&self, limit: usize) -> Result<Vec<Entry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mobilization_tasks t
             JOIN entries e ON e.id = t.entry_id
             JOIN feeds f ON f.id = e.feed_id
             LEFT JOIN entry_state s ON s.entry_id = e.id
             ORDER BY t.created_at, e.id
             LIMIT ?1",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![limit as i64], Self::entry_from_row)?
            .map(|row| row.map(|found| found.entry))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn remove_mobilization_task(&self, entry_id: &str) -> Result<()> {
        let changed = {
            let conn = self.conn()?;
            conn.execute(
                "DELETE FROM mobilization_tasks WHERE entry_id = ?1",
                params![entry_id],
            )?
        };
        if changed > 0 {
            self.notify_changed();
        }
        Ok(())
    }

    fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn invalidate(&self) {
        self.notify_changed();
    }
}
