//! SQL fragments for the entry list queries.

use rusqlite::types::Value;

use crate::view::{CountQuery, CountScope, EntryQuery, FilterTab};

pub const ENTRY_FROM: &str = "FROM entries e
     JOIN feeds f ON f.id = e.feed_id
     LEFT JOIN entry_state s ON s.entry_id = e.id";

pub const UNREAD: &str = "(s.is_read IS NULL OR s.is_read = 0)";

/// WHERE clause plus its positional parameters.
#[derive(Debug, Default)]
pub struct SqlFilter {
    pub conditions: Vec<String>,
    pub params: Vec<Value>,
}

impl SqlFilter {
    fn push(&mut self, condition: &str, params: impl IntoIterator<Item = Value>) {
        self.conditions.push(condition.to_string());
        self.params.extend(params);
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }
}

fn push_tab(filter: &mut SqlFilter, tab: FilterTab) {
    match tab {
        FilterTab::Unread => filter.push(UNREAD, []),
        FilterTab::Favorites => filter.push("s.is_favorite = 1", []),
        FilterTab::All => {}
    }
}

/// Escape LIKE wildcards so search text matches literally.
pub fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub fn entry_filter(query: &EntryQuery) -> SqlFilter {
    let mut filter = SqlFilter::default();
    match query {
        EntryQuery::Search { text, .. } => {
            let pattern = like_pattern(&text.to_lowercase());
            filter.push(
                "(fold_case(e.title) LIKE ? ESCAPE '\\' OR fold_case(e.summary) LIKE ? ESCAPE '\\'
                  OR fold_case(e.content) LIKE ? ESCAPE '\\')",
                [
                    Value::Text(pattern.clone()),
                    Value::Text(pattern.clone()),
                    Value::Text(pattern),
                ],
            );
        }
        EntryQuery::Group {
            group_id, tab, ..
        } => {
            filter.push("f.group_id = ?", [Value::Integer(*group_id)]);
            push_tab(&mut filter, *tab);
        }
        EntryQuery::Feed { feed_id, tab, .. } => {
            filter.push("e.feed_id = ?", [Value::Integer(*feed_id)]);
            push_tab(&mut filter, *tab);
        }
        EntryQuery::Global { tab, .. } => push_tab(&mut filter, *tab),
    }
    if let Some(until) = query.until() {
        filter.push("e.fetched_at <= ?", [Value::Integer(until.timestamp_millis())]);
    }
    filter
}

pub fn order_clause(query: &EntryQuery) -> &'static str {
    if query.sort_desc() {
        "ORDER BY COALESCE(e.published_at, e.fetched_at) DESC, e.id DESC"
    } else {
        "ORDER BY COALESCE(e.published_at, e.fetched_at) ASC, e.id ASC"
    }
}

pub fn count_filter(query: &CountQuery) -> SqlFilter {
    let mut filter = SqlFilter::default();
    match query.scope {
        CountScope::Group(group_id) => filter.push("f.group_id = ?", [Value::Integer(group_id)]),
        CountScope::Feed(feed_id) => filter.push("e.feed_id = ?", [Value::Integer(feed_id)]),
        CountScope::Global => {}
    }
    filter.push(
        "e.fetched_at > ?",
        [Value::Integer(query.since.timestamp_millis())],
    );
    filter
}

/// `?, ?, ?` for `n` parameters.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
