//! Entry list query selection.
//!
//! Picks which store query backs each of the three list streams (id list,
//! paged entries, new-entry count) from the current scope, tab, sort order
//! and display date. Resolution walks [`RESOLUTION_ORDER`] and takes the
//! first rule that matches.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::feed::ALL_ENTRIES_ID;
use crate::view::state::{FilterTab, ViewScope};

/// Query behind the id-list and paged-entry streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryQuery {
    /// Title/summary/content match over every entry. Not bounded by the
    /// display date.
    Search { text: String, sort_desc: bool },
    Group {
        group_id: i64,
        tab: FilterTab,
        until: DateTime<Utc>,
        sort_desc: bool,
    },
    Feed {
        feed_id: i64,
        tab: FilterTab,
        until: DateTime<Utc>,
        sort_desc: bool,
    },
    Global {
        tab: FilterTab,
        until: DateTime<Utc>,
        sort_desc: bool,
    },
}

impl EntryQuery {
    pub fn sort_desc(&self) -> bool {
        match self {
            EntryQuery::Search { sort_desc, .. }
            | EntryQuery::Group { sort_desc, .. }
            | EntryQuery::Feed { sort_desc, .. }
            | EntryQuery::Global { sort_desc, .. } => *sort_desc,
        }
    }

    /// Inclusive upper bound on insertion time, if any.
    pub fn until(&self) -> Option<DateTime<Utc>> {
        match self {
            EntryQuery::Search { .. } => None,
            EntryQuery::Group { until, .. }
            | EntryQuery::Feed { until, .. }
            | EntryQuery::Global { until, .. } => Some(*until),
        }
    }

    pub fn tab(&self) -> Option<FilterTab> {
        match self {
            EntryQuery::Search { .. } => None,
            EntryQuery::Group { tab, .. }
            | EntryQuery::Feed { tab, .. }
            | EntryQuery::Global { tab, .. } => Some(*tab),
        }
    }
}

fn tab_prefix(tab: FilterTab) -> &'static str {
    match tab {
        FilterTab::Unread => "unread",
        FilterTab::Favorites => "favorites",
        FilterTab::All => "all",
    }
}

fn order(sort_desc: bool) -> &'static str {
    if sort_desc {
        "desc"
    } else {
        "asc"
    }
}

impl fmt::Display for EntryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryQuery::Search { text, sort_desc } => {
                write!(f, "search('{}', {})", text, order(*sort_desc))
            }
            EntryQuery::Group {
                group_id,
                tab,
                until,
                sort_desc,
            } => write!(
                f,
                "{}-by-group({}, {}, {})",
                tab_prefix(*tab),
                group_id,
                until.timestamp_millis(),
                order(*sort_desc)
            ),
            EntryQuery::Feed {
                feed_id,
                tab,
                until,
                sort_desc,
            } => write!(
                f,
                "{}-by-feed({}, {}, {})",
                tab_prefix(*tab),
                feed_id,
                until.timestamp_millis(),
                order(*sort_desc)
            ),
            EntryQuery::Global {
                tab,
                until,
                sort_desc,
            } => write!(
                f,
                "{}-global({}, {})",
                tab_prefix(*tab),
                until.timestamp_millis(),
                order(*sort_desc)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountScope {
    Group(i64),
    Feed(i64),
    Global,
}

/// Counts entries inserted strictly after `since`. Never tab-aware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountQuery {
    pub scope: CountScope,
    pub since: DateTime<Utc>,
}

impl CountQuery {
    pub fn for_scope(scope: &ViewScope, since: DateTime<Utc>) -> Self {
        let scope = match scope {
            ViewScope::FeedGroup(group_id) => CountScope::Group(*group_id),
            ViewScope::SingleFeed(feed_id) if *feed_id != ALL_ENTRIES_ID => {
                CountScope::Feed(*feed_id)
            }
            _ => CountScope::Global,
        };
        Self { scope, since }
    }
}

impl fmt::Display for CountQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let since = self.since.timestamp_millis();
        match self.scope {
            CountScope::Group(id) => write!(f, "new-count-by-group({}, {})", id, since),
            CountScope::Feed(id) => write!(f, "new-count-by-feed({}, {})", id, since),
            CountScope::Global => write!(f, "new-count({})", since),
        }
    }
}

/// One of the three list streams and the query backing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryHandle {
    Ids(EntryQuery),
    Paged(EntryQuery),
    NewCount(CountQuery),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySelection {
    pub ids: EntryQuery,
    pub entries: EntryQuery,
    pub new_count: CountQuery,
}

impl QuerySelection {
    pub fn handles(&self) -> [QueryHandle; 3] {
        [
            QueryHandle::Ids(self.ids.clone()),
            QueryHandle::Paged(self.entries.clone()),
            QueryHandle::NewCount(self.new_count),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Search,
    Group,
    Feed,
    Global,
}

const RESOLUTION_ORDER: [Rule; 4] = [Rule::Search, Rule::Group, Rule::Feed, Rule::Global];

impl Rule {
    fn resolve(
        self,
        scope: &ViewScope,
        tab: FilterTab,
        sort_desc: bool,
        until: DateTime<Utc>,
    ) -> Option<EntryQuery> {
        match (self, scope) {
            (Rule::Search, ViewScope::SearchQuery(text)) => Some(EntryQuery::Search {
                text: text.clone(),
                sort_desc,
            }),
            (Rule::Group, ViewScope::FeedGroup(group_id)) => Some(EntryQuery::Group {
                group_id: *group_id,
                tab,
                until,
                sort_desc,
            }),
            (Rule::Feed, ViewScope::SingleFeed(feed_id)) if *feed_id != ALL_ENTRIES_ID => {
                Some(EntryQuery::Feed {
                    feed_id: *feed_id,
                    tab,
                    until,
                    sort_desc,
                })
            }
            (Rule::Global, _) => Some(EntryQuery::Global {
                tab,
                until,
                sort_desc,
            }),
            _ => None,
        }
    }
}

/// Resolve the queries for a view. Pure: equal inputs give equal selections.
pub fn select_query(
    scope: &ViewScope,
    tab: FilterTab,
    sort_desc: bool,
    display_date: DateTime<Utc>,
) -> QuerySelection {
    let entries = RESOLUTION_ORDER
        .iter()
        .find_map(|rule| rule.resolve(scope, tab, sort_desc, display_date))
        .unwrap_or(EntryQuery::Global {
            tab,
            until: display_date,
            sort_desc,
        });

    QuerySelection {
        ids: entries.clone(),
        entries,
        new_count: CountQuery::for_scope(scope, display_date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    #[test]
    fn test_unread_feed_scenario() {
        let t = at(1_700_000_000_000);
        let selection = select_query(&ViewScope::SingleFeed(1), FilterTab::Unread, true, t);

        assert_eq!(selection.ids.to_string(), "unread-by-feed(1, 1700000000000, desc)");
        assert_eq!(selection.entries, selection.ids);
        assert_eq!(
            selection.new_count.to_string(),
            "new-count-by-feed(1, 1700000000000)"
        );
    }

    #[test]
    fn test_empty_search_ignores_favorites_tab() {
        let selection = select_query(
            &ViewScope::SearchQuery(String::new()),
            FilterTab::Favorites,
            true,
            at(0),
        );
        assert_eq!(selection.ids.to_string(), "search('', desc)");
        assert_eq!(selection.entries.to_string(), "search('', desc)");
        assert_eq!(selection.ids.tab(), None);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let t = at(42);
        let scopes = [
            ViewScope::AllEntries,
            ViewScope::SingleFeed(3),
            ViewScope::SingleFeed(ALL_ENTRIES_ID),
            ViewScope::FeedGroup(9),
            ViewScope::SearchQuery("rust".into()),
        ];
        for scope in &scopes {
            for tab in FilterTab::ALL {
                for sort_desc in [true, false] {
                    let first = select_query(scope, tab, sort_desc, t);
                    let second = select_query(scope, tab, sort_desc, t);
                    assert_eq!(first, second);
                }
            }
        }
    }

    #[test]
    fn test_search_overrides_every_tab() {
        for tab in FilterTab::ALL {
            let selection = select_query(&ViewScope::SearchQuery("x".into()), tab, false, at(5));
            assert_eq!(
                selection.ids,
                EntryQuery::Search {
                    text: "x".into(),
                    sort_desc: false
                }
            );
        }
    }

    #[test]
    fn test_group_queries_by_tab() {
        let t = at(10);
        let names: Vec<String> = FilterTab::ALL
            .iter()
            .map(|tab| select_query(&ViewScope::FeedGroup(2), *tab, false, t).ids.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "unread-by-group(2, 10, asc)",
                "favorites-by-group(2, 10, asc)",
                "all-by-group(2, 10, asc)",
            ]
        );
    }

    #[test]
    fn test_sentinel_feed_resolves_globally() {
        let t = at(10);
        let selection = select_query(&ViewScope::SingleFeed(ALL_ENTRIES_ID), FilterTab::All, true, t);
        assert_eq!(selection.ids.to_string(), "all-global(10, desc)");
        assert_eq!(selection.new_count.to_string(), "new-count(10)");
        assert_eq!(
            selection,
            select_query(&ViewScope::AllEntries, FilterTab::All, true, t)
        );
    }

    #[test]
    fn test_new_count_is_not_tab_aware() {
        let t = at(77);
        let counts: Vec<CountQuery> = FilterTab::ALL
            .iter()
            .map(|tab| select_query(&ViewScope::FeedGroup(4), *tab, true, t).new_count)
            .collect();
        assert!(counts.iter().all(|c| *c == counts[0]));
        assert_eq!(counts[0].scope, CountScope::Group(4));
    }

    #[test]
    fn test_non_search_queries_are_bounded() {
        let t = at(99);
        let selection = select_query(&ViewScope::AllEntries, FilterTab::Unread, true, t);
        assert_eq!(selection.ids.until(), Some(t));

        let search = select_query(&ViewScope::SearchQuery("a".into()), FilterTab::Unread, true, t);
        assert_eq!(search.ids.until(), None);
    }

    #[test]
    fn test_handles_cover_three_streams() {
        let selection = select_query(&ViewScope::AllEntries, FilterTab::Unread, true, at(1));
        let handles = selection.handles();
        assert!(matches!(handles[0], QueryHandle::Ids(_)));
        assert!(matches!(handles[1], QueryHandle::Paged(_)));
        assert!(matches!(handles[2], QueryHandle::NewCount(_)));
    }
}
