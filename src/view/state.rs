use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::feed::ALL_ENTRIES_ID;
use crate::view::query::{select_query, CountQuery, QuerySelection};

/// The feed/group/search context of the entry list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewScope {
    AllEntries,
    SingleFeed(i64),
    FeedGroup(i64),
    SearchQuery(String),
}

impl ViewScope {
    /// `SingleFeed(ALL_ENTRIES_ID)` is the same view as `AllEntries`.
    pub fn is_all_entries(&self) -> bool {
        matches!(self, ViewScope::AllEntries)
            || matches!(self, ViewScope::SingleFeed(id) if *id == ALL_ENTRIES_ID)
    }
}

impl fmt::Display for ViewScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewScope::AllEntries => write!(f, "all entries"),
            ViewScope::SingleFeed(id) if *id == ALL_ENTRIES_ID => write!(f, "all entries"),
            ViewScope::SingleFeed(id) => write!(f, "feed {}", id),
            ViewScope::FeedGroup(id) => write!(f, "group {}", id),
            ViewScope::SearchQuery(text) => write!(f, "search '{}'", text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterTab {
    Unread,
    Favorites,
    All,
}

impl FilterTab {
    pub const ALL: [FilterTab; 3] = [FilterTab::Unread, FilterTab::Favorites, FilterTab::All];

    pub fn label(self) -> &'static str {
        match self {
            FilterTab::Unread => "Unread",
            FilterTab::Favorites => "Favorites",
            FilterTab::All => "All",
        }
    }

    pub fn next(self) -> Self {
        match self {
            FilterTab::Unread => FilterTab::Favorites,
            FilterTab::Favorites => FilterTab::All,
            FilterTab::All => FilterTab::Unread,
        }
    }
}

/// Current time truncated to the millisecond resolution the store keeps.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Immutable snapshot of everything the entry list queries depend on.
///
/// Changes produce a new value through the `with_*` methods; the list
/// controller diffs old against new to decide whether to resubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    /// Feed/group scope underneath any search.
    pub scope: ViewScope,
    /// Present while searching, including the empty string.
    pub search: Option<String>,
    pub tab: FilterTab,
    pub sort_desc: bool,
    pub display_date: DateTime<Utc>,
}

impl ViewState {
    pub fn new(scope: ViewScope, tab: FilterTab, sort_desc: bool, display_date: DateTime<Utc>) -> Self {
        Self {
            scope,
            search: None,
            tab,
            sort_desc,
            display_date: truncate_millis(display_date),
        }
    }

    /// Scope that drives the id and paged queries.
    pub fn effective_scope(&self) -> ViewScope {
        match &self.search {
            Some(text) => ViewScope::SearchQuery(text.clone()),
            None => self.scope.clone(),
        }
    }

    /// The new-count slot follows the base scope even while searching.
    pub fn queries(&self) -> QuerySelection {
        let mut selection = select_query(
            &self.effective_scope(),
            self.tab,
            self.sort_desc,
            self.display_date,
        );
        if self.is_searching() {
            selection.new_count = CountQuery::for_scope(&self.scope, self.display_date);
        }
        selection
    }

    pub fn new_count_query(&self) -> CountQuery {
        self.queries().new_count
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    pub fn with_scope(&self, scope: ViewScope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    pub fn with_search(&self, search: Option<String>) -> Self {
        Self {
            search,
            ..self.clone()
        }
    }

    pub fn with_tab(&self, tab: FilterTab) -> Self {
        Self { tab, ..self.clone() }
    }

    pub fn with_sort_desc(&self, sort_desc: bool) -> Self {
        Self {
            sort_desc,
            ..self.clone()
        }
    }

    /// The display date never moves backwards.
    pub fn with_display_date(&self, display_date: DateTime<Utc>) -> Self {
        Self {
            display_date: truncate_millis(display_date).max(self.display_date),
            ..self.clone()
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(ViewScope::AllEntries, FilterTab::Unread, true, now_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_search_takes_precedence_over_scope() {
        let state = ViewState::default()
            .with_scope(ViewScope::FeedGroup(4))
            .with_search(Some(String::new()));
        assert_eq!(state.effective_scope(), ViewScope::SearchQuery(String::new()));

        let state = state.with_search(None);
        assert_eq!(state.effective_scope(), ViewScope::FeedGroup(4));
    }

    #[test]
    fn test_sentinel_feed_is_all_entries() {
        assert!(ViewScope::SingleFeed(ALL_ENTRIES_ID).is_all_entries());
        assert!(ViewScope::AllEntries.is_all_entries());
        assert!(!ViewScope::SingleFeed(3).is_all_entries());
        assert!(!ViewScope::FeedGroup(ALL_ENTRIES_ID).is_all_entries());
    }

    #[test]
    fn test_display_date_is_monotonic() {
        let start = now_millis();
        let state = ViewState::new(ViewScope::AllEntries, FilterTab::All, true, start);

        let earlier = state.with_display_date(start - Duration::hours(1));
        assert_eq!(earlier.display_date, start);

        let later = state.with_display_date(start + Duration::minutes(5));
        assert_eq!(later.display_date, start + Duration::minutes(5));
    }

    #[test]
    fn test_display_date_truncated_to_millis() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let state = ViewState::new(ViewScope::AllEntries, FilterTab::All, true, at);
        assert_eq!(state.display_date.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_equal_states_compare_equal() {
        let at = now_millis();
        let a = ViewState::new(ViewScope::SingleFeed(1), FilterTab::Unread, true, at);
        let b = ViewState::new(ViewScope::SingleFeed(1), FilterTab::Unread, true, at);
        assert_eq!(a, b);
        assert_ne!(a, b.with_tab(FilterTab::All));
    }

    #[test]
    fn test_new_count_follows_base_scope_while_searching() {
        let state = ViewState::default()
            .with_scope(ViewScope::FeedGroup(4))
            .with_search(Some("rust".into()));
        let queries = state.queries();
        assert_eq!(queries.ids.to_string(), "search('rust', desc)");
        assert_eq!(
            queries.new_count.scope,
            crate::view::query::CountScope::Group(4)
        );
    }

    #[test]
    fn test_filter_tab_cycles() {
        assert_eq!(FilterTab::Unread.next(), FilterTab::Favorites);
        assert_eq!(FilterTab::Favorites.next(), FilterTab::All);
        assert_eq!(FilterTab::All.next(), FilterTab::Unread);
    }
}
