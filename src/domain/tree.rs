//! Flattened feed/group tree for the navigation pane.

use std::collections::HashSet;

use crate::domain::{FeedWithCount, Group};
use crate::view::ViewScope;

#[derive(Debug, Clone, PartialEq)]
pub enum TreeRow {
    AllEntries {
        unread: i64,
    },
    Group {
        id: i64,
        title: String,
        unread: i64,
        expanded: bool,
    },
    Feed {
        id: i64,
        title: String,
        unread: i64,
        /// Drawn indented under its group.
        nested: bool,
    },
}

impl TreeRow {
    pub fn scope(&self) -> ViewScope {
        match self {
            TreeRow::AllEntries { .. } => ViewScope::AllEntries,
            TreeRow::Group { id, .. } => ViewScope::FeedGroup(*id),
            TreeRow::Feed { id, .. } => ViewScope::SingleFeed(*id),
        }
    }

    pub fn unread(&self) -> i64 {
        match self {
            TreeRow::AllEntries { unread }
            | TreeRow::Group { unread, .. }
            | TreeRow::Feed { unread, .. } => *unread,
        }
    }
}

/// Groups first (with their feeds when expanded), then ungrouped feeds.
#[derive(Debug, Default)]
pub struct FeedTree {
    groups: Vec<Group>,
    feeds: Vec<FeedWithCount>,
    expanded: HashSet<i64>,
    rows: Vec<TreeRow>,
}

impl FeedTree {
    pub fn new(groups: Vec<Group>, feeds: Vec<FeedWithCount>) -> Self {
        let mut tree = Self {
            groups,
            feeds,
            expanded: HashSet::new(),
            rows: Vec::new(),
        };
        tree.rebuild();
        tree
    }

    /// Replace the data, keeping which groups are expanded.
    pub fn update(&mut self, groups: Vec<Group>, feeds: Vec<FeedWithCount>) {
        self.expanded
            .retain(|id| groups.iter().any(|group| group.id == *id));
        self.groups = groups;
        self.feeds = feeds;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let total: i64 = self.feeds.iter().map(|f| f.unread).sum();
        let mut rows = vec![TreeRow::AllEntries { unread: total }];

        for group in &self.groups {
            let members: Vec<&FeedWithCount> = self
                .feeds
                .iter()
                .filter(|f| f.feed.group_id == Some(group.id))
                .collect();
            let expanded = self.expanded.contains(&group.id);
            rows.push(TreeRow::Group {
                id: group.id,
                title: group.title.clone(),
                unread: members.iter().map(|f| f.unread).sum(),
                expanded,
            });
            if expanded {
                rows.extend(members.into_iter().map(|f| Self::feed_row(f, true)));
            }
        }

        rows.extend(
            self.feeds
                .iter()
                .filter(|f| f.feed.group_id.is_none())
                .map(|f| Self::feed_row(f, false)),
        );
        self.rows = rows;
    }

    fn feed_row(feed: &FeedWithCount, nested: bool) -> TreeRow {
        TreeRow::Feed {
            id: feed.feed.id,
            title: feed.feed.display_title().to_string(),
            unread: feed.unread,
            nested,
        }
    }

    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn scope_at(&self, index: usize) -> Option<ViewScope> {
        self.rows.get(index).map(TreeRow::scope)
    }

    pub fn index_of(&self, scope: &ViewScope) -> Option<usize> {
        if scope.is_all_entries() {
            return Some(0);
        }
        self.rows.iter().position(|row| &row.scope() == scope)
    }

    /// Expand or collapse the group at `index`. Returns false for other rows.
    pub fn toggle(&mut self, index: usize) -> bool {
        let Some(TreeRow::Group { id, .. }) = self.rows.get(index) else {
            return false;
        };
        let id = *id;
        if !self.expanded.remove(&id) {
            self.expanded.insert(id);
        }
        self.rebuild();
        true
    }

    pub fn group_title(&self, id: i64) -> Option<&str> {
        self.groups
            .iter()
            .find(|group| group.id == id)
            .map(|group| group.title.as_str())
    }

    pub fn feed_title(&self, id: i64) -> Option<&str> {
        self.feeds
            .iter()
            .find(|f| f.feed.id == id)
            .map(|f| f.feed.display_title())
    }

    /// Title for the list header.
    pub fn scope_title(&self, scope: &ViewScope) -> String {
        match scope {
            s if s.is_all_entries() => "All entries".to_string(),
            ViewScope::FeedGroup(id) => self.group_title(*id).unwrap_or("Group").to_string(),
            ViewScope::SingleFeed(id) => self.feed_title(*id).unwrap_or("Feed").to_string(),
            ViewScope::SearchQuery(text) => format!("Search: {}", text),
            ViewScope::AllEntries => "All entries".to_string(),
        }
    }
}
