pub mod entry;
pub mod feed;
pub mod tree;

pub use entry::{Entry, EntryWithFeed};
pub use feed::{Feed, FeedUpdate, FeedWithCount, Group, ALL_ENTRIES_ID};
pub use tree::{FeedTree, TreeRow};
