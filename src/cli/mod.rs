pub mod commands;
pub mod opml;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::fetcher::parallel::DEFAULT_WORKERS;

#[derive(Parser)]
#[command(name = "flaxfeed")]
#[command(about = "A terminal RSS/Atom reader with full-text extraction", long_about = None)]
pub struct Cli {
    /// Number of parallel workers for fetching feeds
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, global = true)]
    pub workers: usize,

    /// Directory for the database, preferences and session
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new feed
    Add {
        /// URL of the feed to add
        url: String,
        /// Put the feed in this group, creating it if needed
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Remove a feed
    Remove {
        /// URL of the feed to remove
        url: String,
    },
    /// Import feeds from an OPML file; nested outlines become groups
    Import {
        /// Path to the OPML file
        path: PathBuf,
    },
    /// Update all feeds
    Update,
    /// List feeds or entries
    List {
        /// Show entries instead of feeds
        #[arg(long)]
        entries: bool,
    },
    /// Manage feed groups
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Turn full-text extraction on or off for a feed
    FullText {
        /// URL of the feed
        url: String,
        /// Turn it off instead
        #[arg(long)]
        off: bool,
    },
    /// Launch the TUI
    Tui,
}

#[derive(Subcommand)]
pub enum GroupAction {
    /// Create a group
    Add { title: String },
    /// List groups and their feeds
    List,
    /// Delete a group; its feeds become ungrouped
    Remove { title: String },
    /// Move a feed into a group, or out of any group when none is given
    Assign {
        /// URL of the feed
        url: String,
        /// Title of the group
        group: Option<String>,
    },
}
