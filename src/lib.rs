//! # Flaxfeed
//!
//! A terminal RSS/Atom reader with live entry lists and full-text extraction.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → Normalizer → Store ⇄ live queries → controllers → TUI
//!                          ↑
//!            background service (refresh, mobilizer)
//! ```
//!
//! Views never read the database directly: they hold live subscriptions
//! that re-run whenever the store changes, and write through a mutation
//! dispatcher that runs off the UI task.
//!
//! ## Quick Start
//!
//! ```bash
//! flaxfeed add https://blog.rust-lang.org/feed.xml --group Rust
//! flaxfeed update
//! flaxfeed tui
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires the store, fetchers, preferences
/// and notifications together for both the CLI and the TUI.
pub mod app;

/// Command-line interface using clap, plus OPML import.
pub mod cli;

/// Configuration from `~/.config/flaxfeed/config.toml`: colors,
/// keybindings, layout, list paging, mobilizer and network settings.
pub mod config;

/// Master/details layout state machine with its enter/exit animations.
pub mod containers;

/// Controller of the reading view: neighbours, favorites, full-text mode.
pub mod details;

/// Core domain models.
///
/// - [`Feed`](domain::Feed) and [`Group`](domain::Group)
/// - [`Entry`](domain::Entry) with SHA256 ids and its read/favorite flags
/// - [`FeedTree`](domain::FeedTree) for the navigation pane
pub mod domain;

/// Controller of the entry list: view state, paging, badge, mutations and undo.
pub mod entries;

/// HTTP fetching with conditional request support.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for feed fetching
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): Concurrent fetching with semaphore
pub mod fetcher;

/// Live queries: subscriptions that re-emit whenever the store changes.
pub mod live;

/// Full-text extraction through headless Chrome.
pub mod mobilizer;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into unified [`Entry`](domain::Entry) structs.
pub mod normalizer;

/// Pending new-entry notification count.
pub mod notify;

/// Runtime preferences persisted as TOML and broadcast on change.
pub mod prefs;

/// Background service that refreshes feeds and drains the mobilization queue.
pub mod service;

/// What the TUI restores on the next launch.
pub mod session;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Terminal user interface built with ratatui.
pub mod tui;

/// View state and the queries it resolves to.
pub mod view;
