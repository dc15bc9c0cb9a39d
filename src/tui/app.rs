use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::widgets::ListState;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::app::Result;
use crate::config::KeybindingConfig;
use crate::containers::{ContainersLayout, NavigationState};
use crate::details::{EntryDetails, FullTextOutcome};
use crate::domain::{FeedTree, TreeRow};
use crate::entries::{EntryList, UndoAction};
use crate::notify::Notifications;
use crate::prefs::{Preferences, HIDE_BUTTON_MARK_ALL_AS_READ, IS_REFRESHING, SORT_ORDER};
use crate::service::{Connectivity, ServiceAction, ServiceHandle, Target};
use crate::session::Session;
use crate::store::Store;
use crate::tui::event::Action;
use crate::view::{FilterTab, ViewScope, ViewState};

/// Load the next page when the selection gets this close to the end.
const LOAD_MORE_THRESHOLD: usize = 5;
const STATUS_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePane {
    Feeds,
    Entries,
    Details,
}

/// What the TUI shares with the rest of the program.
pub struct Shared<S: Store + Send + Sync + 'static> {
    pub store: Arc<S>,
    pub prefs: Arc<Preferences>,
    pub notifications: Arc<Notifications>,
    pub service: ServiceHandle,
    pub connectivity: Arc<dyn Connectivity>,
}

pub struct TuiApp<S: Store + Send + Sync + 'static> {
    store: Arc<S>,
    prefs: Arc<Preferences>,
    service: ServiceHandle,
    pub list: EntryList<S>,
    pub details: EntryDetails<S>,
    pub layout: ContainersLayout,
    pub tree: FeedTree,
    pub tree_state: ListState,
    pub entry_list_state: ListState,
    pub active_pane: ActivePane,
    pub details_scroll: u16,
    /// Keys go to the search text while set.
    pub search_input: bool,
    pub pending_delete: Option<(i64, String)>,
    pub undo: Option<UndoAction>,
    pub status_message: Option<(String, Instant)>,
    pub should_quit: bool,
    prefs_rx: broadcast::Receiver<String>,
    store_changes: watch::Receiver<u64>,
}

impl<S: Store + Send + Sync + 'static> TuiApp<S> {
    pub fn new(
        shared: Shared<S>,
        view_state: ViewState,
        page_size: usize,
        layout: ContainersLayout,
    ) -> Result<Self> {
        let Shared {
            store,
            prefs,
            notifications,
            service,
            connectivity,
        } = shared;

        let view_state = view_state.with_sort_desc(prefs.get_bool(SORT_ORDER));
        let list = EntryList::with_page_size(store.clone(), notifications, view_state, page_size);
        let details = EntryDetails::new(store.clone(), prefs.clone(), service.clone(), connectivity);
        let tree = FeedTree::new(store.get_all_groups()?, store.get_feeds_with_counts()?);

        let mut tree_state = ListState::default();
        tree_state.select(tree.index_of(&list.state().scope).or(Some(0)));

        Ok(Self {
            prefs_rx: prefs.subscribe(),
            store_changes: store.subscribe_changes(),
            store,
            prefs,
            service,
            list,
            details,
            layout,
            tree,
            tree_state,
            entry_list_state: ListState::default(),
            active_pane: ActivePane::Entries,
            details_scroll: 0,
            search_input: false,
            pending_delete: None,
            undo: None,
            status_message: None,
            should_quit: false,
        })
    }

    /// Reopen what the session had selected.
    pub fn restore_session(&mut self, session: &Session, now: Instant) {
        let Some(entry_id) = session.selected_entry.clone() else {
            return;
        };
        self.list.select(Some(entry_id.clone()));
        let navigation = session.navigation(self.layout.two_columns());
        if navigation.has_details() {
            match self.open_entry(&entry_id, now) {
                Ok(()) => self.layout.set_state(navigation, now),
                Err(e) => warn!("Could not reopen entry {}: {}", entry_id, e),
            }
        }
    }

    pub fn session(&self) -> Session {
        Session::capture(self.layout.state(), self.list.state(), self.list.selected())
    }

    pub fn set_status(&mut self, message: impl Into<String>, now: Instant) {
        self.status_message = Some((message.into(), now));
    }

    pub fn is_refreshing(&self) -> bool {
        self.prefs.get_bool(IS_REFRESHING)
    }

    pub fn mark_all_hidden(&self) -> bool {
        self.prefs.get_bool(HIDE_BUTTON_MARK_ALL_AS_READ)
    }

    pub fn details_open(&self) -> bool {
        self.layout.state().has_details() && self.details.entry().is_some()
    }

    /// Apply everything that happened in the background since the last call.
    /// Returns true when a redraw is due.
    pub fn poll_background(&mut self, now: Instant) -> Result<bool> {
        let mut changed = self.list.poll_events();
        changed |= self.details.poll_events()?;
        changed |= self.list.poll_search(now);
        changed |= self.layout.tick(now);

        while let Ok(key) = self.prefs_rx.try_recv() {
            if key == SORT_ORDER {
                self.list.set_sort_desc(self.prefs.get_bool(SORT_ORDER));
            }
            changed = true;
        }

        if self.store_changes.has_changed().unwrap_or(false) {
            self.store_changes.mark_unchanged();
            self.reload_tree()?;
            changed = true;
        }

        if let Some((_, at)) = &self.status_message {
            if now.duration_since(*at) >= STATUS_TIMEOUT {
                self.status_message = None;
                changed = true;
            }
        }

        self.sync_entry_selection();
        Ok(changed)
    }

    fn reload_tree(&mut self) -> Result<()> {
        self.tree
            .update(self.store.get_all_groups()?, self.store.get_feeds_with_counts()?);
        let max = self.tree.len().saturating_sub(1);
        if let Some(index) = self.tree_state.selected() {
            self.tree_state.select(Some(index.min(max)));
        }
        Ok(())
    }

    /// Keep a selection on the list once it has rows.
    fn sync_entry_selection(&mut self) {
        if self.list.selected_index().is_none() {
            let first = self.list.entries().first().map(|e| e.entry.id.clone());
            if first.is_some() {
                self.list.select(first);
            }
        }
        self.entry_list_state.select(self.list.selected_index());
    }

    fn selected_entry_id(&self) -> Option<String> {
        match self.active_pane {
            ActivePane::Details => self.details.entry_id().map(String::from),
            _ => self.list.selected().map(String::from),
        }
    }

    fn open_entry(&mut self, entry_id: &str, now: Instant) -> Result<()> {
        let ids = self.list.entry_ids().to_vec();
        drop(self.details.set_entry(entry_id, ids)?);
        self.details_scroll = 0;
        self.layout.set_state(NavigationState::TwoColumnsWithDetails, now);
        self.active_pane = ActivePane::Details;
        Ok(())
    }

    fn close_details(&mut self, now: Instant) {
        self.details.clear();
        let state = NavigationState::fallback(self.layout.two_columns());
        self.layout.set_state(state, now);
        self.active_pane = ActivePane::Entries;
    }

    fn move_entry_selection(&mut self, forward: bool) {
        let len = self.list.entries().len();
        if len == 0 {
            return;
        }
        let current = self.list.selected_index().unwrap_or(0);
        let next = if forward {
            (current + 1).min(len - 1)
        } else {
            current.saturating_sub(1)
        };
        let id = self.list.entries()[next].entry.id.clone();
        self.list.select(Some(id));
        self.entry_list_state.select(Some(next));

        if forward && next + LOAD_MORE_THRESHOLD >= len && self.list.has_more() {
            debug!("Selection near the end, loading more");
            self.list.load_more();
        }
    }

    fn move_tree_selection(&mut self, forward: bool) {
        if self.tree.is_empty() {
            return;
        }
        let current = self.tree_state.selected().unwrap_or(0);
        let next = if forward {
            (current + 1).min(self.tree.len() - 1)
        } else {
            current.saturating_sub(1)
        };
        self.tree_state.select(Some(next));
    }

    /// Keys typed while editing the search text.
    fn handle_search_key(&mut self, key: &KeyEvent, now: Instant) {
        let mut text = self.list.search_text().unwrap_or_default().to_string();
        match key.code {
            KeyCode::Esc => {
                self.search_input = false;
                self.list.close_search();
                return;
            }
            KeyCode::Enter => {
                self.search_input = false;
                return;
            }
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Char(c) => text.push(c),
            _ => return,
        }
        self.list.set_search_text(&text, now);
    }

    pub async fn handle_key(
        &mut self,
        key: KeyEvent,
        keybindings: &KeybindingConfig,
        now: Instant,
    ) -> Result<()> {
        if let Some((feed_id, title)) = self.pending_delete.take() {
            if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                self.store.delete_feed(feed_id)?;
                if self.list.state().scope == ViewScope::SingleFeed(feed_id) {
                    self.list.select_scope(ViewScope::AllEntries);
                }
                self.set_status(format!("Deleted feed: {}", title), now);
            } else {
                self.set_status("Delete cancelled", now);
            }
            return Ok(());
        }

        if self.search_input {
            self.handle_search_key(&key, now);
            return Ok(());
        }

        let action = keybindings.get_action(&key);
        self.handle_action(action, now).await
    }

    pub async fn handle_action(&mut self, action: Action, now: Instant) -> Result<()> {
        match action {
            Action::Quit => self.should_quit = true,
            Action::MoveUp | Action::MoveDown => {
                let forward = action == Action::MoveDown;
                match self.active_pane {
                    ActivePane::Feeds => self.move_tree_selection(forward),
                    ActivePane::Entries => self.move_entry_selection(forward),
                    ActivePane::Details if forward => {
                        self.details_scroll = self.details_scroll.saturating_add(1)
                    }
                    ActivePane::Details => {
                        self.details_scroll = self.details_scroll.saturating_sub(1)
                    }
                }
            }
            Action::NextPane | Action::PrevPane => {
                let forward = action == Action::NextPane;
                self.active_pane = match (self.active_pane, forward, self.details_open()) {
                    (ActivePane::Feeds, true, _) => ActivePane::Entries,
                    (ActivePane::Entries, true, true) => ActivePane::Details,
                    (ActivePane::Entries, true, false) => ActivePane::Feeds,
                    (ActivePane::Details, true, _) => ActivePane::Feeds,
                    (ActivePane::Feeds, false, true) => ActivePane::Details,
                    (ActivePane::Feeds, false, false) => ActivePane::Entries,
                    (ActivePane::Entries, false, _) => ActivePane::Feeds,
                    (ActivePane::Details, false, _) => ActivePane::Entries,
                };
            }
            Action::Select => match self.active_pane {
                ActivePane::Feeds => {
                    let scope = self.tree_state.selected().and_then(|i| self.tree.scope_at(i));
                    if let Some(scope) = scope {
                        self.list.select_scope(scope);
                        self.list.select(None);
                        self.active_pane = ActivePane::Entries;
                    }
                }
                ActivePane::Entries => {
                    if let Some(id) = self.list.selected().map(String::from) {
                        self.open_entry(&id, now)?;
                    }
                }
                ActivePane::Details => {}
            },
            Action::Back => {
                if self.details_open() {
                    self.close_details(now);
                } else if self.list.state().is_searching() {
                    self.list.close_search();
                }
            }
            Action::ToggleGroup => {
                if let Some(index) = self.tree_state.selected() {
                    self.tree.toggle(index);
                }
            }
            Action::TabUnread | Action::TabFavorites | Action::TabAll => {
                let tab = match action {
                    Action::TabUnread => FilterTab::Unread,
                    Action::TabFavorites => FilterTab::Favorites,
                    _ => FilterTab::All,
                };
                self.list.select_tab(tab);
                self.list.select(None);
            }
            Action::Search => {
                self.list.open_search();
                self.search_input = true;
                self.active_pane = ActivePane::Entries;
            }
            Action::ToggleRead => {
                if self.active_pane == ActivePane::Details {
                    if let Some(entry) = self.details.entry() {
                        if entry.entry.read {
                            drop(self.details.mark_unread()?);
                            self.set_status("Marked as unread", now);
                        }
                    }
                } else if let Some(id) = self.selected_entry_id() {
                    let (undo, _ticket) = self.list.toggle_read(&id)?;
                    self.set_status(format!("{} (u to undo)", undo.label), now);
                    self.undo = Some(undo);
                }
            }
            Action::ToggleFavorite => {
                if self.active_pane == ActivePane::Details {
                    drop(self.details.toggle_favorite()?);
                } else if let Some(id) = self.selected_entry_id() {
                    drop(self.list.toggle_favorite(&id)?);
                }
            }
            Action::MarkAllRead => {
                if self.mark_all_hidden() {
                    return Ok(());
                }
                if let Some((undo, _ticket)) = self.list.mark_all_as_read()? {
                    self.set_status(format!("{} (u to undo)", undo.label), now);
                    self.undo = Some(undo);
                }
            }
            Action::Undo => {
                if let Some(undo) = self.undo.take() {
                    let label = undo.label.clone();
                    self.list.undo(undo).await?;
                    self.set_status(format!("Undone: {}", label), now);
                }
            }
            Action::Refresh => {
                if self.list.badge().is_some() {
                    self.list.refresh_display_date();
                    self.list.select(None);
                } else if self.is_refreshing() {
                    self.set_status("Refresh already running", now);
                } else {
                    let target = Target::for_scope(&self.list.state().scope);
                    self.service.start(ServiceAction::RefreshFeeds, target);
                }
            }
            Action::FullText => {
                if self.details.entry().is_none() {
                    return Ok(());
                }
                match self.details.switch_full_text_mode().await? {
                    FullTextOutcome::Offline => self.set_status("Network error", now),
                    FullTextOutcome::Requested => self.set_status("Fetching full text...", now),
                    FullTextOutcome::Toggled(full) => {
                        self.details_scroll = 0;
                        let mode = if full { "full text" } else { "original" };
                        self.set_status(format!("Showing {}", mode), now);
                    }
                }
            }
            Action::OpenInBrowser => {
                // Opening from the list marks the entry read; details already did.
                let (link, unread_id) = match self.active_pane {
                    ActivePane::Details => {
                        (self.details.entry().and_then(|e| e.entry.link.clone()), None)
                    }
                    _ => match self.list.selected_index().map(|i| &self.list.entries()[i]) {
                        Some(item) => (
                            item.entry.link.clone(),
                            (!item.entry.read).then(|| item.entry.id.clone()),
                        ),
                        None => (None, None),
                    },
                };
                let Some(link) = link else {
                    return Ok(());
                };
                match open::that(&link) {
                    Ok(()) => {
                        if let Some(id) = unread_id {
                            drop(self.list.toggle_read(&id)?);
                        }
                    }
                    Err(e) => self.set_status(format!("Failed to open browser: {}", e), now),
                }
            }
            Action::PreviousEntry | Action::NextEntry => {
                let moved = if action == Action::NextEntry {
                    self.details.next()?
                } else {
                    self.details.previous()?
                };
                if moved {
                    self.details_scroll = 0;
                    self.list.select(self.details.entry_id().map(String::from));
                }
            }
            Action::ToggleSort => {
                let sort_desc = self.prefs.get_bool(SORT_ORDER);
                self.prefs.set_bool(SORT_ORDER, !sort_desc)?;
            }
            Action::DeleteFeed => {
                if self.active_pane == ActivePane::Feeds {
                    let row = self.tree_state.selected().and_then(|i| self.tree.rows().get(i));
                    if let Some(TreeRow::Feed { id, title, .. }) = row {
                        self.pending_delete = Some((*id, title.clone()));
                    }
                }
            }
            Action::None => {}
        }
        Ok(())
    }
}
