//! Entry list controller.
//!
//! Holds the current [`ViewState`] and the three live subscriptions behind
//! the list (ids, current page, new-entry count). Every state change goes
//! through [`EntryList::apply`], which resubscribes only when the state
//! actually differs.

pub mod mutation;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::Result;
use crate::domain::EntryWithFeed;
use crate::live::{self, LiveEvent, LiveQuery, LiveUpdate, Slot, CHANNEL_CAPACITY};
use crate::notify::Notifications;
use crate::store::Store;
use crate::view::{now_millis, FilterTab, ViewScope, ViewState};

pub use mutation::{Mutation, MutationDispatcher, MutationTicket, UndoAction, MAX_BATCH_SIZE};

pub const PAGE_SIZE: usize = 30;
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(700);

pub struct EntryList<S: Store + Send + Sync + 'static> {
    store: Arc<S>,
    mutations: MutationDispatcher<S>,
    notifications: Arc<Notifications>,
    state: ViewState,
    generation: u64,
    page_size: usize,
    page_limit: usize,
    /// Window of the last page that arrived; 0 before the first one.
    loaded_limit: usize,

    ids_slot: Slot,
    page_slot: Slot,
    count_slot: Slot,
    events_tx: mpsc::Sender<LiveEvent>,
    events_rx: mpsc::Receiver<LiveEvent>,

    entry_ids: Option<Vec<String>>,
    entries: Vec<EntryWithFeed>,
    new_count: Option<i64>,
    selected: Option<String>,
    pending_search: Option<(String, Instant)>,
}

impl<S: Store + Send + Sync + 'static> EntryList<S> {
    /// Create the controller and start observing `state`. Must be called
    /// inside a tokio runtime.
    pub fn new(store: Arc<S>, notifications: Arc<Notifications>, state: ViewState) -> Self {
        Self::with_page_size(store, notifications, state, PAGE_SIZE)
    }

    pub fn with_page_size(
        store: Arc<S>,
        notifications: Arc<Notifications>,
        state: ViewState,
        page_size: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let page_size = page_size.max(1);
        let mut list = Self {
            mutations: MutationDispatcher::new(store.clone()),
            store,
            notifications,
            state,
            generation: 0,
            page_size,
            page_limit: page_size,
            loaded_limit: 0,
            ids_slot: Slot::default(),
            page_slot: Slot::default(),
            count_slot: Slot::default(),
            events_tx,
            events_rx,
            entry_ids: None,
            entries: Vec::new(),
            new_count: None,
            selected: None,
            pending_search: None,
        };
        list.resubscribe();
        list
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entry_ids(&self) -> &[String] {
        self.entry_ids.as_deref().unwrap_or(&[])
    }

    pub fn entries(&self) -> &[EntryWithFeed] {
        &self.entries
    }

    /// New-entry badge; hidden when zero.
    pub fn badge(&self) -> Option<i64> {
        self.new_count.filter(|count| *count > 0)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn select(&mut self, entry_id: Option<String>) {
        self.selected = entry_id;
    }

    pub fn selected_index(&self) -> Option<usize> {
        let selected = self.selected.as_deref()?;
        self.entries.iter().position(|e| e.entry.id == selected)
    }

    /// Whether the last page that arrived was full, so more rows may exist.
    pub fn has_more(&self) -> bool {
        self.loaded_limit > 0 && self.entries.len() >= self.loaded_limit
    }

    /// A grown page window has been requested but not delivered yet.
    pub fn is_loading_page(&self) -> bool {
        self.loaded_limit != self.page_limit
    }

    pub fn dispatcher(&self) -> &MutationDispatcher<S> {
        &self.mutations
    }

    /// Switch to `state`. Returns whether the subscriptions were replaced.
    pub fn apply(&mut self, state: ViewState) -> bool {
        if state == self.state && self.ids_slot.is_active() {
            return false;
        }
        if state.effective_scope() != self.state.effective_scope() || state.tab != self.state.tab
        {
            self.page_limit = self.page_size;
        }
        self.state = state;
        self.resubscribe();
        true
    }

    fn resubscribe(&mut self) {
        self.ids_slot.cancel();
        self.page_slot.cancel();
        self.count_slot.cancel();
        self.generation += 1;
        self.entry_ids = None;
        self.new_count = None;

        let queries = self.state.queries();
        debug!(
            "Resolved {} / {} (generation {})",
            queries.ids, queries.new_count, self.generation
        );

        let generation = self.generation;
        let (store, tx) = (&self.store, &self.events_tx);
        self.ids_slot.replace(|| {
            live::observe(
                store.clone(),
                LiveQuery::Ids(queries.ids.clone()),
                generation,
                tx.clone(),
            )
        });
        self.count_slot.replace(|| {
            live::observe(
                store.clone(),
                LiveQuery::NewCount(queries.new_count),
                generation,
                tx.clone(),
            )
        });
        self.start_page();
    }

    fn start_page(&mut self) {
        let query = LiveQuery::Page {
            query: self.state.queries().entries,
            limit: self.page_limit,
        };
        let (store, tx, generation) = (&self.store, &self.events_tx, self.generation);
        self.page_slot
            .replace(|| live::observe(store.clone(), query, generation, tx.clone()));
    }

    pub fn select_scope(&mut self, scope: ViewScope) -> bool {
        self.selected = None;
        let state = self.state.with_scope(scope);
        self.apply(state)
    }

    /// Switching tabs also brings in everything that arrived meanwhile.
    pub fn select_tab(&mut self, tab: FilterTab) -> bool {
        self.selected = None;
        let state = self.state.with_tab(tab).with_display_date(now_millis());
        self.apply(state)
    }

    pub fn open_search(&mut self) -> bool {
        if self.state.is_searching() {
            return false;
        }
        self.selected = None;
        let state = self.state.with_search(Some(String::new()));
        self.apply(state)
    }

    pub fn close_search(&mut self) -> bool {
        self.pending_search = None;
        if !self.state.is_searching() {
            return false;
        }
        self.selected = None;
        let state = self.state.with_search(None);
        self.apply(state)
    }

    /// Queue a search text edit; it takes effect after [`SEARCH_DEBOUNCE`].
    pub fn set_search_text(&mut self, text: &str, now: Instant) {
        if self.state.is_searching() {
            self.pending_search = Some((text.to_string(), now + SEARCH_DEBOUNCE));
        }
    }

    /// Text the user is typing, including a not yet applied edit.
    pub fn search_text(&self) -> Option<&str> {
        match &self.pending_search {
            Some((text, _)) => Some(text.as_str()),
            None => self.state.search.as_deref(),
        }
    }

    /// Apply the pending search edit once its debounce has elapsed.
    pub fn poll_search(&mut self, now: Instant) -> bool {
        match &self.pending_search {
            Some((_, due)) if now >= *due => {}
            _ => return false,
        }
        let Some((text, _)) = self.pending_search.take() else {
            return false;
        };
        self.selected = None;
        let state = self.state.with_search(Some(text));
        self.apply(state)
    }

    pub fn set_sort_desc(&mut self, sort_desc: bool) -> bool {
        let state = self.state.with_sort_desc(sort_desc);
        self.apply(state)
    }

    pub fn refresh_display_date(&mut self) -> bool {
        let state = self.state.with_display_date(now_millis());
        self.apply(state)
    }

    /// Grow the page window. Returns false when everything is loaded or a
    /// page is still on its way.
    pub fn load_more(&mut self) -> bool {
        if self.is_loading_page() || !self.has_more() {
            return false;
        }
        self.page_limit += self.page_size;
        debug!("Loading up to {} entries", self.page_limit);
        self.start_page();
        true
    }

    /// Apply a live update. Returns whether anything visible changed.
    pub fn handle_event(&mut self, event: LiveEvent) -> bool {
        if event.generation != self.generation {
            debug!(
                "Dropping stale update (generation {} < {})",
                event.generation, self.generation
            );
            return false;
        }
        match event.update {
            LiveUpdate::Ids(ids) => {
                self.entry_ids = Some(ids);
                self.check_auto_reveal();
            }
            LiveUpdate::Page { limit, entries } => {
                if limit != self.page_limit {
                    return false;
                }
                self.loaded_limit = limit;
                self.entries = entries;
            }
            LiveUpdate::NewCount(count) => {
                self.new_count = Some(count);
                self.check_auto_reveal();
            }
            LiveUpdate::TaskCount(_) => return false,
        }
        true
    }

    /// An empty list with new entries waiting shows them right away, except
    /// on the favorites tab where new entries can never match.
    fn check_auto_reveal(&mut self) {
        let (Some(ids), Some(count)) = (&self.entry_ids, self.new_count) else {
            return;
        };
        if ids.is_empty() && count > 0 && self.state.tab != FilterTab::Favorites {
            info!("Revealing {} new entries in empty list", count);
            self.refresh_display_date();
        }
    }

    /// Drain queued live updates without waiting.
    pub fn poll_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            changed |= self.handle_event(event);
        }
        changed
    }

    /// Wait for the next live update and apply it.
    pub async fn next_event(&mut self) -> Option<bool> {
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }

    /// Mark every entry of the current id list read. Returns `None` when the
    /// list is empty.
    pub fn mark_all_as_read(&mut self) -> Result<Option<(UndoAction, MutationTicket)>> {
        let ids = self.entry_ids().to_vec();
        if ids.is_empty() {
            return Ok(None);
        }
        let previous = self.store.read_states(&ids)?;

        for entry in &mut self.entries {
            entry.entry.read = true;
        }
        if self.state.scope.is_all_entries() {
            self.notifications.cancel_all();
        }

        let mutation = Mutation::MarkRead(ids);
        let undo = UndoAction {
            label: format!("Marked {} entries as read", previous.len()),
            inverse: mutation.inverse(&previous),
        };
        let ticket = self.mutations.dispatch(mutation);
        Ok(Some((undo, ticket)))
    }

    /// Flip the read flag of one entry, optimistically.
    pub fn toggle_read(&mut self, entry_id: &str) -> Result<(UndoAction, MutationTicket)> {
        let was_read = match self.entries.iter().find(|e| e.entry.id == entry_id) {
            Some(e) => e.entry.read,
            None => self
                .store
                .read_states(&[entry_id.to_string()])?
                .get(entry_id)
                .copied()
                .unwrap_or(false),
        };
        if let Some(e) = self.entries.iter_mut().find(|e| e.entry.id == entry_id) {
            e.entry.read = !was_read;
        }

        let ids = vec![entry_id.to_string()];
        let (mutation, inverse, label) = if was_read {
            (
                Mutation::MarkUnread(ids.clone()),
                Mutation::MarkRead(ids),
                "Marked as unread",
            )
        } else {
            (
                Mutation::MarkRead(ids.clone()),
                Mutation::MarkUnread(ids),
                "Marked as read",
            )
        };
        let ticket = self.mutations.dispatch(mutation);
        Ok((
            UndoAction {
                label: label.to_string(),
                inverse,
            },
            ticket,
        ))
    }

    pub fn toggle_favorite(&mut self, entry_id: &str) -> Result<MutationTicket> {
        let favorite = match self.entries.iter_mut().find(|e| e.entry.id == entry_id) {
            Some(e) => {
                e.entry.favorite = !e.entry.favorite;
                e.entry.favorite
            }
            None => !self
                .store
                .get_entry(entry_id)?
                .map(|entry| entry.favorite)
                .unwrap_or(false),
        };
        Ok(self.mutations.dispatch(Mutation::SetFavorite {
            id: entry_id.to_string(),
            favorite,
        }))
    }

    /// Run the inverse mutation, wait for it, then bring the list up to date.
    pub async fn undo(&mut self, action: UndoAction) -> Result<usize> {
        let touched = if action.inverse.is_empty() {
            0
        } else {
            self.mutations.dispatch(action.inverse).wait().await?
        };
        self.refresh_display_date();
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entry, Feed};
    use crate::store::SqliteStore;
    use crate::view::EntryQuery;
    use chrono::{Duration as ChronoDuration, Utc};

    struct Fixture {
        store: Arc<SqliteStore>,
        feed_id: i64,
        notifications: Arc<Notifications>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = SqliteStore::in_memory().unwrap();
            let feed_id = store
                .add_feed(&Feed::new("https://example.com/feed.xml".into()))
                .unwrap();
            Self {
                store: Arc::new(store),
                feed_id,
                notifications: Arc::new(Notifications::new()),
            }
        }

        fn add(&self, key: &str, age_minutes: i64) -> String {
            let mut entry = Entry::new(self.feed_id, "https://example.com/feed.xml", key);
            entry.fetched_at = Utc::now() - ChronoDuration::minutes(age_minutes);
            self.store.add_entries(&[entry.clone()]).unwrap();
            entry.id
        }

        fn list(&self, tab: FilterTab) -> EntryList<SqliteStore> {
            let state = ViewState::new(ViewScope::AllEntries, tab, true, now_millis());
            EntryList::new(self.store.clone(), self.notifications.clone(), state)
        }
    }

    async fn settle(list: &mut EntryList<SqliteStore>) {
        // ids, page and count for the current generation
        let mut seen = 0;
        while seen < 3 {
            let event = list.events_rx.recv().await.unwrap();
            if event.generation == list.generation {
                seen += 1;
            }
            list.handle_event(event);
        }
    }

    #[tokio::test]
    async fn test_initial_load() {
        let fx = Fixture::new();
        let a = fx.add("a", 10);
        let b = fx.add("b", 5);
        let mut list = fx.list(FilterTab::Unread);
        settle(&mut list).await;

        assert_eq!(list.entry_ids(), &[b.clone(), a.clone()]);
        assert_eq!(list.entries().len(), 2);
        assert_eq!(list.badge(), None);
    }

    #[tokio::test]
    async fn test_apply_same_state_does_not_resubscribe() {
        let fx = Fixture::new();
        let mut list = fx.list(FilterTab::All);
        let generation = list.generation();

        assert!(!list.apply(list.state().clone()));
        assert_eq!(list.generation(), generation);

        assert!(list.select_scope(ViewScope::SingleFeed(fx.feed_id)));
        assert_eq!(list.generation(), generation + 1);
    }

    #[tokio::test]
    async fn test_stale_generation_is_ignored() {
        let fx = Fixture::new();
        let mut list = fx.list(FilterTab::All);
        let stale = LiveEvent {
            generation: list.generation() - 1,
            update: LiveUpdate::Ids(vec!["x".into()]),
        };
        assert!(!list.handle_event(stale));
        assert!(list.entry_ids().is_empty());
    }

    #[tokio::test]
    async fn test_new_entries_show_as_badge_in_non_empty_list() {
        let fx = Fixture::new();
        let old = fx.add("old", 10);
        let mut list = fx.list(FilterTab::Unread);
        settle(&mut list).await;
        let generation = list.generation();

        // Arrives after the display date.
        let mut entry = Entry::new(fx.feed_id, "https://example.com/feed.xml", "new");
        entry.fetched_at = Utc::now() + ChronoDuration::minutes(1);
        fx.store.add_entries(&[entry]).unwrap();

        while list.badge().is_none() {
            list.next_event().await.unwrap();
        }
        assert_eq!(list.badge(), Some(1));
        assert_eq!(list.entry_ids(), &[old]);
        assert_eq!(list.generation(), generation);
    }

    #[tokio::test]
    async fn test_empty_list_auto_reveals_new_entries() {
        let fx = Fixture::new();
        let mut list = fx.list(FilterTab::Unread);
        settle(&mut list).await;
        let generation = list.generation();

        let mut entry = Entry::new(fx.feed_id, "https://example.com/feed.xml", "new");
        entry.fetched_at = Utc::now() + ChronoDuration::milliseconds(200);
        let id = entry.id.clone();
        fx.store.add_entries(&[entry]).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        while list.generation() == generation {
            list.next_event().await.unwrap();
        }
        settle(&mut list).await;
        assert_eq!(list.entry_ids(), &[id]);
    }

    #[tokio::test]
    async fn test_favorites_tab_never_auto_reveals() {
        let fx = Fixture::new();
        let mut list = fx.list(FilterTab::Favorites);
        settle(&mut list).await;
        let generation = list.generation();

        let event = LiveEvent {
            generation,
            update: LiveUpdate::NewCount(4),
        };
        list.handle_event(event);
        assert_eq!(list.generation(), generation);
        assert_eq!(list.badge(), Some(4));
    }

    #[tokio::test]
    async fn test_search_debounce() {
        let fx = Fixture::new();
        let mut list = fx.list(FilterTab::Favorites);
        assert!(list.open_search());
        assert_eq!(
            list.state().queries().ids,
            EntryQuery::Search {
                text: String::new(),
                sort_desc: true
            }
        );

        let start = Instant::now();
        list.set_search_text("rust", start);
        assert_eq!(list.search_text(), Some("rust"));
        assert!(!list.poll_search(start + Duration::from_millis(699)));
        assert!(list.poll_search(start + Duration::from_millis(700)));
        assert_eq!(list.state().search.as_deref(), Some("rust"));

        assert!(list.close_search());
        assert!(!list.state().is_searching());
    }

    #[tokio::test]
    async fn test_select_tab_advances_display_date() {
        let fx = Fixture::new();
        let mut list = fx.list(FilterTab::Unread);
        let before = list.state().display_date;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert!(list.select_tab(FilterTab::All));
        assert!(list.state().display_date > before);
        assert_eq!(list.selected(), None);
    }

    #[tokio::test]
    async fn test_mark_all_as_read_then_undo() {
        let fx = Fixture::new();
        let ids: Vec<String> = (0..5).map(|i| fx.add(&i.to_string(), 10)).collect();
        fx.store.mark_read(&ids[..2]).unwrap();
        let before = fx.store.read_states(&ids).unwrap();

        fx.notifications.add(5);
        let mut list = fx.list(FilterTab::All);
        settle(&mut list).await;

        let (undo, ticket) = list.mark_all_as_read().unwrap().unwrap();
        assert_eq!(ticket.wait().await.unwrap(), 3);
        assert_eq!(fx.notifications.pending(), 0);
        assert!(fx.store.read_states(&ids).unwrap().values().all(|r| *r));

        assert_eq!(list.undo(undo).await.unwrap(), 3);
        assert_eq!(fx.store.read_states(&ids).unwrap(), before);
    }

    #[tokio::test]
    async fn test_mark_all_in_feed_keeps_notifications() {
        let fx = Fixture::new();
        fx.add("a", 10);
        fx.notifications.add(1);
        let mut list = fx.list(FilterTab::All);
        list.select_scope(ViewScope::SingleFeed(fx.feed_id));
        settle(&mut list).await;

        list.mark_all_as_read().unwrap().unwrap().1.wait().await.unwrap();
        assert_eq!(fx.notifications.pending(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_while_searching_clears_notifications() {
        let fx = Fixture::new();
        fx.add("a", 10);
        fx.notifications.add(2);
        let mut list = fx.list(FilterTab::All);
        list.open_search();
        settle(&mut list).await;

        list.mark_all_as_read().unwrap().unwrap().1.wait().await.unwrap();
        assert_eq!(fx.notifications.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_mutations_fall_back_to_stored_state() {
        let fx = Fixture::new();
        let ids: Vec<String> = (0..3).map(|i| fx.add(&i.to_string(), 10)).collect();
        let mut list = fx.list(FilterTab::All);
        settle(&mut list).await;
        fx.store.reject_state_writes();

        let ticket = list.toggle_favorite(&ids[0]).unwrap();
        assert!(list.entries().iter().any(|e| e.entry.favorite));
        assert!(ticket.wait().await.is_err());

        let (_, ticket) = list.mark_all_as_read().unwrap().unwrap();
        assert!(list.entries().iter().all(|e| e.entry.read));
        assert!(ticket.wait().await.is_err());

        tokio::time::timeout(Duration::from_secs(5), async {
            while list
                .entries()
                .iter()
                .any(|e| e.entry.read || e.entry.favorite)
            {
                list.next_event().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(list.entries().len(), 3);
    }

    #[tokio::test]
    async fn test_toggle_read_is_optimistic() {
        let fx = Fixture::new();
        let id = fx.add("a", 10);
        let mut list = fx.list(FilterTab::All);
        settle(&mut list).await;

        let (undo, ticket) = list.toggle_read(&id).unwrap();
        assert!(list.entries()[0].entry.read);
        ticket.wait().await.unwrap();
        assert_eq!(undo.inverse, Mutation::MarkUnread(vec![id.clone()]));

        list.undo(undo).await.unwrap();
        assert_eq!(fx.store.read_states(&[id.clone()]).unwrap()[&id], false);
    }

    #[tokio::test]
    async fn test_toggle_favorite() {
        let fx = Fixture::new();
        let id = fx.add("a", 10);
        let mut list = fx.list(FilterTab::All);
        settle(&mut list).await;

        list.toggle_favorite(&id).unwrap().wait().await.unwrap();
        assert!(fx.store.get_entry(&id).unwrap().unwrap().favorite);
    }

    #[tokio::test]
    async fn test_load_more_grows_page() {
        let fx = Fixture::new();
        for i in 0..5 {
            fx.add(&i.to_string(), 10 + i);
        }
        let state = ViewState::new(ViewScope::AllEntries, FilterTab::All, true, now_millis());
        let mut list =
            EntryList::with_page_size(fx.store.clone(), fx.notifications.clone(), state, 2);
        settle(&mut list).await;
        assert_eq!(list.entries().len(), 2);

        assert!(list.load_more());
        // Still loading: the previous full page keeps `has_more` true.
        assert!(list.is_loading_page());
        assert!(list.has_more());
        assert!(!list.load_more());
        while list.entries().len() < 4 {
            list.next_event().await.unwrap();
        }
        assert_eq!(list.entries().len(), 4);
        assert!(!list.is_loading_page());
        assert!(list.load_more());
        while list.entries().len() < 5 {
            list.next_event().await.unwrap();
        }
        assert!(!list.load_more());
    }
}
