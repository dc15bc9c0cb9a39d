//! Reading view controller for a single entry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::{FlaxfeedError, Result};
use crate::domain::EntryWithFeed;
use crate::entries::{Mutation, MutationDispatcher, MutationTicket};
use crate::live::{self, LiveEvent, LiveQuery, LiveUpdate, Slot, CHANNEL_CAPACITY};
use crate::prefs::{Preferences, ENABLE_SWIPE_ENTRY};
use crate::service::{Connectivity, ServiceAction, ServiceHandle, Target};
use crate::store::Store;

/// What a full-text toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullTextOutcome {
    /// Switched between original and full text; carries the new preference.
    Toggled(bool),
    /// Extraction queued.
    Requested,
    /// No network; nothing queued.
    Offline,
}

/// Previous and next ids around `id` in `ids`.
pub fn neighbours(id: &str, ids: &[String]) -> (Option<String>, Option<String>) {
    match ids.iter().position(|candidate| candidate == id) {
        Some(pos) => (
            pos.checked_sub(1).map(|p| ids[p].clone()),
            ids.get(pos + 1).cloned(),
        ),
        None => (None, None),
    }
}

pub struct EntryDetails<S: Store + Send + Sync + 'static> {
    store: Arc<S>,
    prefs: Arc<Preferences>,
    service: ServiceHandle,
    connectivity: Arc<dyn Connectivity>,
    mutations: MutationDispatcher<S>,

    entry: Option<EntryWithFeed>,
    all_ids: Vec<String>,
    previous_id: Option<String>,
    next_id: Option<String>,
    prefer_full_text: bool,
    mobilizing: bool,

    task_slot: Slot,
    generation: u64,
    events_tx: mpsc::Sender<LiveEvent>,
    events_rx: mpsc::Receiver<LiveEvent>,
}

impl<S: Store + Send + Sync + 'static> EntryDetails<S> {
    pub fn new(
        store: Arc<S>,
        prefs: Arc<Preferences>,
        service: ServiceHandle,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            mutations: MutationDispatcher::new(store.clone()),
            store,
            prefs,
            service,
            connectivity,
            entry: None,
            all_ids: Vec::new(),
            previous_id: None,
            next_id: None,
            prefer_full_text: false,
            mobilizing: false,
            task_slot: Slot::default(),
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn entry(&self) -> Option<&EntryWithFeed> {
        self.entry.as_ref()
    }

    pub fn entry_id(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.entry.id.as_str())
    }

    pub fn previous_id(&self) -> Option<&str> {
        self.previous_id.as_deref()
    }

    pub fn next_id(&self) -> Option<&str> {
        self.next_id.as_deref()
    }

    pub fn prefer_full_text(&self) -> bool {
        self.prefer_full_text
    }

    pub fn is_mobilizing(&self) -> bool {
        self.mobilizing
    }

    /// Show `entry_id`, positioned within `all_ids`. Marks it read; the
    /// returned ticket completes once the read flag is stored.
    pub fn set_entry(
        &mut self,
        entry_id: &str,
        all_ids: Vec<String>,
    ) -> Result<Option<MutationTicket>> {
        let mut found = self
            .store
            .get_entry_with_feed(entry_id)?
            .ok_or_else(|| FlaxfeedError::EntryNotFound(entry_id.to_string()))?;
        let feed = self.store.get_feed(found.entry.feed_id)?;

        let (previous_id, next_id) = neighbours(entry_id, &all_ids);
        self.previous_id = previous_id;
        self.next_id = next_id;
        self.all_ids = all_ids;
        self.prefer_full_text = feed.map(|f| f.retrieve_full_text).unwrap_or(false);
        self.mobilizing = false;

        let ticket = if found.entry.read {
            None
        } else {
            found.entry.read = true;
            Some(
                self.mutations
                    .dispatch(Mutation::MarkRead(vec![entry_id.to_string()])),
            )
        };
        self.entry = Some(found);
        self.observe_tasks(entry_id);
        Ok(ticket)
    }

    pub fn clear(&mut self) {
        self.task_slot.cancel();
        self.generation += 1;
        self.entry = None;
        self.all_ids.clear();
        self.previous_id = None;
        self.next_id = None;
        self.mobilizing = false;
    }

    fn observe_tasks(&mut self, entry_id: &str) {
        self.generation += 1;
        let (store, tx, generation) = (&self.store, &self.events_tx, self.generation);
        self.task_slot.replace(|| {
            live::observe(
                store.clone(),
                LiveQuery::TaskCount(entry_id.to_string()),
                generation,
                tx.clone(),
            )
        });
    }

    fn swipe_to(&mut self, target: Option<String>) -> Result<bool> {
        if !self.prefs.get_bool(ENABLE_SWIPE_ENTRY) {
            return Ok(false);
        }
        let Some(id) = target else {
            return Ok(false);
        };
        let all_ids = self.all_ids.clone();
        self.set_entry(&id, all_ids)?;
        Ok(true)
    }

    pub fn next(&mut self) -> Result<bool> {
        self.swipe_to(self.next_id.clone())
    }

    pub fn previous(&mut self) -> Result<bool> {
        self.swipe_to(self.previous_id.clone())
    }

    pub async fn switch_full_text_mode(&mut self) -> Result<FullTextOutcome> {
        let Some(current) = self.entry.as_ref() else {
            return Err(FlaxfeedError::EntryNotFound("no entry shown".into()));
        };
        if current.entry.mobilized_content.is_some() {
            self.prefer_full_text = !self.prefer_full_text;
            return Ok(FullTextOutcome::Toggled(self.prefer_full_text));
        }
        if !self.connectivity.is_online().await {
            return Ok(FullTextOutcome::Offline);
        }
        let id = current.entry.id.clone();
        self.store.add_mobilization_tasks(&[id])?;
        self.service.start(ServiceAction::MobilizeFeeds, Target::All);
        Ok(FullTextOutcome::Requested)
    }

    pub fn toggle_favorite(&mut self) -> Result<MutationTicket> {
        let Some(current) = self.entry.as_mut() else {
            return Err(FlaxfeedError::EntryNotFound("no entry shown".into()));
        };
        current.entry.favorite = !current.entry.favorite;
        let mutation = Mutation::SetFavorite {
            id: current.entry.id.clone(),
            favorite: current.entry.favorite,
        };
        if !current.entry.read {
            current.entry.read = true;
            drop(
                self.mutations
                    .dispatch(Mutation::MarkRead(vec![current.entry.id.clone()])),
            );
        }
        Ok(self.mutations.dispatch(mutation))
    }

    pub fn mark_unread(&mut self) -> Result<MutationTicket> {
        let Some(current) = self.entry.as_mut() else {
            return Err(FlaxfeedError::EntryNotFound("no entry shown".into()));
        };
        current.entry.read = false;
        Ok(self
            .mutations
            .dispatch(Mutation::MarkUnread(vec![current.entry.id.clone()])))
    }

    pub fn display_content(&self) -> &str {
        self.entry
            .as_ref()
            .map(|e| e.entry.display_content(self.prefer_full_text))
            .unwrap_or("")
    }

    /// Take the read and favorite flags from the store. The task-count query
    /// re-runs on every store change, including a failed mutation, so this
    /// is where optimistic flags get corrected.
    fn sync_flags(&mut self) -> Result<bool> {
        let Some(current) = self.entry.as_mut() else {
            return Ok(false);
        };
        let Some(stored) = self.store.get_entry(&current.entry.id)? else {
            return Ok(false);
        };
        let changed =
            stored.read != current.entry.read || stored.favorite != current.entry.favorite;
        current.entry.read = stored.read;
        current.entry.favorite = stored.favorite;
        Ok(changed)
    }

    pub fn handle_event(&mut self, event: LiveEvent) -> Result<bool> {
        if event.generation != self.generation {
            return Ok(false);
        }
        let LiveUpdate::TaskCount(count) = event.update else {
            return Ok(false);
        };
        let flags_changed = self.sync_flags()?;

        if count > 0 {
            if self.mobilizing {
                return Ok(flags_changed);
            }
            debug!("Entry has {} pending mobilization tasks", count);
            self.mobilizing = true;
            if !self.service.is_running() {
                self.service.start(ServiceAction::MobilizeFeeds, Target::All);
            }
            return Ok(true);
        }

        if !self.mobilizing {
            return Ok(flags_changed);
        }
        self.mobilizing = false;
        if let Some(id) = self.entry_id().map(String::from) {
            if let Some(reloaded) = self.store.get_entry_with_feed(&id)? {
                if reloaded.entry.mobilized_content.is_some() {
                    info!("Full text ready for {}", reloaded.entry.short_id());
                    self.prefer_full_text = true;
                }
                self.entry = Some(reloaded);
            }
        }
        Ok(true)
    }

    pub fn poll_events(&mut self) -> Result<bool> {
        let mut changed = false;
        while let Ok(event) = self.events_rx.try_recv() {
            changed |= self.handle_event(event)?;
        }
        Ok(changed)
    }

    pub async fn next_event(&mut self) -> Option<Result<bool>> {
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }
}
