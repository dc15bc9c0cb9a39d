use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use std::time::Duration;

use crate::app::Result;

pub enum AppEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    Tick,
}

/// Polls the terminal for at most one tick. The caller drains store
/// updates between polls, so the tick stays short.
pub struct EventHandler {
    tick_rate: Duration,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        Self { tick_rate }
    }

    pub fn next(&self) -> Result<AppEvent> {
        if event::poll(self.tick_rate)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => return Ok(AppEvent::Key(key)),
                Event::Resize(width, height) => return Ok(AppEvent::Resize(width, height)),
                _ => {}
            }
        }
        Ok(AppEvent::Tick)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    MoveUp,
    MoveDown,
    NextPane,
    PrevPane,
    Select,
    Back,
    ToggleGroup,
    TabUnread,
    TabFavorites,
    TabAll,
    Search,
    ToggleRead,
    ToggleFavorite,
    MarkAllRead,
    Undo,
    Refresh,
    FullText,
    OpenInBrowser,
    PreviousEntry,
    NextEntry,
    ToggleSort,
    DeleteFeed,
    None,
}
