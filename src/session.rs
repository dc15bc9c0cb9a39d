//! UI state saved on quit and restored on the next start.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::Result;
use crate::containers::NavigationState;
use crate::view::{now_millis, FilterTab, ViewScope, ViewState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub navigation_state: String,
    pub scope: ViewScope,
    pub search: Option<String>,
    pub tab: FilterTab,
    pub selected_entry: Option<String>,
    pub display_date: DateTime<Utc>,
}

impl Session {
    pub fn capture(
        navigation: NavigationState,
        state: &ViewState,
        selected_entry: Option<&str>,
    ) -> Self {
        Self {
            navigation_state: navigation.name().to_string(),
            scope: state.scope.clone(),
            search: state.search.clone(),
            tab: state.tab,
            selected_entry: selected_entry.map(String::from),
            display_date: state.display_date,
        }
    }

    /// Saved session, or `None` when there is none or it cannot be read.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No session at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Ignoring unreadable session {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Navigation state to start in; unknown names fall back.
    pub fn navigation(&self, two_columns: bool) -> NavigationState {
        NavigationState::restore(&self.navigation_state, two_columns)
    }

    /// View state to start with. A display date in the future is clamped to now.
    pub fn view_state(&self, sort_desc: bool) -> ViewState {
        let display_date = self.display_date.min(now_millis());
        ViewState::new(self.scope.clone(), self.tab, sort_desc, display_date)
            .with_search(self.search.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn sample() -> Session {
        let state = ViewState::new(
            ViewScope::FeedGroup(3),
            FilterTab::Favorites,
            true,
            now_millis() - Duration::minutes(5),
        )
        .with_search(Some("rust".into()));
        Session::capture(NavigationState::TwoColumnsWithDetails, &state, Some("abc"))
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let session = sample();
        session.save(&path).unwrap();

        let loaded = Session::load(&path).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(
            loaded.navigation(true),
            NavigationState::TwoColumnsWithDetails
        );

        let state = loaded.view_state(false);
        assert_eq!(state.scope, ViewScope::FeedGroup(3));
        assert_eq!(state.search.as_deref(), Some("rust"));
        assert_eq!(state.display_date, session.display_date);
        assert!(!state.sort_desc);
    }

    #[test]
    fn test_missing_or_corrupt_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        assert!(Session::load(&path).is_none());

        fs::write(&path, "{ not json").unwrap();
        assert!(Session::load(&path).is_none());
    }

    #[test]
    fn test_unknown_navigation_state_falls_back() {
        let mut session = sample();
        session.navigation_state = "FLOATING".into();
        assert_eq!(session.navigation(false), NavigationState::SingleColumnMaster);
        assert_eq!(session.navigation(true), NavigationState::TwoColumnsEmpty);
    }
}
