//! Runtime preferences.
//!
//! Small key-value store for settings the application flips while running,
//! persisted as TOML next to the database. Every write is broadcast so open
//! views can react.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::app::{FlaxfeedError, Result};

/// Sort entries newest first.
pub const SORT_ORDER: &str = "sort_order";
pub const ENABLE_SWIPE_ENTRY: &str = "enable_swipe_entry";
/// Set by the background service while a refresh runs. Never persisted.
pub const IS_REFRESHING: &str = "is_refreshing";
pub const HIDE_BUTTON_MARK_ALL_AS_READ: &str = "hide_button_mark_all_as_read";
/// Refresh all feeds periodically while the TUI runs.
pub const REFRESH_ENABLED: &str = "refresh_enabled";
/// Period of the automatic refresh, like "30m", "1h" or "1d".
pub const REFRESH_INTERVAL: &str = "refresh_interval";
pub const DEFAULT_REFRESH_INTERVAL: &str = "1h";

const TRANSIENT_KEYS: [&str; 1] = [IS_REFRESHING];

fn default_bool(key: &str) -> bool {
    match key {
        SORT_ORDER | ENABLE_SWIPE_ENTRY | REFRESH_ENABLED => true,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

pub struct Preferences {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, PrefValue>>,
    changes: broadcast::Sender<String>,
}

impl Preferences {
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(32);
        Self {
            path: None,
            values: RwLock::new(BTreeMap::new()),
            changes,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str::<BTreeMap<String, PrefValue>>(&content)
                .map_err(|e| FlaxfeedError::Preferences(format!("{}: {}", path.display(), e)))?
        } else {
            BTreeMap::new()
        };

        let (changes, _) = broadcast::channel(32);
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
            changes,
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, PrefValue>>> {
        self.values
            .read()
            .map_err(|e| FlaxfeedError::Preferences(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, PrefValue>>> {
        self.values
            .write()
            .map_err(|e| FlaxfeedError::Preferences(e.to_string()))
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.read().ok().and_then(|values| values.get(key).cloned()) {
            Some(PrefValue::Bool(value)) => value,
            _ => default_bool(key),
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.read().ok().and_then(|values| values.get(key).cloned()) {
            Some(PrefValue::Int(value)) => value,
            _ => default,
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.read().ok().and_then(|values| values.get(key).cloned()) {
            Some(PrefValue::Str(value)) => value,
            _ => default.to_string(),
        }
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, PrefValue::Bool(value))
    }

    pub fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.set(key, PrefValue::Int(value))
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, PrefValue::Str(value.to_string()))
    }

    fn set(&self, key: &str, value: PrefValue) -> Result<()> {
        {
            let mut values = self.write()?;
            let unchanged = match (values.get(key), &value) {
                (Some(current), _) => *current == value,
                (None, PrefValue::Bool(flag)) => *flag == default_bool(key),
                (None, _) => false,
            };
            if unchanged {
                return Ok(());
            }
            values.insert(key.to_string(), value);
        }
        if !TRANSIENT_KEYS.contains(&key) {
            self.persist()?;
        }
        debug!("Preference {} changed", key);
        // No receivers is fine.
        let _ = self.changes.send(key.to_string());
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let values: BTreeMap<String, PrefValue> = self
            .read()?
            .iter()
            .filter(|(key, _)| !TRANSIENT_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let content = toml::to_string(&values)
            .map_err(|e| FlaxfeedError::Preferences(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::write(path, content) {
            warn!("Failed to save preferences to {}: {}", path.display(), e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Period of the automatic refresh, or `None` when it is switched off.
    /// An unparsable interval also switches it off.
    pub fn refresh_interval(&self) -> Option<Duration> {
        if !self.get_bool(REFRESH_ENABLED) {
            return None;
        }
        let raw = self.get_string(REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL);
        match parse_interval(&raw) {
            Ok(interval) => Some(interval),
            Err(e) => {
                warn!("Ignoring {}: {}", REFRESH_INTERVAL, e);
                None
            }
        }
    }

    /// Receives the key of every changed preference.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

/// Parse an interval like "1h", "30m", "1d", "90s" or plain seconds.
pub fn parse_interval(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let invalid = || FlaxfeedError::Preferences(format!("Invalid interval: {}", s));

    let (number, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c),
        _ => (s.as_str(), 's'),
    };
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => return Err(invalid()),
    };
    let secs = number
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid())?
        .checked_mul(multiplier)
        .ok_or_else(invalid)?;
    if secs == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(secs))
}
