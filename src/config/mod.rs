//! Configuration management for flaxfeed.
//!
//! Configuration is read from `~/.config/flaxfeed/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

pub mod colors;
pub mod keybindings;

pub use colors::ColorConfig;
pub use keybindings::KeybindingConfig;

use crate::entries::PAGE_SIZE;
use crate::mobilizer::MobilizerConfig;
use crate::service::NetworkConfig;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub colors: ColorConfig,
    pub keybindings: KeybindingConfig,
    pub layout: LayoutConfig,
    pub list: ListConfig,
    pub mobilizer: MobilizerConfig,
    pub network: NetworkConfig,
}

/// `[layout]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Terminal width from which master and details sit side by side.
    pub two_column_threshold: u16,
    /// Master panel width in two-column mode.
    pub master_width: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            two_column_threshold: 120,
            master_width: 60,
        }
    }
}

impl LayoutConfig {
    pub fn two_columns(&self, terminal_width: u16) -> bool {
        terminal_width >= self.two_column_threshold
    }
}

/// `[list]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    pub page_size: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/flaxfeed/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("flaxfeed").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn default_config_content() -> &'static str {
        r##"# flaxfeed configuration
#
# Colors can be specified as:
# - Named colors: Black, Red, Green, Yellow, Blue, Magenta, Cyan, Gray,
#   DarkGray, LightRed, LightGreen, LightYellow, LightBlue, LightMagenta,
#   LightCyan, White, Reset
# - Hex colors: "#RRGGBB" or "#RGB"
#
# Keybindings can be specified as:
# - Single characters: "a", "A", "1", "/"
# - Special keys: Enter, Tab, BackTab, Backspace, Delete, Home, End,
#   PageUp, PageDown, Up, Down, Left, Right, Esc, Space, F1-F12
# - With modifiers: "Ctrl+c", "Shift+Tab", "Alt+Enter"

[colors]
active_border = "Cyan"
inactive_border = "DarkGray"
selection_bg_active = "Cyan"
selection_fg_active = "Black"
selection_bg_inactive = "DarkGray"
selection_fg_inactive = "White"
read_entry = "DarkGray"
unread_entry = "White"
favorite = "Yellow"
badge = "LightGreen"
tab_active = "Cyan"
metadata = "Yellow"
metadata_link = "Blue"
status_fg = "White"
status_bg = "DarkGray"

[keybindings]
quit = ["q", "Ctrl+c"]
move_up = ["k", "Up"]
move_down = ["j", "Down"]
next_pane = ["Tab"]
prev_pane = ["BackTab", "Shift+Tab"]
select = ["Enter"]
back = ["Esc"]
toggle_group = ["Space"]
tab_unread = ["1"]
tab_favorites = ["2"]
tab_all = ["3"]
search = ["/"]
toggle_read = ["r"]
toggle_favorite = ["s"]
mark_all_read = ["A"]
undo = ["u"]
refresh = ["R"]
full_text = ["f"]
open_in_browser = ["o"]
previous_entry = ["h", "Left"]
next_entry = ["l", "Right"]
toggle_sort = ["S"]
delete_feed = ["d", "Delete"]

[layout]
# Terminal columns needed to show the list and the article side by side
two_column_threshold = 120
master_width = 60

[list]
# Entries loaded per page
page_size = 30

[mobilizer]
# Full-text extraction with headless Chrome
headless = true
timeout_secs = 30
wait_after_load_ms = 1000
max_concurrency = 3
batch_size = 10
min_text_length = 100

[network]
# Reachable host:port that means we are online
probe_address = "1.1.1.1:443"
probe_timeout_ms = 1500
request_timeout_secs = 10
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::style::Color;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_deserializes() {
        let config: Config = toml::from_str(Config::default_config_content())
            .expect("Default config should be valid TOML");

        assert_eq!(config.colors.active_border, Color::Cyan);
        assert_eq!(config.keybindings.quit, vec!["q", "Ctrl+c"]);
        assert_eq!(config.layout.two_column_threshold, 120);
        assert_eq!(config.list.page_size, PAGE_SIZE);
        assert_eq!(config.network.probe_address, "1.1.1.1:443");
        assert!(config.mobilizer.headless);
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[colors]
active_border = "#FF0000"

[layout]
master_width = 50
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.colors.active_border, Color::Rgb(255, 0, 0));
        assert_eq!(config.colors.inactive_border, Color::DarkGray);
        assert_eq!(config.layout.master_width, 50);
        assert_eq!(config.layout.two_column_threshold, 120);
    }

    #[test]
    fn test_two_columns_threshold() {
        let layout = LayoutConfig::default();
        assert!(!layout.two_columns(119));
        assert!(layout.two_columns(120));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flaxfeed").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.list.page_size, PAGE_SIZE);

        // Second load parses the written file.
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.keybindings.search, vec!["/"]);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[layout]\nmaster_width = \"wide\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
