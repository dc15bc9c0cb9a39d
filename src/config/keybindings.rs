//! Keybinding configuration for the TUI.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::Deserialize;

use crate::tui::event::Action;

/// Keys per action, from the `[keybindings]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeybindingConfig {
    pub quit: Vec<String>,
    pub move_up: Vec<String>,
    pub move_down: Vec<String>,
    pub next_pane: Vec<String>,
    pub prev_pane: Vec<String>,
    pub select: Vec<String>,
    pub back: Vec<String>,
    pub toggle_group: Vec<String>,
    pub tab_unread: Vec<String>,
    pub tab_favorites: Vec<String>,
    pub tab_all: Vec<String>,
    pub search: Vec<String>,
    pub toggle_read: Vec<String>,
    pub toggle_favorite: Vec<String>,
    pub mark_all_read: Vec<String>,
    pub undo: Vec<String>,
    pub refresh: Vec<String>,
    pub full_text: Vec<String>,
    pub open_in_browser: Vec<String>,
    pub previous_entry: Vec<String>,
    pub next_entry: Vec<String>,
    pub toggle_sort: Vec<String>,
    pub delete_feed: Vec<String>,
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self {
            quit: keys(&["q", "Ctrl+c"]),
            move_up: keys(&["k", "Up"]),
            move_down: keys(&["j", "Down"]),
            next_pane: keys(&["Tab"]),
            prev_pane: keys(&["BackTab", "Shift+Tab"]),
            select: keys(&["Enter"]),
            back: keys(&["Esc"]),
            toggle_group: keys(&["Space"]),
            tab_unread: keys(&["1"]),
            tab_favorites: keys(&["2"]),
            tab_all: keys(&["3"]),
            search: keys(&["/"]),
            toggle_read: keys(&["r"]),
            toggle_favorite: keys(&["s"]),
            mark_all_read: keys(&["A"]),
            undo: keys(&["u"]),
            refresh: keys(&["R"]),
            full_text: keys(&["f"]),
            open_in_browser: keys(&["o"]),
            previous_entry: keys(&["h", "Left"]),
            next_entry: keys(&["l", "Right"]),
            toggle_sort: keys(&["S"]),
            delete_feed: keys(&["d", "Delete"]),
        }
    }
}

impl KeybindingConfig {
    fn table(&self) -> [(&[String], Action); 23] {
        [
            (&self.quit[..], Action::Quit),
            (&self.move_up[..], Action::MoveUp),
            (&self.move_down[..], Action::MoveDown),
            (&self.next_pane[..], Action::NextPane),
            (&self.prev_pane[..], Action::PrevPane),
            (&self.select[..], Action::Select),
            (&self.back[..], Action::Back),
            (&self.toggle_group[..], Action::ToggleGroup),
            (&self.tab_unread[..], Action::TabUnread),
            (&self.tab_favorites[..], Action::TabFavorites),
            (&self.tab_all[..], Action::TabAll),
            (&self.search[..], Action::Search),
            (&self.toggle_read[..], Action::ToggleRead),
            (&self.toggle_favorite[..], Action::ToggleFavorite),
            (&self.mark_all_read[..], Action::MarkAllRead),
            (&self.undo[..], Action::Undo),
            (&self.refresh[..], Action::Refresh),
            (&self.full_text[..], Action::FullText),
            (&self.open_in_browser[..], Action::OpenInBrowser),
            (&self.previous_entry[..], Action::PreviousEntry),
            (&self.next_entry[..], Action::NextEntry),
            (&self.toggle_sort[..], Action::ToggleSort),
            (&self.delete_feed[..], Action::DeleteFeed),
        ]
    }

    /// Get the action for a key event. Earlier entries win on conflicts.
    pub fn get_action(&self, key: &KeyEvent) -> Action {
        self.table()
            .into_iter()
            .find(|(bindings, _)| matches_key(key, bindings))
            .map(|(_, action)| action)
            .unwrap_or(Action::None)
    }

    /// First configured key for `action`, for help lines.
    pub fn hint(&self, action: Action) -> Option<&str> {
        self.table()
            .into_iter()
            .find(|(_, candidate)| *candidate == action)
            .and_then(|(bindings, _)| bindings.first())
            .map(String::as_str)
    }
}

fn matches_key(key: &KeyEvent, bindings: &[String]) -> bool {
    bindings
        .iter()
        .filter_map(|binding| parse_key_string(binding).ok())
        .any(|parsed| parsed.matches(key))
}

/// A parsed key binding with code and modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    /// Check if this binding matches a key event.
    pub fn matches(&self, key: &KeyEvent) -> bool {
        self.code == key.code
            && (self.modifiers == key.modifiers
                || self.modifiers == (key.modifiers & !KeyModifiers::SHIFT))
    }
}

/// Parse a key string into a KeyBinding.
///
/// Supported formats:
/// - Single characters: "a", "A", "1", "/"
/// - Special keys: "Enter", "Tab", "BackTab", "Backspace", "Delete", "Home", "End",
///   "PageUp", "PageDown", "Up", "Down", "Left", "Right", "Esc", "Space", "F1"-"F12"
/// - With modifiers: "Ctrl+c", "Shift+Tab", "Alt+Enter", "Ctrl+Shift+a"
pub fn parse_key_string(s: &str) -> Result<KeyBinding, String> {
    let s = s.trim();
    let parts: Vec<&str> = s.split('+').collect();

    let mut modifiers = KeyModifiers::NONE;
    let key_part = if parts.len() > 1 {
        // Parse modifiers
        for part in &parts[..parts.len() - 1] {
            match part.to_lowercase().as_str() {
                "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
                "shift" => modifiers |= KeyModifiers::SHIFT,
                "alt" => modifiers |= KeyModifiers::ALT,
                _ => return Err(format!("Unknown modifier: {}", part)),
            }
        }
        parts[parts.len() - 1]
    } else {
        s
    };

    let code = parse_key_code(key_part)?;

    Ok(KeyBinding { code, modifiers })
}

fn parse_key_code(s: &str) -> Result<KeyCode, String> {
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(KeyCode::Char(c));
    }

    match s.to_lowercase().as_str() {
        "enter" | "return" => Ok(KeyCode::Enter),
        "tab" => Ok(KeyCode::Tab),
        "backtab" => Ok(KeyCode::BackTab),
        "backspace" | "bs" => Ok(KeyCode::Backspace),
        "delete" | "del" => Ok(KeyCode::Delete),
        "home" => Ok(KeyCode::Home),
        "end" => Ok(KeyCode::End),
        "pageup" | "pgup" => Ok(KeyCode::PageUp),
        "pagedown" | "pgdn" => Ok(KeyCode::PageDown),
        "up" => Ok(KeyCode::Up),
        "down" => Ok(KeyCode::Down),
        "left" => Ok(KeyCode::Left),
        "right" => Ok(KeyCode::Right),
        "esc" | "escape" => Ok(KeyCode::Esc),
        "space" => Ok(KeyCode::Char(' ')),
        name => match name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            Some(n @ 1..=12) => Ok(KeyCode::F(n)),
            _ => Err(format!("Unknown key: {}", s)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        let cases = [
            ("j", KeyCode::Char('j'), KeyModifiers::NONE),
            ("R", KeyCode::Char('R'), KeyModifiers::NONE),
            ("Space", KeyCode::Char(' '), KeyModifiers::NONE),
            ("Enter", KeyCode::Enter, KeyModifiers::NONE),
            ("BackTab", KeyCode::BackTab, KeyModifiers::NONE),
            ("pgdn", KeyCode::PageDown, KeyModifiers::NONE),
            ("F12", KeyCode::F(12), KeyModifiers::NONE),
            ("Ctrl+c", KeyCode::Char('c'), KeyModifiers::CONTROL),
            ("Shift+Tab", KeyCode::Tab, KeyModifiers::SHIFT),
            (
                "Ctrl+Shift+a",
                KeyCode::Char('a'),
                KeyModifiers::CONTROL | KeyModifiers::SHIFT,
            ),
        ];
        for (input, code, modifiers) in cases {
            assert_eq!(
                parse_key_string(input).unwrap(),
                KeyBinding { code, modifiers },
                "{}",
                input
            );
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(parse_key_string("F13").is_err());
        assert!(parse_key_string("Hyper+a").is_err());
        assert!(parse_key_string("Launch").is_err());
    }

    #[test]
    fn test_keybinding_matches() {
        let binding = parse_key_string("Ctrl+c").unwrap();
        let key_event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(binding.matches(&key_event));

        let key_event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert!(!binding.matches(&key_event));
    }

    #[test]
    fn test_keybinding_config_get_action() {
        let config = KeybindingConfig::default();
        let action = |code, modifiers| config.get_action(&KeyEvent::new(code, modifiers));

        assert_eq!(action(KeyCode::Char('q'), KeyModifiers::NONE), Action::Quit);
        assert_eq!(action(KeyCode::Char('c'), KeyModifiers::CONTROL), Action::Quit);
        assert_eq!(action(KeyCode::Char('j'), KeyModifiers::NONE), Action::MoveDown);
        assert_eq!(action(KeyCode::Enter, KeyModifiers::NONE), Action::Select);
        assert_eq!(action(KeyCode::Char('/'), KeyModifiers::NONE), Action::Search);
        assert_eq!(action(KeyCode::Char('2'), KeyModifiers::NONE), Action::TabFavorites);
        assert_eq!(action(KeyCode::Char('A'), KeyModifiers::SHIFT), Action::MarkAllRead);
        assert_eq!(action(KeyCode::Char(' '), KeyModifiers::NONE), Action::ToggleGroup);
        assert_eq!(action(KeyCode::Left, KeyModifiers::NONE), Action::PreviousEntry);
        assert_eq!(action(KeyCode::Delete, KeyModifiers::NONE), Action::DeleteFeed);
        assert_eq!(action(KeyCode::Char('z'), KeyModifiers::NONE), Action::None);
    }

    #[test]
    fn test_custom_bindings_and_hint() {
        let config: KeybindingConfig = toml::from_str(r#"full_text = ["F2"]"#).unwrap();
        assert_eq!(
            config.get_action(&KeyEvent::new(KeyCode::F(2), KeyModifiers::NONE)),
            Action::FullText
        );
        assert_eq!(config.hint(Action::FullText), Some("F2"));
        assert_eq!(config.hint(Action::Undo), Some("u"));
        assert_eq!(config.hint(Action::None), None);
    }

    #[test]
    fn test_parse_non_ascii_char() {
        assert_eq!(parse_key_string("é").unwrap().code, KeyCode::Char('é'));
        assert!(parse_key_string("Hyper+x").is_err());
    }
}
