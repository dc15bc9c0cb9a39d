//! Color configuration for the TUI.

use ratatui::style::Color;
use serde::{de, Deserialize, Deserializer};

/// Colors of the TUI, from the `[colors]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    #[serde(deserialize_with = "color")]
    pub active_border: Color,
    #[serde(deserialize_with = "color")]
    pub inactive_border: Color,
    #[serde(deserialize_with = "color")]
    pub selection_bg_active: Color,
    #[serde(deserialize_with = "color")]
    pub selection_fg_active: Color,
    #[serde(deserialize_with = "color")]
    pub selection_bg_inactive: Color,
    #[serde(deserialize_with = "color")]
    pub selection_fg_inactive: Color,
    /// Title color of read entries.
    #[serde(deserialize_with = "color")]
    pub read_entry: Color,
    #[serde(deserialize_with = "color")]
    pub unread_entry: Color,
    #[serde(deserialize_with = "color")]
    pub favorite: Color,
    /// New-entry counter next to the tab bar.
    #[serde(deserialize_with = "color")]
    pub badge: Color,
    /// Label of the selected tab.
    #[serde(deserialize_with = "color")]
    pub tab_active: Color,
    #[serde(deserialize_with = "color")]
    pub metadata: Color,
    #[serde(deserialize_with = "color")]
    pub metadata_link: Color,
    #[serde(deserialize_with = "color")]
    pub status_fg: Color,
    #[serde(deserialize_with = "color")]
    pub status_bg: Color,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            active_border: Color::Cyan,
            inactive_border: Color::DarkGray,
            selection_bg_active: Color::Cyan,
            selection_fg_active: Color::Black,
            selection_bg_inactive: Color::DarkGray,
            selection_fg_inactive: Color::White,
            read_entry: Color::DarkGray,
            unread_entry: Color::White,
            favorite: Color::Yellow,
            badge: Color::LightGreen,
            tab_active: Color::Cyan,
            metadata: Color::Yellow,
            metadata_link: Color::Blue,
            status_fg: Color::White,
            status_bg: Color::DarkGray,
        }
    }
}

fn color<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse_color(&s).map_err(de::Error::custom)
}

const NAMED: [(&str, Color); 17] = [
    ("black", Color::Black),
    ("red", Color::Red),
    ("green", Color::Green),
    ("yellow", Color::Yellow),
    ("blue", Color::Blue),
    ("magenta", Color::Magenta),
    ("cyan", Color::Cyan),
    ("gray", Color::Gray),
    ("darkgray", Color::DarkGray),
    ("lightred", Color::LightRed),
    ("lightgreen", Color::LightGreen),
    ("lightyellow", Color::LightYellow),
    ("lightblue", Color::LightBlue),
    ("lightmagenta", Color::LightMagenta),
    ("lightcyan", Color::LightCyan),
    ("white", Color::White),
    ("reset", Color::Reset),
];

/// A color name (case-insensitive, "grey" spelling accepted), a hex code
/// ("#RRGGBB" or "#RGB") or a 256-color palette index.
pub fn parse_color(s: &str) -> Result<Color, String> {
    let s = s.trim();
    if s.starts_with('#') {
        return parse_hex_color(s);
    }
    if let Ok(index) = s.parse::<u8>() {
        return Ok(Color::Indexed(index));
    }

    let name = s.to_ascii_lowercase().replace("grey", "gray");
    NAMED
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, color)| *color)
        .ok_or_else(|| format!("Unknown color: {}", s))
}

/// "#RRGGBB" or "#RGB".
fn parse_hex_color(s: &str) -> Result<Color, String> {
    let hex = s.trim_start_matches('#');
    let channel = |digits: &str| {
        u8::from_str_radix(digits, 16).map_err(|_| format!("Invalid hex color: {}", s))
    };

    if !hex.is_ascii() {
        return Err(format!("Invalid hex color: {}", s));
    }

    match hex.len() {
        6 => Ok(Color::Rgb(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        // Each digit doubles: #F80 is #FF8800.
        3 => Ok(Color::Rgb(
            channel(&hex[0..1])? * 17,
            channel(&hex[1..2])? * 17,
            channel(&hex[2..3])? * 17,
        )),
        _ => Err(format!("Invalid hex color format: {}", s)),
    }
}

/// `color` scaled toward black by `alpha`. Only RGB colors can be scaled;
/// named colors come back unchanged and are dimmed with a style modifier.
pub fn dim(color: Color, alpha: f32) -> Color {
    let alpha = alpha.clamp(0.0, 1.0);
    match color {
        Color::Rgb(r, g, b) if alpha < 1.0 => {
            let scale = |c: u8| (f32::from(c) * alpha).round() as u8;
            Color::Rgb(scale(r), scale(g), scale(b))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_colors_ignore_case() {
        for input in ["Cyan", "cyan", "CYAN"] {
            assert_eq!(parse_color(input).unwrap(), Color::Cyan);
        }
        assert_eq!(parse_color("DarkGrey").unwrap(), Color::DarkGray);
    }

    #[test]
    fn test_hex_and_indexed_colors() {
        assert_eq!(parse_color("#00ff00").unwrap(), Color::Rgb(0, 255, 0));
        assert_eq!(parse_color("#F80").unwrap(), Color::Rgb(255, 136, 0));
        assert_eq!(parse_color("208").unwrap(), Color::Indexed(208));
    }

    #[test]
    fn test_invalid_colors() {
        for input in ["invalid", "#GGGGGG", "#12345", "#ÄÄÄ", "256"] {
            assert!(parse_color(input).is_err(), "{} should not parse", input);
        }
    }

    #[test]
    fn test_config_section() {
        let colors: ColorConfig =
            toml::from_str("badge = \"#FF0000\"\nfavorite = \"lightyellow\"").unwrap();
        assert_eq!(colors.badge, Color::Rgb(255, 0, 0));
        assert_eq!(colors.favorite, Color::LightYellow);
        assert_eq!(colors.status_bg, ColorConfig::default().status_bg);
    }

    #[test]
    fn test_dim_scales_rgb_only() {
        assert_eq!(dim(Color::Rgb(200, 100, 0), 0.5), Color::Rgb(100, 50, 0));
        assert_eq!(dim(Color::Rgb(200, 100, 0), 1.0), Color::Rgb(200, 100, 0));
        assert_eq!(dim(Color::Cyan, 0.2), Color::Cyan);
    }
}
