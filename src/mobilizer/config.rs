use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[mobilizer]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MobilizerConfig {
    /// Run Chrome without a window.
    pub headless: bool,

    /// Page load timeout in seconds.
    pub timeout_secs: u64,

    /// Settle time after load for script-rendered pages, in milliseconds.
    pub wait_after_load_ms: u64,

    /// Article containers to try, in priority order.
    pub content_selectors: Vec<String>,

    /// Elements stripped before extraction.
    pub remove_selectors: Vec<String>,

    /// Shortest text accepted from a content selector.
    pub min_text_length: usize,

    /// Pages open at once.
    pub max_concurrency: usize,

    /// Pending tasks taken per round.
    pub batch_size: usize,

    pub user_agent: Option<String>,
}

impl Default for MobilizerConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            headless: true,
            timeout_secs: 30,
            wait_after_load_ms: 1000,
            content_selectors: strings(&[
                "article",
                "[role=\"main\"]",
                "main",
                ".post-content",
                ".article-content",
                ".entry-content",
                ".content",
                "#content",
            ]),
            remove_selectors: strings(&[
                "nav",
                "header",
                "footer",
                "aside",
                ".sidebar",
                ".advertisement",
                ".social-share",
                ".comments",
                "script",
                "style",
                "noscript",
            ]),
            min_text_length: 100,
            max_concurrency: 3,
            batch_size: 10,
            user_agent: None,
        }
    }
}

impl MobilizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wait_after_load(&self) -> Duration {
        Duration::from_millis(self.wait_after_load_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: MobilizerConfig = toml::from_str("headless = false\nmax_concurrency = 1").unwrap();
        assert!(!config.headless);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.wait_after_load(), Duration::from_millis(1000));
        assert_eq!(config.content_selectors[0], "article");
    }
}
