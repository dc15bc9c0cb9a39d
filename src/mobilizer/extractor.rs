use serde_json::Value;

use crate::app::{FlaxfeedError, Result};
use crate::mobilizer::MobilizerConfig;

/// Builds the in-page script that pulls the article out of a loaded page,
/// and reads its result back.
pub struct ContentExtractor {
    remove_selectors: String,
    content_selectors: String,
    min_text_length: usize,
}

fn js_string_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ContentExtractor {
    pub fn new(config: &MobilizerConfig) -> Self {
        Self {
            remove_selectors: js_string_list(&config.remove_selectors),
            content_selectors: js_string_list(&config.content_selectors),
            min_text_length: config.min_text_length,
        }
    }

    /// Evaluates to `{ html, text, selector }`. Falls back to `<body>` when no
    /// content selector yields enough text.
    pub fn extraction_script(&self) -> String {
        format!(
            r#"
            (() => {{
                for (const selector of [{remove}]) {{
                    document.querySelectorAll(selector).forEach(el => el.remove());
                }}
                for (const selector of [{content}]) {{
                    const element = document.querySelector(selector);
                    if (element && element.innerText.trim().length > {min}) {{
                        return {{ html: element.innerHTML, text: element.innerText, selector }};
                    }}
                }}
                const body = document.body;
                if (body) {{
                    return {{ html: body.innerHTML, text: body.innerText, selector: 'body' }};
                }}
                return {{ html: '', text: '', selector: null }};
            }})()
            "#,
            remove = self.remove_selectors,
            content = self.content_selectors,
            min = self.min_text_length,
        )
    }

    /// HTML when present, else the escaped plain text wrapped in a paragraph.
    pub fn parse_result(&self, result: &Value) -> Result<String> {
        let html = result["html"].as_str().unwrap_or("").trim();
        if !html.is_empty() {
            return Ok(html.to_string());
        }
        let text = result["text"].as_str().unwrap_or("").trim();
        if !text.is_empty() {
            return Ok(format!("<p>{}</p>", html_escape::encode_text(text)));
        }
        Err(FlaxfeedError::Mobilizer("no content extracted".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(&MobilizerConfig::default())
    }

    #[test]
    fn test_script_lists_selectors() {
        let script = extractor().extraction_script();
        assert!(script.contains("'article'"));
        assert!(script.contains("'noscript'"));
        assert!(script.contains("> 100"));
    }

    #[test]
    fn test_selectors_are_escaped() {
        let config = MobilizerConfig {
            content_selectors: vec!["a[title='x']".into()],
            ..Default::default()
        };
        let script = ContentExtractor::new(&config).extraction_script();
        assert!(script.contains(r"'a[title=\'x\']'"));
    }

    #[test]
    fn test_parse_result_prefers_html() {
        let content = extractor()
            .parse_result(&json!({ "html": "<p>Hi</p>", "text": "Hi" }))
            .unwrap();
        assert_eq!(content, "<p>Hi</p>");
    }

    #[test]
    fn test_parse_result_wraps_text() {
        let content = extractor()
            .parse_result(&json!({ "html": "  ", "text": "a < b" }))
            .unwrap();
        assert_eq!(content, "<p>a &lt; b</p>");
    }

    #[test]
    fn test_parse_result_empty() {
        let result = extractor().parse_result(&json!({ "html": "", "text": "" }));
        assert!(matches!(result, Err(FlaxfeedError::Mobilizer(_))));
    }
}
