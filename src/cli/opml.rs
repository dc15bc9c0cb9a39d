//! Minimal OPML reader: feed outlines with the group they are nested in.

/// A feed found in an OPML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpmlFeed {
    pub title: String,
    pub url: String,
    /// Innermost enclosing outline without an `xmlUrl`.
    pub group: Option<String>,
}

/// Walk the `<outline>` tags in document order. Outlines that carry an
/// `xmlUrl` are feeds; other non-empty outlines open a group.
pub fn parse_opml(content: &str) -> Vec<OpmlFeed> {
    let mut feeds = Vec::new();
    // One slot per open outline; `None` for outlines that are not groups.
    let mut open: Vec<Option<String>> = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find('<') {
        rest = &rest[start..];
        let Some(end) = rest.find('>') else {
            break;
        };
        let tag = &rest[..=end];
        rest = &rest[end + 1..];

        if tag.starts_with("</outline") {
            open.pop();
            continue;
        }
        if !tag.starts_with("<outline") {
            continue;
        }

        let self_closing = tag.ends_with("/>");
        let title = extract_attr(tag, "title").or_else(|| extract_attr(tag, "text"));
        match extract_attr(tag, "xmlUrl") {
            Some(url) => {
                let group = open.iter().rev().find_map(|g| g.clone());
                feeds.push(OpmlFeed {
                    title: title.unwrap_or_else(|| url.clone()),
                    url,
                    group,
                });
                if !self_closing {
                    open.push(None);
                }
            }
            None if !self_closing => open.push(title),
            None => {}
        }
    }

    feeds
}

/// Value of `attr` in a tag, with entities decoded.
fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let pattern = format!("{}=\"", attr);
    let mut search = tag;
    loop {
        let pos = search.find(&pattern)?;
        let preceded_by_space = search[..pos]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let after = &search[pos + pattern.len()..];
        if preceded_by_space {
            let end = after.find('"')?;
            return Some(html_escape::decode_html_entities(&after[..end]).to_string());
        }
        search = after;
    }
}
