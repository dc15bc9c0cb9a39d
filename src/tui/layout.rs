use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::config::colors::dim;
use crate::config::{ColorConfig, Config};
use crate::containers::ContainersLayout;
use crate::domain::TreeRow;
use crate::store::Store;
use crate::tui::app::{ActivePane, TuiApp};
use crate::tui::event::Action;
use crate::view::{FilterTab, ViewScope};

const FEEDS_PANE_HEIGHT: u16 = 10;

pub fn render<S: Store + Send + Sync + 'static>(
    frame: &mut Frame,
    app: &mut TuiApp<S>,
    config: &Config,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Panels
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    let (master_area, details_area) = panel_areas(&app.layout, chunks[0]);
    if let Some(area) = master_area {
        render_master(frame, app, area, &config.colors);
    }
    if let Some(area) = details_area {
        frame.render_widget(Clear, area);
        render_details(frame, app, area, &config.colors);
    }
    render_status_bar(frame, app, chunks[1], config);
}

/// Where the master and details panels go inside `area`. A sliding details
/// panel is pushed down by its translation.
pub fn panel_areas(layout: &ContainersLayout, area: Rect) -> (Option<Rect>, Option<Rect>) {
    let master = layout.master().visible.then(|| {
        let width = layout.master_width().map_or(area.width, |w| w.min(area.width));
        Rect { width, ..area }
    });

    let details = layout.details();
    let details = details.visible.then(|| {
        let margin = layout.details_margin().min(area.width);
        let offset = (f32::from(area.height) * details.translation.clamp(0.0, 1.0)).round() as u16;
        Rect {
            x: area.x + margin,
            y: area.y + offset,
            width: area.width - margin,
            height: area.height - offset.min(area.height),
        }
    });

    (master, details)
}

fn highlight_style(is_active: bool, colors: &ColorConfig) -> Style {
    if is_active {
        Style::default()
            .bg(colors.selection_bg_active)
            .fg(colors.selection_fg_active)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .bg(colors.selection_bg_inactive)
            .fg(colors.selection_fg_inactive)
    }
}

fn border_style(is_active: bool, colors: &ColorConfig) -> Style {
    if is_active {
        Style::default().fg(colors.active_border)
    } else {
        Style::default().fg(colors.inactive_border)
    }
}

fn render_master<S: Store + Send + Sync + 'static>(
    frame: &mut Frame,
    app: &mut TuiApp<S>,
    area: Rect,
    colors: &ColorConfig,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(FEEDS_PANE_HEIGHT), // Feed tree
            Constraint::Length(1),                 // Tabs, badge, search
            Constraint::Min(3),                    // Entries
        ])
        .split(area);

    render_feeds_pane(frame, app, chunks[0], colors);
    render_tab_bar(frame, app, chunks[1], colors);
    render_entries_pane(frame, app, chunks[2], colors);
}

fn render_feeds_pane<S: Store + Send + Sync + 'static>(
    frame: &mut Frame,
    app: &mut TuiApp<S>,
    area: Rect,
    colors: &ColorConfig,
) {
    let is_active = app.active_pane == ActivePane::Feeds;

    let items: Vec<ListItem> = app
        .tree
        .rows()
        .iter()
        .map(|row| {
            let label = match row {
                TreeRow::AllEntries { .. } => "All entries".to_string(),
                TreeRow::Group {
                    title, expanded, ..
                } => format!("{} {}", if *expanded { "▾" } else { "▸" }, title),
                TreeRow::Feed { title, nested, .. } => {
                    format!("{}{}", if *nested { "    " } else { "" }, title)
                }
            };
            let content = match row.unread() {
                0 => label,
                unread => format!("{} ({})", label, unread),
            };
            ListItem::new(content)
        })
        .collect();

    let block = Block::default()
        .title(" Feeds ")
        .borders(Borders::ALL)
        .border_style(border_style(is_active, colors));

    let list = List::new(items)
        .block(block)
        .highlight_style(highlight_style(is_active, colors))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.tree_state);
}

fn render_tab_bar<S: Store + Send + Sync + 'static>(
    frame: &mut Frame,
    app: &TuiApp<S>,
    area: Rect,
    colors: &ColorConfig,
) {
    let mut spans = Vec::new();

    if let Some(text) = app.list.search_text() {
        let cursor = if app.search_input { "_" } else { "" };
        spans.push(Span::styled(
            format!(" /{}{}", text, cursor),
            Style::default().fg(colors.tab_active),
        ));
    } else {
        let current = app.list.state().tab;
        for tab in FilterTab::ALL {
            let style = if tab == current {
                Style::default()
                    .fg(colors.tab_active)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                Style::default().fg(colors.inactive_border)
            };
            spans.push(Span::raw(" "));
            spans.push(Span::styled(tab.label(), style));
        }
    }

    if let Some(count) = app.list.badge() {
        spans.push(Span::styled(
            format!("  +{} new", count),
            Style::default().fg(colors.badge).add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_entries_pane<S: Store + Send + Sync + 'static>(
    frame: &mut Frame,
    app: &mut TuiApp<S>,
    area: Rect,
    colors: &ColorConfig,
) {
    let is_active = app.active_pane == ActivePane::Entries;
    let show_feed = !matches!(app.list.state().scope, ViewScope::SingleFeed(_));

    let items: Vec<ListItem> = app
        .list
        .entries()
        .iter()
        .map(|item| {
            let entry = &item.entry;
            let marker = if entry.favorite {
                Span::styled("★", Style::default().fg(colors.favorite))
            } else if !entry.read {
                Span::raw("●")
            } else {
                Span::raw(" ")
            };

            let date = entry
                .published_at
                .map(|d| d.format("%m/%d").to_string())
                .unwrap_or_else(|| "     ".to_string());

            let style = if entry.read {
                Style::default().fg(colors.read_entry)
            } else {
                Style::default()
                    .fg(colors.unread_entry)
                    .add_modifier(Modifier::BOLD)
            };

            let mut spans = vec![
                marker,
                Span::raw(format!(" {} ", date)),
                Span::styled(entry.display_title().to_string(), style),
            ];
            if show_feed {
                spans.push(Span::styled(
                    format!("  {}", item.feed_title),
                    Style::default().fg(colors.metadata),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let total = app.list.entry_ids().len();
    let more = if app.list.has_more() { "+" } else { "" };
    let title = format!(
        " {} ({}/{}{}) ",
        app.tree.scope_title(&app.list.state().scope),
        app.list.entries().len(),
        total,
        more
    );

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style(is_active, colors));

    let list = List::new(items)
        .block(block)
        .highlight_style(highlight_style(is_active, colors))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.entry_list_state);
}

fn render_details<S: Store + Send + Sync + 'static>(
    frame: &mut Frame,
    app: &TuiApp<S>,
    area: Rect,
    colors: &ColorConfig,
) {
    let alpha = app.layout.details().alpha;
    let fade = |color: Color| dim(color, alpha);
    let is_active = app.active_pane == ActivePane::Details;

    let (title, content) = match app.details.entry() {
        Some(item) => {
            let entry = &item.entry;
            let mut lines = vec![
                Line::from(Span::styled(
                    entry.display_title().to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    item.feed_title.clone(),
                    Style::default().fg(fade(colors.metadata)),
                )),
            ];

            if let Some(author) = &entry.author {
                lines.push(Line::from(Span::styled(
                    format!("By: {}", author),
                    Style::default().fg(fade(colors.metadata)),
                )));
            }
            if let Some(date) = entry.published_at {
                lines.push(Line::from(Span::styled(
                    format!("Date: {}", date.format("%Y-%m-%d %H:%M")),
                    Style::default().fg(fade(colors.metadata)),
                )));
            }
            if let Some(link) = &entry.link {
                lines.push(Line::from(Span::styled(
                    format!("Link: {}", link),
                    Style::default().fg(fade(colors.metadata_link)),
                )));
            }
            if app.details.is_mobilizing() {
                lines.push(Line::from(Span::styled(
                    "Extracting full text...",
                    Style::default().add_modifier(Modifier::ITALIC),
                )));
            }
            lines.push(Line::from(""));
            lines.push(Line::from("─".repeat(area.width.saturating_sub(2) as usize)));
            lines.push(Line::from(""));

            let body = strip_html(app.details.display_content());
            lines.extend(body.lines().map(|line| Line::from(line.to_string())));

            let mut flags = String::new();
            if entry.favorite {
                flags.push_str(" ★");
            }
            if app.details.prefer_full_text() && entry.mobilized_content.is_some() {
                flags.push_str(" [full text]");
            }
            (format!(" {}{} ", entry.display_title(), flags), Text::from(lines))
        }
        None => (" Details ".to_string(), Text::from("No entry selected")),
    };

    let mut style = Style::default();
    if alpha < 1.0 {
        style = style.add_modifier(Modifier::DIM);
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style(is_active, colors).patch(style));

    let paragraph = Paragraph::new(content)
        .block(block)
        .style(style)
        .wrap(Wrap { trim: false })
        .scroll((app.details_scroll, 0));

    frame.render_widget(paragraph, area);
}

fn hints<S: Store + Send + Sync + 'static>(app: &TuiApp<S>, config: &Config) -> String {
    let keys = &config.keybindings;
    let mut actions: Vec<(Action, &str)> = if app.details_open() {
        vec![
            (Action::Back, "Back"),
            (Action::PreviousEntry, "Prev"),
            (Action::NextEntry, "Next"),
            (Action::FullText, "Full text"),
            (Action::ToggleFavorite, "Fav"),
            (Action::OpenInBrowser, "Open"),
        ]
    } else {
        vec![
            (Action::NextPane, "Pane"),
            (Action::Select, "Open"),
            (Action::Search, "Search"),
            (Action::ToggleRead, "Read"),
            (Action::ToggleFavorite, "Fav"),
            (Action::MarkAllRead, "All read"),
            (Action::Refresh, "Refresh"),
            (Action::ToggleSort, "Sort"),
        ]
    };
    if app.mark_all_hidden() {
        actions.retain(|(action, _)| *action != Action::MarkAllRead);
    }
    actions.push((Action::Quit, "Quit"));

    actions
        .into_iter()
        .filter_map(|(action, label)| keys.hint(action).map(|key| format!("{}:{}", key, label)))
        .collect::<Vec<_>>()
        .join("  ")
}

fn render_status_bar<S: Store + Send + Sync + 'static>(
    frame: &mut Frame,
    app: &TuiApp<S>,
    area: Rect,
    config: &Config,
) {
    let status = if let Some((_, ref title)) = app.pending_delete {
        format!("Delete \"{}\"? (y/n)", title)
    } else if let Some((ref msg, _)) = app.status_message {
        msg.clone()
    } else if app.is_refreshing() {
        "Refreshing feeds...".to_string()
    } else {
        hints(app, config)
    };

    let colors = &config.colors;
    let paragraph =
        Paragraph::new(status).style(Style::default().fg(colors.status_fg).bg(colors.status_bg));

    frame.render_widget(paragraph, area);
}

/// Plain text of an HTML body. Block-level tags break lines; runs of
/// whitespace collapse; entities are decoded.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut tag = String::new();
    let mut in_tag = false;
    let mut last_was_space = true;

    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if breaks_line(&tag) {
                    let trimmed = result.trim_end_matches(' ').len();
                    result.truncate(trimmed);
                    if !result.is_empty() && !result.ends_with('\n') {
                        result.push('\n');
                    }
                    last_was_space = true;
                }
            }
            _ if in_tag => tag.push(c),
            _ if c.is_whitespace() => {
                if !last_was_space {
                    result.push(' ');
                    last_was_space = true;
                }
            }
            _ => {
                result.push(c);
                last_was_space = false;
            }
        }
    }

    html_escape::decode_html_entities(result.trim()).into_owned()
}

fn breaks_line(tag: &str) -> bool {
    let name: String = tag
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "p" | "br" | "div" | "li" | "ul" | "ol" | "tr" | "blockquote" | "pre" | "h1" | "h2"
            | "h3" | "h4" | "h5" | "h6"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::NavigationState;
    use std::time::Instant;

    fn area() -> Rect {
        Rect::new(0, 0, 150, 40)
    }

    #[test]
    fn test_strip_html_keeps_paragraphs() {
        let html = "<p>First   line</p>\n<p>Second &amp; <b>bold</b></p><br/>tail";
        assert_eq!(strip_html(html), "First line\nSecond & bold\ntail");
    }

    #[test]
    fn test_strip_html_plain_text() {
        assert_eq!(strip_html("  just\ttext  "), "just text");
    }

    #[test]
    fn test_two_column_areas() {
        let layout =
            ContainersLayout::new(NavigationState::TwoColumnsWithDetails, true, 60, Instant::now());
        let (master, details) = panel_areas(&layout, area());
        assert_eq!(master, Some(Rect::new(0, 0, 60, 40)));
        assert_eq!(details, Some(Rect::new(60, 0, 90, 40)));
    }

    #[test]
    fn test_single_column_slide_offsets_details() {
        let now = Instant::now();
        let mut layout = ContainersLayout::new(NavigationState::SingleColumnMaster, false, 60, now);
        assert_eq!(panel_areas(&layout, area()), (Some(area()), None));

        layout.set_state(NavigationState::TwoColumnsWithDetails, now);
        let (master, details) = panel_areas(&layout, area());
        assert_eq!(master, Some(area()));
        // Starts 0.3 of the height down.
        assert_eq!(details, Some(Rect::new(0, 12, 150, 28)));

        layout.finish();
        assert_eq!(panel_areas(&layout, area()), (None, Some(area())));
    }
}
