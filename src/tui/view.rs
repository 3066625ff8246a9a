//! Pure rendering of the launcher screen, plus mouse hit-testing against the same layout.

use crate::model::Action;
use crate::tui::help::draw_help;
use crate::tui::state::UiState;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use std::rc::Rc;

fn sections(area: Rect) -> Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(Action::MENU.len() as u16 + 2),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area)
}

fn menu_block() -> Block<'static> {
    Block::default().borders(Borders::ALL).title("Services")
}

/// Menu row under a terminal cell, if any.
pub fn menu_index_at(area: Rect, column: u16, row: u16) -> Option<usize> {
    let inner = menu_block().inner(sections(area)[1]);
    if column < inner.x || column >= inner.right() || row < inner.y || row >= inner.bottom() {
        return None;
    }
    let index = usize::from(row - inner.y);
    (index < Action::MENU.len()).then_some(index)
}

pub fn draw(area: Rect, f: &mut Frame, state: &UiState) {
    let chunks = sections(area);

    let title = Paragraph::new(Line::from(Span::styled(
        "🚀 Postal Converter JA Launcher",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    let items: Vec<Line> = Action::MENU
        .iter()
        .enumerate()
        .map(|(i, action)| menu_line(state, i, *action))
        .collect();
    f.render_widget(Paragraph::new(items).block(menu_block()), chunks[1]);

    f.render_widget(
        Paragraph::new(status_lines(state))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status")),
        chunks[2],
    );

    draw_help(chunks[3], f);
}

fn menu_line(state: &UiState, index: usize, action: Action) -> Line<'static> {
    let (enabled, done) = state.view.item_state(index);
    let selected = state.view.cursor == index;
    let loading = state
        .view
        .loading
        .as_ref()
        .is_some_and(|l| l.index == index);

    let style = if selected {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else if !enabled {
        Style::default().fg(Color::DarkGray)
    } else if done {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };

    let mut spans = vec![
        Span::styled(if selected { "> " } else { "  " }, style),
        Span::styled(action.menu_label(), style),
    ];
    if done {
        spans.push(Span::styled(" ✓", Style::default().fg(Color::Green)));
    }
    if !enabled {
        spans.push(Span::styled(
            " (Locked 🔒)",
            Style::default().fg(Color::DarkGray),
        ));
    }
    if loading {
        spans.push(Span::styled(
            format!(" {}", state.spinner_frame()),
            Style::default().fg(Color::Yellow),
        ));
    }
    Line::from(spans)
}

fn status_lines(state: &UiState) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if let Some(loading) = &state.view.loading {
        lines.push(Line::from(Span::styled(
            format!("{} {}...", state.spinner_frame(), loading.label),
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(state.view.message.clone()));
    lines.push(Line::from(""));

    let link = |label: &'static str, url: &str| {
        [
            Span::raw(label),
            Span::styled(url.to_string(), Style::default().fg(Color::Cyan)),
        ]
    };
    let mut urls = Vec::new();
    urls.extend(link("API: ", &state.links.api));
    urls.push(Span::raw(" | "));
    urls.extend(link("Swagger: ", &state.links.swagger));
    urls.push(Span::raw(" | "));
    urls.extend(link("Frontend: ", &state.links.frontend));
    lines.push(Line::from(urls));

    let pids: Vec<String> = [
        ("API", state.view.api_pid),
        ("Frontend", state.view.frontend_pid),
    ]
    .into_iter()
    .filter_map(|(name, pid)| pid.map(|p| format!("{name} pid {p}")))
    .collect();
    if !pids.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Managed: {}", pids.join(", ")),
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press q to quit.",
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LoadingView, Service, Status};
    use crate::tui::state::Links;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn state() -> UiState {
        let mut state = UiState::new(Links {
            api: "http://127.0.0.1:3202".into(),
            swagger: "http://127.0.0.1:3202/docs".into(),
            frontend: "http://127.0.0.1:3203".into(),
        });
        state.view.message = "Please start the Databases first.".into();
        state
    }

    fn render(state: &UiState) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| draw(f.area(), f, state)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        (0..buffer.area.height)
            .map(|y| {
                (0..buffer.area.width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect()
            })
            .collect()
    }

    fn has(rows: &[String], needle: &str) -> bool {
        rows.iter().any(|r| r.contains(needle))
    }

    fn row_with<'a>(rows: &'a [String], needle: &str) -> &'a str {
        rows.iter()
            .find(|r| r.contains(needle))
            .unwrap_or_else(|| panic!("no row contains {needle:?}"))
    }

    #[test]
    fn locked_items_until_database_is_done() {
        let rows = render(&state());
        assert!(row_with(&rows, "Start Crawler").contains("(Locked"));
        assert!(row_with(&rows, "Start API Server").contains("(Locked"));
        assert!(!row_with(&rows, "Start Databases").contains("(Locked"));
        assert!(row_with(&rows, "Start Databases").contains("> "));
        assert!(has(&rows, "Please start the Databases first."));
        assert!(has(&rows, "Press q to quit."));
        assert!(has(&rows, "Swagger: http://127.0.0.1:3202/docs"));
    }

    #[test]
    fn done_and_loading_markers() {
        let mut state = state();
        state.view.statuses[Service::Database.slot()] = Status::Done;
        state.view.loading = Some(LoadingView {
            index: Action::StartApi.index(),
            label: "Starting API",
        });
        state.view.api_pid = Some(4242);

        let rows = render(&state);

        assert!(row_with(&rows, "Start Databases").contains('✓'));
        assert!(!row_with(&rows, "Start API Server").contains("(Locked"));
        assert!(row_with(&rows, "Start API Server").contains("Server |"));
        assert!(row_with(&rows, "Starting API...").contains('|'));
        assert!(row_with(&rows, "Start Frontend").contains("(Locked"));
        assert!(has(&rows, "Managed: API pid 4242"));
    }

    #[test]
    fn clicks_map_to_menu_rows() {
        let area = Rect::new(0, 0, 100, 30);
        // Title takes rows 0..3, the menu border is row 3.
        assert_eq!(menu_index_at(area, 5, 3), None);
        assert_eq!(menu_index_at(area, 5, 4), Some(0));
        assert_eq!(menu_index_at(area, 5, 9), Some(Action::Quit.index()));
        assert_eq!(menu_index_at(area, 5, 10), None);
        assert_eq!(menu_index_at(area, 0, 5), None);
        assert_eq!(menu_index_at(area, 50, 5), Some(1));
    }
}
