use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key(k: &'static str) -> Span<'static> {
    Span::styled(k, Style::default().fg(Color::Magenta))
}

fn help_line() -> Line<'static> {
    Line::from(vec![
        key("↑/k"),
        Span::raw(" "),
        key("↓/j"),
        Span::raw(" move  "),
        key("enter"),
        Span::raw("/"),
        key("space"),
        Span::raw(" select  "),
        key("1-6"),
        Span::raw(" jump  "),
        key("q"),
        Span::raw(" / "),
        key("Ctrl-C"),
        Span::raw(" quit"),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(help_line())
        .block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(p, area);
}
