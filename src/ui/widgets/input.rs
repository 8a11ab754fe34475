// src/ui/widgets/input.rs
use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

/// Renders the target input field.
///
/// The block title shows the scan type that Enter will start, which Tab
/// toggles. The cursor is only placed in the field while input is accepted.
///
/// # Arguments
/// * `frame` - The `Frame` to draw into.
/// * `app` - The application state holding the typed target.
/// * `area` - The `Rect` of the input box.
pub fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let title = Line::from(vec![
        Span::raw("Target "),
        Span::styled(format!("[{} scan]", app.scan_type), Style::default().fg(Color::Cyan)),
    ]);
    let input_block = Block::default().borders(Borders::ALL).title(title);
    let input_paragraph = Paragraph::new(app.input.as_str())
        .block(input_block)
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(input_paragraph, area);

    if let AppState::Idle = app.state {
        frame.set_cursor_position((area.x + app.input.chars().count() as u16 + 1, area.y + 1));
    }
}
