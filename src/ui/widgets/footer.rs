// src/ui/widgets/footer.rs

use crate::app::{App, AppState};
use ratatui::{
    prelude::*,
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::Paragraph,
};

fn key(label: &str) -> Span<'_> {
    Span::styled(label, Style::new().bold().fg(Color::Yellow))
}

/// Renders the footer widget, which displays available actions.
///
/// # Arguments
/// * `frame` - The `Frame` to draw into.
/// * `app` - The application state; the key hints follow `app.state`.
/// * `area` - The `Rect` of the footer line.
pub fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let spans = match app.state {
        AppState::Disclaimer => Line::from(vec![Span::raw("Press "), key("Enter"), Span::raw(" to continue.")]),
        AppState::Idle => Line::from(vec![
            key("Enter"),
            Span::raw(" scan, "),
            key("Tab"),
            Span::raw(" full/quick, "),
            key("Esc"),
            Span::raw(" quit."),
        ]),
        AppState::Finished | AppState::Rejected(_) => Line::from(vec![
            key("[N]"),
            Span::raw("ew Scan, "),
            key("↑ ↓"),
            Span::raw(" navigate, "),
            key("[Q]"),
            Span::raw("uit"),
        ]),
        AppState::Scanning => Line::from("Scanning... Press Q to quit."),
    };

    let footer = Paragraph::new(spans).alignment(Alignment::Center);
    frame.render_widget(footer, area);
}
