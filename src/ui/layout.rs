// src/ui/layout.rs

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// The areas of the application's user interface, computed once per frame.
pub struct AppLayout {
    pub input: Rect,
    pub report: Rect,
    pub summary: Rect,
    pub footer: Rect,
}

/// Splits the frame into the input box at the top, the footer at the bottom,
/// and a content area between them holding the analysis report (70%) and the
/// summary (30%) side by side.
///
/// # Arguments
/// * `frame_size` - The full `Rect` of the terminal frame.
///
/// # Returns
/// An `AppLayout` with one `Rect` per panel.
pub fn create_layout(frame_size: Rect) -> AppLayout {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(frame_size);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(main_chunks[1]);

    AppLayout {
        input: main_chunks[0],
        report: content_chunks[0],
        summary: content_chunks[1],
        footer: main_chunks[2],
    }
}
