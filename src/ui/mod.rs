// src/ui/mod.rs

use crate::app::{App, AppState};
use ratatui::prelude::*;

mod layout;
mod widgets;

/// Draws one frame of the whole interface.
///
/// The layout is recomputed from the current frame size on every call, so the
/// UI follows terminal resizes. While the disclaimer has not been acknowledged
/// it is drawn last, on top of everything else.
///
/// # Arguments
/// * `app` - The application state. Mutable because the findings list keeps
///   its scroll position in a `ListState`.
/// * `frame` - The `Frame` being drawn.
pub fn render(app: &mut App, frame: &mut Frame) {
    let layout = layout::create_layout(frame.area());

    widgets::input::render_input(frame, app, layout.input);
    widgets::analysis_view::render_analysis_view(frame, app, layout.report);
    widgets::summary::render_summary(frame, app, layout.summary);
    widgets::footer::render_footer(frame, app, layout.footer);

    if matches!(app.state, AppState::Disclaimer) {
        widgets::disclaimer_popup::render_disclaimer_popup(frame, frame.area());
    }
}
