// src/ui/widgets/disclaimer_popup.rs

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    text::Line,
};

/// Renders the startup disclaimer as a modal over the rest of the UI.
///
/// The popup restates that only systems the user owns or is authorized to
/// test may be scanned. It is centered on the screen and drawn over a `Clear`
/// area so the panels underneath do not show through. The scanner stays
/// locked until the disclaimer is acknowledged with Enter.
///
/// # Arguments
/// * `frame` - A mutable reference to the `Frame` used for rendering the TUI.
/// * `area` - The `Rect` representing the total area available for rendering.
pub fn render_disclaimer_popup(frame: &mut Frame, area: Rect) {
    let disclaimer_text = Text::from(vec![
        Line::from("IMPORTANT LEGAL DISCLAIMER".bold().yellow()),
        Line::from(""),
        Line::from("Rampart RS is a web vulnerability scanner intended for professionals assessing assets they are explicitly authorized to test."),
        Line::from(""),
        Line::from("A full scan is ACTIVE: it connects to common ports, requests hidden paths, and submits SQL injection and XSS payloads to the target's forms and parameters. Loopback and private addresses are refused."),
        Line::from(""),
        Line::from("Scanning systems you do not own or have explicit, written permission to test is ILLEGAL in many jurisdictions."),
        Line::from(""),
        Line::from("By using this software, you agree to the following:"),
        Line::from("1. You will only scan systems you own or have written permission to test."),
        Line::from("2. You will use this software in accordance with all applicable laws."),
        Line::from("3. The authors assume NO liability for any misuse or damage caused by this program."),
        Line::from(""),
        Line::from("Press ".bold() + "Enter".bold().yellow() + " to Acknowledge and Continue".bold()),
    ]);

    let block = Block::default()
        .title("Disclaimer")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    // Create an area for the popup that occupies 70% of the width and 80% of the height.
    let popup_area = centered_rect(70, 80, area);

    let popup = Paragraph::new(disclaimer_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    // Clear first or the report underneath bleeds through.
    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}

/// Helper function to create a centered rectangle for a popup.
///
/// # Arguments
/// * `percent_x` - Width of the popup as a percentage of `r`.
/// * `percent_y` - Height of the popup as a percentage of `r`.
/// * `r` - The parent `Rect` to center the new area within.
///
/// # Returns
/// A new `Rect` that is centered within `r`.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}