// src/ui/widgets/summary.rs

use crate::app::{App, AppState};
use crate::ui::widgets::analysis_view::severity_style;
use rampart_rs_scanner::core::models::ScanStatus;
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Gauge, Paragraph},
};

/// Renders the summary widget.
///
/// Shows the overall score and risk level, an animated gauge, one line per
/// probe that ran (its score, or the error that stopped it) and the issue
/// counts by severity. The panel stays empty until a scan has finished.
///
/// # Arguments
/// * `frame` - The `Frame` to draw into.
/// * `app` - The application state holding the `ScanSummary`.
/// * `area` - The `Rect` of the panel.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let summary_container = Block::default().borders(Borders::ALL).title("Summary");
    frame.render_widget(summary_container, area);

    let probe_rows = app.summary.probes.len().max(1) as u16 + 1;
    let summary_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),          // Score & risk
            Constraint::Length(1),          // Gauge
            Constraint::Length(1),          // Spacer
            Constraint::Length(probe_rows), // Probe checklist
            Constraint::Length(1),          // Spacer
            Constraint::Min(0),             // Issue counts
        ])
        .split(area);

    if !matches!(app.state, AppState::Finished) {
        return;
    }

    // --- Score & Risk Section ---
    let summary = &app.summary;
    let risk_line = match (summary.status, summary.risk) {
        (Some(ScanStatus::Failed), _) => Line::from("Scan failed: no probe could be verified".red()),
        (_, Some(risk)) => Line::from(vec![
            Span::raw(format!("{:.1}/100 ", summary.score)),
            Span::styled(format!("{} RISK", risk), severity_style(risk)),
        ]),
        _ => Line::from(""),
    };
    let score_text = Text::from(vec![
        Line::from("Security Score".bold()),
        risk_line,
        Line::from(
            format!(
                "{} in {:.1}s",
                app.scan_result.as_ref().map_or("", |r| r.target.as_str()),
                summary.duration
            )
            .dark_gray(),
        ),
    ]);
    frame.render_widget(Paragraph::new(score_text).alignment(Alignment::Center), summary_chunks[0]);

    // --- Gauge Chart (Animated) ---
    let score_gauge = Gauge::default()
        .percent(u16::from(app.displayed_score))
        .label("")
        .style(Style::default().fg(if app.displayed_score >= 80 {
            Color::Green
        } else if app.displayed_score >= 60 {
            Color::Yellow
        } else {
            Color::Red
        }));
    frame.render_widget(score_gauge, summary_chunks[1]);

    // --- Probe Checklist ---
    let checks_block = Block::default().title("PROBES".bold());
    let checks_lines: Vec<Line> = summary
        .probes
        .iter()
        .map(|probe| {
            let (icon, style) = match (&probe.error, probe.findings_free()) {
                (Some(_), _) => ("!", Style::default().fg(Color::Magenta)),
                (None, true) => ("✓", Style::default().fg(Color::Green)),
                (None, false) => ("✗", severity_style(probe.risk)),
            };
            let outcome = match &probe.error {
                Some(error) => error.clone(),
                None => probe.score.to_string(),
            };
            Line::from(vec![
                Span::styled(format!("{} ", icon), style),
                Span::raw(format!("{} ", probe.kind.title())),
                Span::styled(outcome, Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(checks_lines).block(checks_block), summary_chunks[3]);

    // --- Issue Counts ---
    let issues_block = Block::default().title(format!("ISSUES FOUND ({})", summary.total_issues()).bold());
    let count_line = |label: &'static str, count: usize, color: Color| {
        Line::from(vec![
            Span::raw(label),
            Span::styled(count.to_string(), Style::default().fg(color)),
        ])
    };
    let details_text = Text::from(vec![
        count_line("Critical: ", summary.critical_issues, Color::Red),
        count_line("High:     ", summary.high_issues, Color::LightRed),
        count_line("Medium:   ", summary.medium_issues, Color::Yellow),
        count_line("Low:      ", summary.low_issues, Color::Cyan),
    ]);
    frame.render_widget(Paragraph::new(details_text).block(issues_block), summary_chunks[5]);
}
