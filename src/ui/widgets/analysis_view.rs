// src/ui/widgets/analysis_view.rs

use crate::app::{App, AppState, SPINNER_CHARS};
use rampart_rs_scanner::core::knowledge_base;
use rampart_rs_scanner::core::models::Severity;
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

/// Colour used for a severity wherever one is shown.
///
/// # Arguments
/// * `severity` - A finding severity or a risk level.
///
/// # Returns
/// The `Style` for that level; CRITICAL is also bold.
pub fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Critical => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Severity::High => Style::default().fg(Color::LightRed),
        Severity::Medium => Style::default().fg(Color::Yellow),
        Severity::Low => Style::default().fg(Color::Cyan),
    }
}

/// Renders the analysis report panel.
///
/// What is shown depends on the application state: a placeholder before any
/// scan, a spinner while the scan runs, the rejection message when the scan
/// never started, and otherwise the findings list with a details pane below
/// it. The details pane combines the selected finding with its knowledge base
/// entry.
///
/// # Arguments
/// * `frame` - The `Frame` to draw into.
/// * `app` - The application state. Mutable because the list selection lives
///   in `app.analysis_list_state`.
/// * `area` - The `Rect` of the panel.
pub fn render_analysis_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let main_block = Block::default()
        .borders(Borders::ALL)
        .title("Analysis Report (Navigate with ↑ ↓)");

    let content = match &app.state {
        AppState::Disclaimer | AppState::Idle => {
            Some(Paragraph::new("Scan results will appear here...").alignment(Alignment::Center))
        }
        AppState::Scanning => {
            let spinner_char = SPINNER_CHARS[app.spinner_frame];
            Some(
                Paragraph::new(Line::from(vec![
                    Span::styled(format!("{} ", spinner_char), Style::default().fg(Color::Cyan)),
                    Span::raw(format!("Running {} scan... Please wait.", app.scan_type)),
                ]))
                .alignment(Alignment::Center),
            )
        }
        AppState::Rejected(reason) => Some(
            Paragraph::new(vec![
                Line::from("SCAN REJECTED".red().bold()),
                Line::from(""),
                Line::from(reason.as_str()),
            ])
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center),
        ),
        AppState::Finished => None,
    };
    if let Some(content) = content {
        frame.render_widget(content.block(main_block), area);
        return;
    }

    let inner_area = main_block.inner(area);
    frame.render_widget(main_block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Min(0)])
        .split(inner_area);

    let items: Vec<ListItem> = app
        .all_findings
        .iter()
        .map(|(kind, finding)| {
            let title = knowledge_base::get_finding_detail(finding.finding_type())
                .map_or(finding.finding_type(), |d| d.title);
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", kind.title()), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<8} ", finding.severity()), severity_style(finding.severity())),
                Span::raw(title),
                Span::styled(format!("  {}", finding.location()), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let findings_list = List::new(items)
        .block(Block::default())
        .highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(findings_list, chunks[0], &mut app.analysis_list_state);

    let detail_block = Block::default().borders(Borders::TOP).title("Details");
    match app.selected_finding() {
        Some((_, finding)) => {
            let mut text = vec![
                Line::from(""),
                Line::from(finding.description()),
                Line::from(vec![Span::raw("Location: ").bold(), Span::raw(finding.location())]),
            ];
            if let Some(evidence) = finding.evidence() {
                text.push(Line::from(vec![Span::raw("Evidence: ").bold(), Span::raw(evidence)]));
            }
            if let Some(detail) = knowledge_base::get_finding_detail(finding.finding_type()) {
                text.extend([
                    Line::from(""),
                    Line::from("WHAT IT IS:".yellow().bold()),
                    Line::from(detail.description),
                    Line::from(""),
                    Line::from("HOW TO FIX:".yellow().bold()),
                    Line::from(detail.remediation),
                ]);
            }
            let p = Paragraph::new(text).wrap(Wrap { trim: true }).block(detail_block);
            frame.render_widget(p, chunks[1]);
        }
        None => render_placeholder_details(frame, app, detail_block, chunks[1]),
    }
}

/// Details pane for a scan without findings.
fn render_placeholder_details(frame: &mut Frame, app: &App, block: Block, area: Rect) {
    let errored = app.summary.probes.iter().filter(|p| p.error.is_some()).count();

    let placeholder_text = if errored > 0 {
        Text::from(vec![
            Line::from(""),
            Line::from("NO FINDINGS, BUT THE SCAN IS INCOMPLETE".bold().fg(Color::Yellow)),
            Line::from(""),
            Line::from(format!(
                "{} probe(s) could not be verified and were scored at the floor. See the summary panel.",
                errored
            )),
        ])
    } else {
        Text::from(vec![
            Line::from(""),
            Line::from("✓ EXCELLENT SECURITY POSTURE".bold().fg(Color::Green)),
            Line::from(""),
            Line::from("Every probe completed and none of them reported an issue."),
        ])
    };

    let p = Paragraph::new(placeholder_text).alignment(Alignment::Center).block(block);
    frame.render_widget(p, area);
}
