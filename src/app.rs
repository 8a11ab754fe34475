// src/app.rs

use std::cmp::Reverse;

use ratatui::widgets::ListState;
use rampart_rs_scanner::core::error::ScanError;
use rampart_rs_scanner::core::models::{
    Finding, ProbeKind, RiskLevel, ScanRequest, ScanResult, ScanStatus, ScanType, Severity,
};

pub const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub enum AppState {
    Disclaimer,
    Idle,
    Scanning,
    Finished,
    /// The scan was rejected before any probe ran.
    Rejected(String),
}

/// One row of the per-probe checklist in the summary panel.
#[derive(Debug, Clone)]
pub struct ProbeLine {
    pub kind: ProbeKind,
    pub score: u8,
    pub risk: RiskLevel,
    pub findings: usize,
    pub error: Option<String>,
}

impl ProbeLine {
    pub fn findings_free(&self) -> bool {
        self.findings == 0
    }
}

#[derive(Debug, Default)]
pub struct ScanSummary {
    pub score: f64,
    pub risk: Option<RiskLevel>,
    pub status: Option<ScanStatus>,
    pub duration: f64,
    pub critical_issues: usize,
    pub high_issues: usize,
    pub medium_issues: usize,
    pub low_issues: usize,
    pub probes: Vec<ProbeLine>,
}

impl ScanSummary {
    fn from_result(result: &ScanResult) -> Self {
        Self {
            score: result.security_score,
            risk: Some(result.risk_level),
            status: Some(result.status),
            duration: result.duration,
            critical_issues: result.count_by_severity(Severity::Critical),
            high_issues: result.count_by_severity(Severity::High),
            medium_issues: result.count_by_severity(Severity::Medium),
            low_issues: result.count_by_severity(Severity::Low),
            probes: result
                .results
                .values()
                .map(|r| ProbeLine {
                    kind: r.category(),
                    score: r.score(),
                    risk: r.risk_level(),
                    findings: r.findings().len(),
                    error: r.error().map(str::to_string),
                })
                .collect(),
        }
    }

    pub fn total_issues(&self) -> usize {
        self.critical_issues + self.high_issues + self.medium_issues + self.low_issues
    }
}

/// The whole state of the TUI.
///
/// The event loop in `main.rs` mutates it in response to key presses and
/// finished scans, and the `ui` module reads it to draw each frame.
pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub input: String,
    pub scan_type: ScanType,
    pub scan_result: Option<ScanResult>,
    /// Every finding of the last scan, most severe first.
    pub all_findings: Vec<(ProbeKind, Finding)>,
    pub analysis_list_state: ListState,
    pub summary: ScanSummary,
    /// Animated towards `summary.score` on each tick.
    pub displayed_score: u8,
    pub spinner_frame: usize,
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            state: AppState::Disclaimer,
            input: String::new(),
            scan_type: ScanType::Full,
            scan_result: None,
            all_findings: Vec::new(),
            analysis_list_state: ListState::default(),
            summary: ScanSummary::default(),
            displayed_score: 0,
            spinner_frame: 0,
        }
    }

    pub fn acknowledge_disclaimer(&mut self) {
        if matches!(self.state, AppState::Disclaimer) {
            self.state = AppState::Idle;
        }
    }

    /// Tab switches between a full and a quick scan.
    pub fn toggle_scan_type(&mut self) {
        self.scan_type = match self.scan_type {
            ScanType::Full => ScanType::Quick,
            _ => ScanType::Full,
        };
    }

    /// Moves to `Scanning` and builds the request to dispatch.
    ///
    /// # Returns
    /// The `ScanRequest` for the trimmed input and the selected scan type, or
    /// `None` if the input is empty, in which case the state is unchanged.
    pub fn start_scan(&mut self) -> Option<ScanRequest> {
        let target = self.input.trim();
        if target.is_empty() {
            return None;
        }
        let request = ScanRequest::new(target, self.scan_type);
        self.state = AppState::Scanning;
        Some(request)
    }

    /// Stores the outcome of a scan.
    ///
    /// A completed scan fills the summary and the findings list, sorted most
    /// severe first with the first entry selected. A scan rejected before any
    /// probe ran moves to `Rejected` with the error message.
    ///
    /// # Arguments
    /// * `outcome` - What `Orchestrator::run` returned.
    pub fn finish_scan(&mut self, outcome: Result<ScanResult, ScanError>) {
        match outcome {
            Ok(result) => {
                self.summary = ScanSummary::from_result(&result);
                self.all_findings = result.findings().map(|(kind, f)| (kind, f.clone())).collect();
                self.all_findings.sort_by_key(|(_, f)| Reverse(f.severity()));
                self.analysis_list_state = ListState::default();
                if !self.all_findings.is_empty() {
                    self.analysis_list_state.select(Some(0));
                }
                self.scan_result = Some(result);
                self.state = AppState::Finished;
            }
            Err(e) => self.state = AppState::Rejected(e.to_string()),
        }
    }

    pub fn next_finding(&mut self) {
        if self.all_findings.is_empty() {
            return;
        }
        let next = match self.analysis_list_state.selected() {
            Some(i) if i + 1 < self.all_findings.len() => i + 1,
            Some(i) => i,
            None => 0,
        };
        self.analysis_list_state.select(Some(next));
    }

    pub fn previous_finding(&mut self) {
        if self.all_findings.is_empty() {
            return;
        }
        let previous = self.analysis_list_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.analysis_list_state.select(Some(previous));
    }

    pub fn selected_finding(&self) -> Option<&(ProbeKind, Finding)> {
        self.analysis_list_state.selected().and_then(|i| self.all_findings.get(i))
    }

    /// Advances the spinner while scanning and moves the gauge two points
    /// closer to the final score once finished.
    pub fn on_tick(&mut self) {
        match self.state {
            AppState::Scanning => self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len(),
            AppState::Finished => {
                let target = self.summary.score.round().clamp(0.0, 100.0) as u8;
                if self.displayed_score < target {
                    self.displayed_score = (self.displayed_score + 2).min(target);
                }
            }
            _ => {}
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Back to an empty input, keeping the chosen scan type.
    pub fn reset(&mut self) {
        self.state = AppState::Idle;
        self.input = String::new();
        self.scan_result = None;
        self.all_findings.clear();
        self.analysis_list_state = ListState::default();
        self.summary = ScanSummary::default();
        self.displayed_score = 0;
        self.spinner_frame = 0;
    }
}
