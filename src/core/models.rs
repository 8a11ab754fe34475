// src/core/models.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::core::error::ScanError;

// --- Severity & Risk ---

/// Severity of a single finding. The same scale is used for the risk level of
/// a probe and of a whole scan, so the variants are ordered from least to most
/// severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Risk levels share the severity scale.
pub type RiskLevel = Severity;

// --- Probe Registry ---

/// The closed set of probe categories.
///
/// Parsing accepts the canonical snake_case key plus a few aliases, so option
/// maps written against older front-ends (`ssl_check`, `password_check`, ...)
/// still resolve to the right probe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum ProbeKind {
    #[strum(to_string = "port_scan", serialize = "port", serialize = "ports")]
    PortScan,
    #[strum(to_string = "ssl_tls", serialize = "ssl", serialize = "tls", serialize = "ssl_check")]
    SslTls,
    #[strum(to_string = "headers", serialize = "header", serialize = "headers_check")]
    Headers,
    #[strum(to_string = "sqli", serialize = "sql_injection")]
    Sqli,
    #[strum(to_string = "xss", serialize = "cross_site_scripting")]
    Xss,
    #[strum(to_string = "directory_enum", serialize = "dir_enum", serialize = "directories")]
    DirectoryEnum,
    #[strum(to_string = "quick_wins", serialize = "quickwins")]
    QuickWins,
    #[strum(to_string = "passwords", serialize = "password", serialize = "password_check")]
    Passwords,
    /// Also the "generic vulnerabilities" slot: `vulnerability_scan` selects it.
    #[strum(
        to_string = "database",
        serialize = "db",
        serialize = "database_check",
        serialize = "vulnerability_scan",
        serialize = "vulnerabilities"
    )]
    Database,
}

impl ProbeKind {
    /// Human-readable name used by the front-end.
    pub fn title(self) -> &'static str {
        match self {
            ProbeKind::PortScan => "Port Scan",
            ProbeKind::SslTls => "SSL/TLS",
            ProbeKind::Headers => "HTTP Security Headers",
            ProbeKind::Sqli => "SQL Injection",
            ProbeKind::Xss => "Cross-Site Scripting",
            ProbeKind::DirectoryEnum => "Directory Enumeration",
            ProbeKind::QuickWins => "Quick Wins",
            ProbeKind::Passwords => "Password Security",
            ProbeKind::Database => "Database Exposure",
        }
    }
}

/// Probes run by a `quick` scan.
pub const QUICK_PROBES: [ProbeKind; 3] = [ProbeKind::SslTls, ProbeKind::Headers, ProbeKind::QuickWins];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScanType {
    #[default]
    Full,
    Quick,
    Custom,
}

// --- Findings ---

/// A single issue reported by a probe.
///
/// Findings are immutable once built: fields are private and only readable
/// through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    finding_type: String,
    severity: Severity,
    location: String,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    evidence: Option<String>,
}

impl Finding {
    pub fn new(
        finding_type: &str,
        severity: Severity,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            finding_type: finding_type.to_string(),
            severity,
            location: location.into(),
            description: description.into(),
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    /// Machine-readable code, also the key into the knowledge base.
    pub fn finding_type(&self) -> &str {
        &self.finding_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn evidence(&self) -> Option<&str> {
        self.evidence.as_deref()
    }
}

// --- Probe Results ---

/// Outcome of one probe.
///
/// Either the probe produced a verified score, or `error` is set and the score
/// was forced to the configured floor with a CRITICAL risk level. Findings are
/// append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    category: ProbeKind,
    score: u8,
    risk_level: RiskLevel,
    summary: String,
    findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    details: Map<String, Value>,
}

impl ProbeResult {
    /// A successful probe. The risk level is the highest finding severity, or
    /// LOW when nothing was found.
    pub fn completed(category: ProbeKind, score: u8, summary: impl Into<String>, findings: Vec<Finding>) -> Self {
        let risk_level = highest_severity(&findings);
        Self {
            category,
            score: score.min(100),
            risk_level,
            summary: summary.into(),
            findings,
            error: None,
            details: Map::new(),
        }
    }

    /// A probe that could not produce a verified result.
    pub fn failed(category: ProbeKind, error: impl Into<String>, floor_score: u8) -> Self {
        let error = error.into();
        Self {
            category,
            score: floor_score.min(100),
            risk_level: Severity::Critical,
            summary: format!("{} could not be completed: {}", category.title(), error),
            findings: Vec::new(),
            error: Some(error),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn push_finding(&mut self, finding: Finding) {
        self.risk_level = self.risk_level.max(finding.severity());
        self.findings.push(finding);
    }

    pub fn category(&self) -> ProbeKind {
        self.category
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }
}

fn highest_severity(findings: &[Finding]) -> Severity {
    findings.iter().map(Finding::severity).max().unwrap_or(Severity::Low)
}

// --- Scan Request ---

/// Input handed to the orchestrator by a caller.
#[derive(Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub target: String,
    #[serde(default)]
    pub scan_type: ScanType,
    /// Probe name to enabled flag. Only consulted for `custom` scans.
    #[serde(default)]
    pub options: BTreeMap<String, bool>,
    /// Candidate credentials for the k-anonymity breach check. Never
    /// serialized back out.
    #[serde(default, skip_serializing)]
    pub passwords: Vec<String>,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, scan_type: ScanType) -> Self {
        Self {
            target: target.into(),
            scan_type,
            options: BTreeMap::new(),
            passwords: Vec::new(),
        }
    }

    pub fn with_option(mut self, probe: &str, enabled: bool) -> Self {
        self.options.insert(probe.to_string(), enabled);
        self
    }

    pub fn with_passwords(mut self, passwords: Vec<String>) -> Self {
        self.passwords = passwords;
        self
    }

    /// Resolves the probe set for this request.
    ///
    /// `full` and `quick` ignore `options`; `custom` runs exactly the enabled
    /// entries and rejects unknown probe names or an empty selection. A probe
    /// named by several aliases runs if any of them is enabled.
    pub fn enabled_probes(&self) -> Result<BTreeSet<ProbeKind>, ScanError> {
        match self.scan_type {
            ScanType::Full => Ok(ProbeKind::iter().collect()),
            ScanType::Quick => Ok(QUICK_PROBES.into_iter().collect()),
            ScanType::Custom => {
                let mut enabled = BTreeSet::new();
                for (name, on) in &self.options {
                    let kind = name
                        .parse::<ProbeKind>()
                        .map_err(|_| ScanError::InvalidOptions(format!("unknown probe {name:?}")))?;
                    if *on {
                        enabled.insert(kind);
                    }
                }
                if enabled.is_empty() {
                    return Err(ScanError::InvalidOptions(
                        "a custom scan must enable at least one probe".to_string(),
                    ));
                }
                Ok(enabled)
            }
        }
    }
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("target", &self.target)
            .field("scan_type", &self.scan_type)
            .field("options", &self.options)
            .field("passwords", &format_args!("<{} redacted>", self.passwords.len()))
            .finish()
    }
}

// --- Scan Lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanState {
    /// Moves to `next` if the lifecycle allows it:
    /// `Pending -> Running -> {Completed, Failed}`.
    pub fn advance(&mut self, next: ScanState) -> Result<(), ScanError> {
        let allowed = matches!(
            (*self, next),
            (ScanState::Pending, ScanState::Running)
                | (ScanState::Running, ScanState::Completed)
                | (ScanState::Running, ScanState::Failed)
        );
        if !allowed {
            return Err(ScanError::IllegalTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Failed)
    }
}

/// Final status recorded on a finished scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanStatus {
    Completed,
    Failed,
}

// --- Scan Result ---

/// The record returned to callers once a scan is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: String,
    pub target: String,
    pub scan_type: ScanType,
    pub security_score: f64,
    pub risk_level: RiskLevel,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds between `start_time` and `end_time`.
    pub duration: f64,
    pub status: ScanStatus,
    pub results: BTreeMap<ProbeKind, ProbeResult>,
}

impl ScanResult {
    pub fn findings(&self) -> impl Iterator<Item = (ProbeKind, &Finding)> {
        self.results
            .iter()
            .flat_map(|(kind, result)| result.findings().iter().map(move |f| (*kind, f)))
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.findings().filter(|(_, f)| f.severity() == severity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_kind_parses_canonical_names_and_aliases() {
        assert_eq!("sqli".parse::<ProbeKind>().unwrap(), ProbeKind::Sqli);
        assert_eq!("ssl_check".parse::<ProbeKind>().unwrap(), ProbeKind::SslTls);
        assert_eq!("Password_Check".parse::<ProbeKind>().unwrap(), ProbeKind::Passwords);
        assert_eq!(ProbeKind::DirectoryEnum.to_string(), "directory_enum");
        assert_eq!("vulnerability_scan".parse::<ProbeKind>().unwrap(), ProbeKind::Database);
        assert!("telnet".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn legacy_option_map_resolves_to_probes() {
        let request = ScanRequest::new("example.com", ScanType::Custom)
            .with_option("port_scan", true)
            .with_option("vulnerability_scan", true)
            .with_option("ssl_check", true)
            .with_option("password_check", true)
            .with_option("database_check", false)
            .with_option("headers_check", true);
        let probes = request.enabled_probes().unwrap();
        assert_eq!(
            probes.into_iter().collect::<Vec<_>>(),
            vec![
                ProbeKind::PortScan,
                ProbeKind::SslTls,
                ProbeKind::Headers,
                ProbeKind::Passwords,
                ProbeKind::Database,
            ]
        );
    }

    #[test]
    fn probe_kind_serializes_as_map_key() {
        let mut map = BTreeMap::new();
        map.insert(ProbeKind::QuickWins, 1);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"quick_wins":1}"#);
    }

    #[test]
    fn full_and_quick_ignore_options() {
        let full = ScanRequest::new("example.com", ScanType::Full).with_option("sqli", false);
        assert_eq!(full.enabled_probes().unwrap().len(), 9);

        let quick = ScanRequest::new("example.com", ScanType::Quick).with_option("nonsense", true);
        let probes = quick.enabled_probes().unwrap();
        assert_eq!(probes, QUICK_PROBES.into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn custom_runs_exactly_the_enabled_subset() {
        let request = ScanRequest::new("example.com", ScanType::Custom)
            .with_option("sqli", true)
            .with_option("xss", false)
            .with_option("port_scan", true);
        let probes = request.enabled_probes().unwrap();
        assert_eq!(probes.into_iter().collect::<Vec<_>>(), vec![ProbeKind::PortScan, ProbeKind::Sqli]);
    }

    #[test]
    fn custom_rejects_unknown_or_empty_selection() {
        let unknown = ScanRequest::new("example.com", ScanType::Custom).with_option("telnet", true);
        assert!(matches!(unknown.enabled_probes(), Err(ScanError::InvalidOptions(_))));

        let empty = ScanRequest::new("example.com", ScanType::Custom).with_option("xss", false);
        assert!(matches!(empty.enabled_probes(), Err(ScanError::InvalidOptions(_))));
    }

    #[test]
    fn request_debug_and_json_never_expose_passwords() {
        let request = ScanRequest::new("example.com", ScanType::Full).with_passwords(vec!["hunter2".into()]);
        assert!(!format!("{request:?}").contains("hunter2"));
        assert!(!serde_json::to_string(&request).unwrap().contains("hunter2"));
    }

    #[test]
    fn probe_result_risk_follows_highest_finding() {
        let clean = ProbeResult::completed(ProbeKind::Headers, 100, "ok", Vec::new());
        assert_eq!(clean.risk_level(), Severity::Low);

        let mut result = ProbeResult::completed(
            ProbeKind::Headers,
            70,
            "issues",
            vec![Finding::new("HEADERS_CSP_MISSING", Severity::High, "response_headers", "missing")],
        );
        assert_eq!(result.risk_level(), Severity::High);
        result.push_finding(Finding::new("X", Severity::Critical, "here", "worse"));
        assert_eq!(result.risk_level(), Severity::Critical);
        assert_eq!(result.findings().len(), 2);
    }

    #[test]
    fn failed_probe_uses_floor_and_critical() {
        let result = ProbeResult::failed(ProbeKind::SslTls, "connection refused", 0);
        assert_eq!(result.score(), 0);
        assert_eq!(result.risk_level(), Severity::Critical);
        assert_eq!(result.error(), Some("connection refused"));
        assert!(result.findings().is_empty());
    }

    #[test]
    fn state_machine_rejects_illegal_transitions() {
        let mut state = ScanState::Pending;
        assert!(state.advance(ScanState::Completed).is_err());
        state.advance(ScanState::Running).unwrap();
        state.advance(ScanState::Completed).unwrap();
        assert!(state.is_terminal());
        assert!(state.advance(ScanState::Running).is_err());
        assert!(state.advance(ScanState::Failed).is_err());
    }
}
