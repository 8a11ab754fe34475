// src/core/scanner/headers_scanner.rs

use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::{debug, error, info, warn};

use super::http;
use super::ProbeContext;
use crate::config::HeaderWeights;
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};

/// A security header whose absence is a finding.
struct HeaderRule {
    name: &'static str,
    code: &'static str,
    severity: Severity,
    weight: fn(&HeaderWeights) -> u8,
    purpose: &'static str,
}

static HEADER_RULES: &[HeaderRule] = &[
    HeaderRule {
        name: "strict-transport-security",
        code: "HEADERS_HSTS_MISSING",
        severity: Severity::High,
        weight: |w| w.strict_transport_security,
        purpose: "enforces HTTPS connections",
    },
    HeaderRule {
        name: "content-security-policy",
        code: "HEADERS_CSP_MISSING",
        severity: Severity::High,
        weight: |w| w.content_security_policy,
        purpose: "restricts script and resource origins",
    },
    HeaderRule {
        name: "x-frame-options",
        code: "HEADERS_X_FRAME_OPTIONS_MISSING",
        severity: Severity::Medium,
        weight: |w| w.x_frame_options,
        purpose: "prevents clickjacking",
    },
    HeaderRule {
        name: "x-content-type-options",
        code: "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING",
        severity: Severity::Medium,
        weight: |w| w.x_content_type_options,
        purpose: "prevents MIME-type sniffing",
    },
    HeaderRule {
        name: "referrer-policy",
        code: "HEADERS_REFERRER_POLICY_MISSING",
        severity: Severity::Medium,
        weight: |w| w.referrer_policy,
        purpose: "controls referrer information",
    },
    HeaderRule {
        name: "permissions-policy",
        code: "HEADERS_PERMISSIONS_POLICY_MISSING",
        severity: Severity::Medium,
        weight: |w| w.permissions_policy,
        purpose: "controls browser features",
    },
    HeaderRule {
        name: "x-xss-protection",
        code: "HEADERS_X_XSS_PROTECTION_MISSING",
        severity: Severity::Low,
        weight: |w| w.x_xss_protection,
        purpose: "enables the legacy XSS filter",
    },
];

/// Headers that reveal the software stack.
const DISCLOSURE_HEADERS: &[&str] = &["server", "x-powered-by", "x-aspnet-version", "x-aspnetmvc-version"];

/// Reads a header as text. Non-UTF-8 values still count as present.
fn check_header(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(s) => {
            debug!(header_name = name, value = s, "Header found.");
            Some(s.to_string())
        }
        Err(_) => {
            warn!(header_name = name, "Header found but contained invalid UTF-8.");
            Some("[Invalid UTF-8]".to_string())
        }
    }
}

/// Findings plus the points they take off the header score.
#[derive(Debug, Default)]
pub struct HeaderAnalysis {
    pub findings: Vec<Finding>,
    pub deduction: u32,
}

impl HeaderAnalysis {
    fn push(&mut self, finding: Finding, weight: u8) {
        self.deduction += u32::from(weight);
        self.findings.push(finding);
    }

    pub fn score(&self) -> u8 {
        100u32.saturating_sub(self.deduction) as u8
    }
}

/// `Server: nginx` is fine; `Server: nginx/1.18.0` leaks a version.
fn discloses_version(header: &str, value: &str) -> bool {
    header != "server" || value.chars().any(|c| c.is_ascii_digit())
}

/// Names the cookie attributes missing from one `Set-Cookie` value.
pub fn missing_cookie_flags(set_cookie: &str, https: bool) -> Vec<&'static str> {
    let attributes: Vec<String> = set_cookie
        .split(';')
        .skip(1)
        .map(|a| a.trim().to_ascii_lowercase())
        .collect();
    let has = |flag: &str| attributes.iter().any(|a| a == flag || a.starts_with(&format!("{flag}=")));

    let mut missing = Vec::new();
    if https && !has("secure") {
        missing.push("Secure");
    }
    if !has("httponly") {
        missing.push("HttpOnly");
    }
    if !has("samesite") {
        missing.push("SameSite");
    }
    missing
}

pub fn analyze_headers(headers: &HeaderMap, https: bool, weights: &HeaderWeights) -> HeaderAnalysis {
    debug!("Analyzing collected header data.");
    let mut analysis = HeaderAnalysis::default();

    for rule in HEADER_RULES {
        if check_header(headers, rule.name).is_none() {
            analysis.push(
                Finding::new(
                    rule.code,
                    rule.severity,
                    "response_headers",
                    format!("Missing {} header, which {}", rule.name, rule.purpose),
                ),
                (rule.weight)(weights),
            );
        }
    }

    for header in DISCLOSURE_HEADERS {
        if let Some(value) = check_header(headers, header).filter(|v| discloses_version(header, v)) {
            analysis.push(
                Finding::new(
                    "HEADERS_INFO_DISCLOSURE",
                    Severity::Low,
                    format!("header:{header}"),
                    format!("{header} header reveals server software"),
                )
                .with_evidence(value),
                weights.information_disclosure,
            );
        }
    }

    for cookie in headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()) {
        let missing = missing_cookie_flags(cookie, https);
        if missing.is_empty() {
            continue;
        }
        let name = cookie.split('=').next().unwrap_or_default().trim().to_string();
        analysis.push(
            Finding::new(
                "HEADERS_INSECURE_COOKIE",
                Severity::Medium,
                format!("cookie:{name}"),
                format!("Cookie '{name}' is missing {}", missing.join(", ")),
            ),
            weights.insecure_cookie,
        );
    }

    analysis
}

pub async fn run_headers_scan(ctx: &ProbeContext) -> ProbeResult {
    info!(target = %ctx.target, "Starting headers scan.");

    let client = match http::build_client(ctx, true) {
        Ok(c) => c,
        Err(e) => return ctx.failure(ProbeKind::Headers, e),
    };

    let page = match http::get_page(&client, ctx.target.url()).await {
        Ok(page) => page,
        Err(e) => {
            error!(url = %ctx.target.url(), error = %e, "HTTP request failed for headers scan.");
            return ctx.failure(ProbeKind::Headers, format!("HTTP request failed: {}", e));
        }
    };
    info!(status = %page.status, "Received HTTP response for headers scan.");

    let https = page.url.scheme() == "https";
    let analysis = analyze_headers(&page.headers, https, &ctx.config.headers);
    let missing = analysis
        .findings
        .iter()
        .filter(|f| f.finding_type().ends_with("_MISSING"))
        .count();
    let present: Vec<&str> = HEADER_RULES
        .iter()
        .filter(|rule| page.headers.contains_key(rule.name))
        .map(|rule| rule.name)
        .collect();

    let score = analysis.score();
    let summary = format!("{} of {} security headers missing", missing, HEADER_RULES.len());
    info!(findings = analysis.findings.len(), "Headers scan finished.");
    ProbeResult::completed(ProbeKind::Headers, score, summary, analysis.findings)
        .with_detail("status_code", page.status.as_u16())
        .with_detail("present_headers", present)
}
