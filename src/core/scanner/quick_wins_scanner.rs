// src/core/scanner/quick_wins_scanner.rs

use reqwest::header::{ALLOW, CONTENT_SECURITY_POLICY, X_FRAME_OPTIONS};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

use super::http;
use super::ProbeContext;
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};
use crate::core::scoring::{deduction_score, SeverityDeductions};

/// Fragments that make a robots.txt entry worth hiding.
const SENSITIVE_INDICATORS: &[&str] = &[
    "admin",
    "backup",
    "config",
    "database",
    "sql",
    "dump",
    "private",
    "secret",
    "internal",
    "test",
    "dev",
    "staging",
    ".git",
    ".env",
    ".ssh",
    "wp-admin",
    "phpmyadmin",
];

const EXCESSIVE_ROBOTS_PATHS: usize = 50;

const SECURITY_TXT_LOCATIONS: &[&str] = &["/.well-known/security.txt", "/security.txt"];

const TRACE_HEADER: &str = "x-rampart-trace";

// --- robots.txt ---

pub fn analyze_robots(body: &str) -> Vec<Finding> {
    let paths: Vec<&str> = body
        .lines()
        .filter_map(|line| {
            let (directive, value) = line.trim().split_once(':')?;
            let directive = directive.trim().to_ascii_lowercase();
            (directive == "disallow" || directive == "allow").then(|| value.trim())
        })
        .filter(|path| !path.is_empty() && *path != "/")
        .collect();

    let sensitive: Vec<&str> = paths
        .iter()
        .copied()
        .filter(|path| {
            let lowered = path.to_ascii_lowercase();
            SENSITIVE_INDICATORS.iter().any(|i| lowered.contains(i))
        })
        .collect();

    let mut findings = Vec::new();
    if !sensitive.is_empty() {
        findings.push(
            Finding::new(
                "ROBOTS_SENSITIVE_PATHS",
                Severity::Medium,
                "/robots.txt",
                format!("robots.txt discloses {} sensitive paths", sensitive.len()),
            )
            .with_evidence(sensitive.iter().take(10).copied().collect::<Vec<_>>().join(", ")),
        );
    }
    if paths.len() > EXCESSIVE_ROBOTS_PATHS {
        findings.push(Finding::new(
            "ROBOTS_EXCESSIVE_PATHS",
            Severity::Low,
            "/robots.txt",
            format!("robots.txt lists {} paths, mapping out the site structure", paths.len()),
        ));
    }
    findings
}

// --- Clickjacking ---

pub fn analyze_framing(x_frame_options: Option<&str>, csp: Option<&str>) -> Option<Finding> {
    let xfo = x_frame_options.map(|v| v.trim().to_ascii_uppercase()).filter(|v| !v.is_empty());
    let frame_ancestors = csp.is_some_and(|c| c.to_ascii_lowercase().contains("frame-ancestors"));

    match xfo.as_deref() {
        None if !frame_ancestors => Some(
            Finding::new(
                "CLICKJACKING_UNPROTECTED",
                Severity::Medium,
                "response_headers",
                "Page can be framed by any origin",
            )
            .with_evidence("No X-Frame-Options header and no CSP frame-ancestors directive"),
        ),
        Some(value @ ("ALLOW" | "ALLOWALL")) => Some(
            Finding::new(
                "CLICKJACKING_PERMISSIVE",
                Severity::Low,
                "response_headers",
                "X-Frame-Options explicitly allows framing",
            )
            .with_evidence(format!("X-Frame-Options: {value}")),
        ),
        _ => None,
    }
}

// --- HTTP methods ---

fn method_severity(method: &str) -> Option<Severity> {
    match method {
        "PUT" | "DELETE" => Some(Severity::High),
        "TRACE" | "CONNECT" | "PATCH" => Some(Severity::Medium),
        _ => None,
    }
}

/// Findings for dangerous methods advertised in an `Allow` header.
pub fn analyze_allowed_methods(allow: &str) -> Vec<Finding> {
    let mut seen = Vec::new();
    allow
        .split(',')
        .map(|m| m.trim().to_ascii_uppercase())
        .filter_map(|method| {
            let severity = method_severity(&method)?;
            if seen.contains(&method) {
                return None;
            }
            seen.push(method.clone());
            Some(
                Finding::new(
                    "HTTP_METHOD_DANGEROUS",
                    severity,
                    format!("method:{method}"),
                    format!("Server advertises the {method} method"),
                )
                .with_evidence(format!("Allow: {}", allow.trim())),
            )
        })
        .collect()
}

async fn check_methods(client: &Client, url: &Url) -> Vec<Finding> {
    let mut findings = match client.request(Method::OPTIONS, url.clone()).send().await {
        Ok(response) => response
            .headers()
            .get(ALLOW)
            .and_then(|v| v.to_str().ok())
            .map(analyze_allowed_methods)
            .unwrap_or_default(),
        Err(e) => {
            debug!(error = %e, "OPTIONS request failed.");
            Vec::new()
        }
    };

    let marker = Uuid::new_v4().simple().to_string();
    let echoed = match client
        .request(Method::TRACE, url.clone())
        .header(TRACE_HEADER, &marker)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            response.text().await.map(|body| body.contains(&marker)).unwrap_or(false)
        }
        Ok(_) => false,
        Err(e) => {
            debug!(error = %e, "TRACE request failed.");
            false
        }
    };

    if echoed {
        findings.retain(|f| f.location() != "method:TRACE");
        findings.push(Finding::new(
            "HTTP_TRACE_ENABLED",
            Severity::Medium,
            "method:TRACE",
            "TRACE echoes request headers back (cross-site tracing)",
        ));
    }
    findings
}

// --- security.txt ---

pub fn is_security_txt(status: StatusCode, body: &str) -> bool {
    status == StatusCode::OK && body.lines().any(|line| line.trim_start().to_ascii_lowercase().starts_with("contact:"))
}

async fn find_security_txt(client: &Client, base: &Url) -> Option<String> {
    for location in SECURITY_TXT_LOCATIONS {
        let Ok(url) = base.join(location) else { continue };
        match http::get_page(client, &url).await {
            Ok(page) if is_security_txt(page.status, &page.body) => return Some(location.to_string()),
            Ok(page) => debug!(location, status = %page.status, "No usable security.txt."),
            Err(e) => debug!(location, error = %e, "security.txt request failed."),
        }
    }
    None
}

pub async fn run_quick_wins_scan(ctx: &ProbeContext) -> ProbeResult {
    info!(target = %ctx.target, "Starting quick wins scan.");

    let client = match http::build_client(ctx, true) {
        Ok(c) => c,
        Err(e) => return ctx.failure(ProbeKind::QuickWins, e),
    };
    let url = ctx.target.url();
    let page = match http::get_page(&client, url).await {
        Ok(page) => page,
        Err(e) => {
            error!(error = %e, "Failed to fetch target page for quick wins scan.");
            return ctx.failure(ProbeKind::QuickWins, format!("HTTP request failed: {}", e));
        }
    };

    let mut findings = Vec::new();

    match url.join("/robots.txt") {
        Ok(robots_url) => match http::get_page(&client, &robots_url).await {
            Ok(robots) if robots.status == StatusCode::OK => findings.extend(analyze_robots(&robots.body)),
            Ok(robots) => debug!(status = %robots.status, "No robots.txt."),
            Err(e) => debug!(error = %e, "robots.txt request failed."),
        },
        Err(e) => debug!(error = %e, "Could not build robots.txt URL."),
    }

    let header = |name| page.headers.get(name).and_then(|v| v.to_str().ok());
    findings.extend(analyze_framing(header(X_FRAME_OPTIONS), header(CONTENT_SECURITY_POLICY)));

    findings.extend(check_methods(&client, url).await);

    let security_txt = find_security_txt(&client, url).await;
    if security_txt.is_none() {
        findings.push(Finding::new(
            "SECURITY_TXT_MISSING",
            Severity::Low,
            "/.well-known/security.txt",
            "No security.txt with a Contact field was found",
        ));
    }

    let score = deduction_score(&findings, &SeverityDeductions::QUICK_WINS);
    let summary = format!("{} quick-win issues across 4 checks", findings.len());
    info!(findings = findings.len(), "Quick wins scan finished.");
    ProbeResult::completed(ProbeKind::QuickWins, score, summary, findings)
        .with_detail("security_txt", security_txt)
}
