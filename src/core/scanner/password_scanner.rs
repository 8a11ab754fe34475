// src/core/scanner/password_scanner.rs

use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use sha1::{Digest, Sha1};
use tracing::{debug, error, info, warn};
use url::Url;

use super::http;
use super::ProbeContext;
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};
use crate::core::scoring::{deduction_score, SeverityDeductions};

static INPUT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("input").unwrap());

const POLICY_KEYWORDS: &[&str] = &[
    "password must",
    "minimum length",
    "at least",
    "uppercase",
    "lowercase",
    "special character",
    "number",
    "digit",
];

/// Autocomplete values that tell the browser how to treat a password field.
const ACCEPTED_AUTOCOMPLETE: &[&str] = &["off", "new-password", "current-password"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordField {
    pub name: String,
    pub autocomplete: Option<String>,
    pub value: Option<String>,
    /// Resolved action of the enclosing form, if any.
    pub form_action: Option<Url>,
}

impl PasswordField {
    fn location(&self) -> String {
        format!("field:{}", self.name)
    }
}

pub fn find_password_fields(body: &str, base: &Url) -> Vec<PasswordField> {
    let document = Html::parse_document(body);
    document
        .select(&INPUT_SELECTOR)
        .filter(|input| {
            input
                .value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("password"))
        })
        .map(|input| {
            let element = input.value();
            let form_action = input
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "form")
                .map(|form| {
                    form.value()
                        .attr("action")
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .and_then(|a| base.join(a).ok())
                        .unwrap_or_else(|| base.clone())
                });
            PasswordField {
                name: element.attr("name").or(element.attr("id")).unwrap_or("unnamed").to_string(),
                autocomplete: element.attr("autocomplete").map(|a| a.trim().to_ascii_lowercase()),
                value: element.attr("value").filter(|v| !v.is_empty()).map(str::to_string),
                form_action,
            }
        })
        .collect()
}

/// Static findings for a page; the breach check runs separately.
pub fn analyze_password_page(page_url: &Url, body: &str, fields: &[PasswordField]) -> Vec<Finding> {
    let mut findings = Vec::new();
    if fields.is_empty() {
        return findings;
    }

    if page_url.scheme() != "https" {
        findings.push(Finding::new(
            "PASSWORD_HTTP_TRANSMISSION",
            Severity::Critical,
            page_url.path(),
            "Password form is served over plain HTTP",
        ));
    } else {
        let mut reported = Vec::new();
        for action in fields.iter().filter_map(|f| f.form_action.as_ref()) {
            if action.scheme() != "https" && !reported.contains(&action) {
                reported.push(action);
                findings.push(
                    Finding::new(
                        "PASSWORD_HTTP_TRANSMISSION",
                        Severity::Critical,
                        format!("form:{}", action.path()),
                        "Password form submits to a plain HTTP endpoint",
                    )
                    .with_evidence(action.to_string()),
                );
            }
        }
    }

    for field in fields.iter().filter(|f| f.value.is_some()) {
        findings.push(Finding::new(
            "PASSWORD_PREFILLED",
            Severity::High,
            field.location(),
            "Password field is delivered with a pre-filled value",
        ));
    }

    let lowered = body.to_lowercase();
    if !POLICY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        findings.push(Finding::new(
            "PASSWORD_NO_POLICY",
            Severity::Medium,
            page_url.path(),
            "No password requirements are shown to users",
        ));
    }

    for field in fields {
        let configured = field
            .autocomplete
            .as_deref()
            .is_some_and(|a| ACCEPTED_AUTOCOMPLETE.contains(&a));
        if !configured {
            findings.push(
                Finding::new(
                    "PASSWORD_AUTOCOMPLETE",
                    Severity::Low,
                    field.location(),
                    format!("Autocomplete is not configured for password field '{}'", field.name),
                )
                .with_evidence(format!(
                    "autocomplete={}",
                    field.autocomplete.as_deref().unwrap_or("<unset>")
                )),
            );
        }
    }

    findings
}

// --- k-anonymity breach check ---

/// Uppercase SHA-1 of `password`, split into the 5-character prefix sent to
/// the range API and the 35-character suffix matched locally.
pub fn k_anonymity_parts(password: &str) -> (String, String) {
    let digest = hex::encode_upper(Sha1::digest(password.as_bytes()));
    let (prefix, suffix) = digest.split_at(5);
    (prefix.to_string(), suffix.to_string())
}

/// Breach count for `suffix` in a range response. Padding rows carry a zero
/// count and never match.
pub fn parse_range_response(body: &str, suffix: &str) -> Option<u64> {
    body.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(suffix))
        .and_then(|(_, count)| count.trim().parse::<u64>().ok())
        .filter(|count| *count > 0)
}

async fn breach_count(client: &Client, api_url: &str, password: &str) -> Result<Option<u64>, String> {
    let (prefix, suffix) = k_anonymity_parts(password);
    let response = client
        .get(format!("{api_url}{prefix}"))
        .header("Add-Padding", "true")
        .send()
        .await
        .map_err(|e| format!("Breach API request failed: {}", e))?;
    if !response.status().is_success() {
        return Err(format!("Breach API returned {}", response.status()));
    }
    let body = response
        .text()
        .await
        .map_err(|e| format!("Breach API response unreadable: {}", e))?;
    Ok(parse_range_response(&body, &suffix))
}

pub async fn run_password_scan(ctx: &ProbeContext) -> ProbeResult {
    info!(target = %ctx.target, candidates = ctx.passwords().len(), "Starting password security scan.");

    let client = match http::build_client(ctx, true) {
        Ok(c) => c,
        Err(e) => return ctx.failure(ProbeKind::Passwords, e),
    };
    let page = match http::get_page(&client, ctx.target.url()).await {
        Ok(page) => page,
        Err(e) => {
            error!(error = %e, "Failed to fetch target page for password scan.");
            return ctx.failure(ProbeKind::Passwords, format!("HTTP request failed: {}", e));
        }
    };

    let fields = find_password_fields(&page.body, &page.url);
    debug!(fields = fields.len(), "Password fields discovered.");
    let mut findings = analyze_password_page(&page.url, &page.body, &fields);

    // Candidates are identified by position or by field name only.
    let mut candidates: Vec<(String, &str)> = ctx
        .passwords()
        .iter()
        .enumerate()
        .map(|(index, password)| (format!("candidate:{index}"), password.as_str()))
        .collect();
    candidates.extend(
        fields
            .iter()
            .filter_map(|f| f.value.as_deref().map(|v| (f.location(), v))),
    );

    let api_url = &ctx.config.passwords.breach_api_url;
    let mut breach_errors = 0usize;
    for (location, password) in &candidates {
        match breach_count(&client, api_url, password).await {
            Ok(Some(count)) => {
                debug!(location = %location, count, "Candidate found in breach corpus.");
                findings.push(Finding::new(
                    "PASSWORD_BREACHED",
                    Severity::Critical,
                    location.as_str(),
                    format!("Password appears {count} times in known breaches"),
                ));
            }
            Ok(None) => debug!(location = %location, "Candidate not found in breach corpus."),
            Err(e) => {
                warn!(location = %location, error = %e, "Breach check failed.");
                breach_errors += 1;
            }
        }
    }

    let score = deduction_score(&findings, &SeverityDeductions::STANDARD);
    let summary = format!(
        "Found {} password fields with {} issues",
        fields.len(),
        findings.len()
    );
    info!(findings = findings.len(), "Password security scan finished.");
    ProbeResult::completed(ProbeKind::Passwords, score, summary, findings)
        .with_detail("password_fields", fields.len())
        .with_detail("candidates_checked", candidates.len() - breach_errors)
        .with_detail("breach_check_errors", breach_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r#"
        <html><body>
          <p>Your password must contain at least 12 characters.</p>
          <form action="/session" method="post">
            <input type="text" name="user">
            <input type="PASSWORD" name="pass" autocomplete="current-password">
          </form>
        </body></html>"#;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn sha1_prefix_and_suffix() {
        let (prefix, suffix) = k_anonymity_parts("password");
        assert_eq!(prefix, "5BAA6");
        assert_eq!(suffix, "1E4C9B93F3F0682250B6CF8331B7EE68FD8");
    }

    #[test]
    fn range_response_matches_suffix_and_skips_padding() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1\r\n1E4C9B93F3F0682250B6CF8331B7EE68FD8:9545824\r\nFFFFF00000000000000000000000000000A:0";
        assert_eq!(parse_range_response(body, "1E4C9B93F3F0682250B6CF8331B7EE68FD8"), Some(9545824));
        assert_eq!(parse_range_response(body, "FFFFF00000000000000000000000000000A"), None);
        assert_eq!(parse_range_response(body, "0000000000000000000000000000000000B"), None);
    }

    #[test]
    fn well_configured_https_login_is_clean() {
        let url = base("https://example.com/login");
        let fields = find_password_fields(LOGIN, &url);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].form_action, Some(base("https://example.com/session")));
        assert!(analyze_password_page(&url, LOGIN, &fields).is_empty());
    }

    #[test]
    fn plain_http_login_is_critical() {
        let url = base("http://example.com/login");
        let fields = find_password_fields(LOGIN, &url);
        let findings = analyze_password_page(&url, LOGIN, &fields);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding_type(), "PASSWORD_HTTP_TRANSMISSION");
        assert_eq!(findings[0].severity(), Severity::Critical);
    }

    #[test]
    fn prefilled_policyless_autocompleting_field() {
        let body = r#"<form action="http://example.com/auth"><input type="password" name="pw" value="hunter2"></form>"#;
        let url = base("https://example.com/");
        let fields = find_password_fields(body, &url);
        let findings = analyze_password_page(&url, body, &fields);
        let codes: Vec<&str> = findings.iter().map(Finding::finding_type).collect();
        assert_eq!(
            codes,
            vec![
                "PASSWORD_HTTP_TRANSMISSION",
                "PASSWORD_PREFILLED",
                "PASSWORD_NO_POLICY",
                "PASSWORD_AUTOCOMPLETE",
            ]
        );
        assert!(findings.iter().all(|f| !f.description().contains("hunter2")));
        // 30 + 20 + 10 + 5
        assert_eq!(deduction_score(&findings, &SeverityDeductions::STANDARD), 35);
    }

    #[test]
    fn pages_without_password_fields_have_no_findings() {
        let url = base("http://example.com/");
        assert!(analyze_password_page(&url, "<p>hello</p>", &[]).is_empty());
    }
}
