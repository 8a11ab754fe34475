// src/core/scanner/xss_scanner.rs

use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use strum::Display;
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

use super::http;
use super::ProbeContext;
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};

static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static ANY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());

/// Attributes a browser treats as navigable URLs.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction"];

/// Attacker-influenced values readable from client-side script.
const DOM_SOURCES: &[&str] = &[
    "location.hash",
    "location.search",
    "location.href",
    "document.URL",
    "document.documentURI",
    "document.baseURI",
    "document.referrer",
    "window.name",
];

/// Calls and properties that turn strings into markup or code.
const DOM_SINKS: &[&str] = &[
    "innerHTML",
    "outerHTML",
    "insertAdjacentHTML",
    "document.write",
    "eval(",
    "setTimeout(",
    "setInterval(",
    "new Function(",
    ".html(",
];

/// How far before a sink to look for a source when they are not in the same
/// statement.
const PROXIMITY_WINDOW: usize = 200;

/// Linked scripts inspected per scan.
const MAX_LINKED_SCRIPTS: usize = 5;

/// Payload wrappers around the per-attempt marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PayloadShape {
    ScriptTag,
    EventHandler,
    AttributeBreakout,
    JavascriptUri,
    ScriptBreakout,
}

impl PayloadShape {
    pub const ALL: [PayloadShape; 5] = [
        PayloadShape::ScriptTag,
        PayloadShape::EventHandler,
        PayloadShape::AttributeBreakout,
        PayloadShape::JavascriptUri,
        PayloadShape::ScriptBreakout,
    ];

    pub fn render(self, marker: &str) -> String {
        match self {
            PayloadShape::ScriptTag => format!("<script>alert('{marker}')</script>"),
            PayloadShape::EventHandler => format!("<img src=x onerror=alert('{marker}')>"),
            PayloadShape::AttributeBreakout => format!("\" onmouseover=\"alert('{marker}')\" x=\""),
            PayloadShape::JavascriptUri => format!("javascript:alert('{marker}')"),
            PayloadShape::ScriptBreakout => format!("';alert('{marker}');//"),
        }
    }
}

/// Where a confirmed reflection landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReflectionContext {
    HtmlBody,
    Attribute,
    Script,
}

/// A fresh marker per attempt, so static page content can never match.
pub fn new_marker() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("rmp{}", &id[..12])
}

/// Decides whether `body` executes the payload built from `shape` and `marker`.
///
/// The payload must appear verbatim (an escaped reflection is not a finding)
/// and the parsed document must place the marker in an executable position
/// for that shape.
pub fn classify_reflection(body: &str, shape: PayloadShape, marker: &str) -> Option<ReflectionContext> {
    let payload = shape.render(marker);
    if !body.contains(&payload) {
        return None;
    }

    let call = format!("alert('{marker}')");
    let document = Html::parse_document(body);

    let script_texts = || {
        document
            .select(&SCRIPT_SELECTOR)
            .filter(|s| s.value().attr("src").is_none())
            .map(|s| s.text().collect::<String>())
    };

    match shape {
        PayloadShape::ScriptTag => script_texts()
            .any(|text| text.trim() == call)
            .then_some(ReflectionContext::HtmlBody),
        PayloadShape::EventHandler => document
            .select(&ANY_SELECTOR)
            .any(|el| el.value().attr("onerror").is_some_and(|v| v.contains(&call)))
            .then_some(ReflectionContext::HtmlBody),
        PayloadShape::AttributeBreakout => document
            .select(&ANY_SELECTOR)
            .any(|el| {
                el.value()
                    .attrs()
                    .any(|(name, value)| name.starts_with("on") && value.contains(&call))
            })
            .then_some(ReflectionContext::Attribute),
        PayloadShape::JavascriptUri => document
            .select(&ANY_SELECTOR)
            .any(|el| {
                URL_ATTRIBUTES.iter().any(|attr| {
                    el.value().attr(attr).is_some_and(|v| {
                        v.trim_start().to_ascii_lowercase().starts_with("javascript:") && v.contains(&call)
                    })
                })
            })
            .then_some(ReflectionContext::Attribute),
        PayloadShape::ScriptBreakout => script_texts()
            .any(|text| {
                text.match_indices(&payload)
                    .any(|(pos, _)| open_quote_at(&text[..pos]) == Some('\''))
            })
            .then_some(ReflectionContext::Script),
    }
}

/// The quote of the JavaScript string literal still open at the end of
/// `prefix`, if any. Comments and backslash escapes are honoured; regex
/// literals are not.
fn open_quote_at(prefix: &str) -> Option<char> {
    let mut chars = prefix.chars().peekable();
    let mut open: Option<char> = None;
    while let Some(c) = chars.next() {
        match open {
            Some(_) if c == '\\' => {
                chars.next();
            }
            Some(quote) if c == quote => open = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => open = Some(c),
                '/' if chars.peek() == Some(&'/') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut star = false;
                    for c in chars.by_ref() {
                        if star && c == '/' {
                            break;
                        }
                        star = c == '*';
                    }
                }
                _ => {}
            },
        }
    }
    open
}

fn preceding(text: &str, end: usize, max: usize) -> &str {
    let mut start = end.saturating_sub(max);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..end]
}

/// Static source-to-sink heuristics over one script body.
///
/// A source flowing into a sink within one statement is HIGH; a sink with a
/// source shortly before it is MEDIUM. Each sink is reported once per script.
pub fn analyze_dom_script(script: &str, location: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut reported: HashSet<&str> = HashSet::new();

    for statement in script.split([';', '\n']) {
        for &sink in DOM_SINKS {
            let Some(pos) = statement.find(sink) else { continue };
            let tail = &statement[pos..];
            if let Some(source) = DOM_SOURCES.iter().find(|s| tail.contains(*s)) {
                if reported.insert(sink) {
                    findings.push(
                        Finding::new(
                            "DOM_XSS_SOURCE_TO_SINK",
                            Severity::High,
                            location,
                            format!("{source} flows directly into {}", sink.trim_matches(['(', '.'])),
                        )
                        .with_evidence(http::excerpt(statement, 160)),
                    );
                }
            }
        }
    }

    for &sink in DOM_SINKS {
        if reported.contains(sink) {
            continue;
        }
        for (pos, _) in script.match_indices(sink) {
            let window = preceding(script, pos, PROXIMITY_WINDOW);
            if let Some(source) = DOM_SOURCES.iter().find(|s| window.contains(*s)) {
                reported.insert(sink);
                findings.push(
                    Finding::new(
                        "DOM_XSS_PROXIMITY",
                        Severity::Medium,
                        location,
                        format!("{source} is read shortly before {}", sink.trim_matches(['(', '.'])),
                    )
                    .with_evidence(http::excerpt(window, 160)),
                );
                break;
            }
        }
    }

    findings
}

/// Inline script bodies and same-origin script URLs on a page.
fn collect_scripts(body: &str, base: &Url) -> (Vec<String>, Vec<Url>) {
    let document = Html::parse_document(body);
    let mut inline = Vec::new();
    let mut linked = Vec::new();
    for script in document.select(&SCRIPT_SELECTOR) {
        match script.value().attr("src") {
            Some(src) => {
                if let Ok(url) = base.join(src.trim()) {
                    if url.origin() == base.origin() && !linked.contains(&url) {
                        linked.push(url);
                    }
                }
            }
            None => {
                let text: String = script.text().collect();
                if !text.trim().is_empty() {
                    inline.push(text);
                }
            }
        }
    }
    linked.truncate(MAX_LINKED_SCRIPTS);
    (inline, linked)
}

/// `max(0, 100 - 30 * high_or_critical - 10 * medium)`.
pub fn xss_score(findings: &[Finding]) -> u8 {
    let severe = findings.iter().filter(|f| f.severity() >= Severity::High).count() as i64;
    let medium = findings.iter().filter(|f| f.severity() == Severity::Medium).count() as i64;
    (100 - 30 * severe - 10 * medium).clamp(0, 100) as u8
}

pub async fn run_xss_scan(ctx: &ProbeContext) -> ProbeResult {
    info!(target = %ctx.target, "Starting XSS scan.");

    let client = match http::build_client(ctx, true) {
        Ok(c) => c,
        Err(e) => return ctx.failure(ProbeKind::Xss, e),
    };
    let page = match http::get_page(&client, ctx.target.url()).await {
        Ok(page) => page,
        Err(e) => {
            error!(error = %e, "Failed to fetch target page for XSS scan.");
            return ctx.failure(ProbeKind::Xss, format!("HTTP request failed: {}", e));
        }
    };

    let points = http::injection_points(&page);
    let mut findings = Vec::new();
    let mut reflections = Vec::new();

    for point in &points {
        for shape in PayloadShape::ALL {
            let marker = new_marker();
            let payload = shape.render(&marker);
            let response = match point.send(&client, &payload).await {
                Ok(page) => page,
                Err(e) => {
                    debug!(point = %point.identifier(), error = %e, "XSS payload request failed.");
                    continue;
                }
            };
            if let Some(context) = classify_reflection(&response.body, shape, &marker) {
                debug!(point = %point.identifier(), %shape, %context, "Executable reflection confirmed.");
                findings.push(
                    Finding::new(
                        "XSS_REFLECTED",
                        Severity::High,
                        point.location(),
                        format!(
                            "Parameter '{}' is reflected unescaped in {} context",
                            point.parameter(),
                            context
                        ),
                    )
                    .with_evidence(payload),
                );
                reflections.push(format!("{}:{}", point.identifier(), context));
                break;
            }
        }
    }

    let (inline, linked) = collect_scripts(&page.body, &page.url);
    let inline_location = format!("inline_script:{}", page.url.path());
    for script in &inline {
        findings.extend(analyze_dom_script(script, &inline_location));
    }
    for script_url in &linked {
        match http::get_page(&client, script_url).await {
            Ok(script) if script.status.is_success() => {
                findings.extend(analyze_dom_script(&script.body, &format!("script:{}", script_url.path())));
            }
            Ok(script) => debug!(url = %script_url, status = %script.status, "Skipping linked script."),
            Err(e) => debug!(url = %script_url, error = %e, "Failed to fetch linked script."),
        }
    }

    let score = xss_score(&findings);
    let summary = if findings.is_empty() {
        format!(
            "No XSS detected across {} injection points and {} scripts",
            points.len(),
            inline.len() + linked.len()
        )
    } else {
        format!(
            "{} reflected and {} DOM-based XSS signals",
            reflections.len(),
            findings.len() - reflections.len()
        )
    };

    info!(findings = findings.len(), "XSS scan finished.");
    ProbeResult::completed(ProbeKind::Xss, score, summary, findings)
        .with_detail("reflections", reflections)
        .with_detail("scripts_analyzed", inline.len() + linked.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::core::scanner::fixture::{serve, Reply};
    use crate::core::target::ScanTarget;
    use serde_json::json;
    use std::sync::Arc;

    fn reflect(shape: PayloadShape, marker: &str, wrap: impl Fn(&str) -> String) -> Option<ReflectionContext> {
        let body = wrap(&shape.render(marker));
        classify_reflection(&body, shape, marker)
    }

    #[test]
    fn markers_are_unique() {
        assert_ne!(new_marker(), new_marker());
        assert!(new_marker().starts_with("rmp"));
    }

    #[test]
    fn raw_script_tag_in_body_is_html_context() {
        let ctx = reflect(PayloadShape::ScriptTag, "rmpabc", |p| format!("<p>Results for {p}</p>"));
        assert_eq!(ctx, Some(ReflectionContext::HtmlBody));
    }

    #[test]
    fn escaped_reflection_is_not_a_finding() {
        let marker = "rmpabc";
        let payload = PayloadShape::ScriptTag.render(marker);
        let escaped = payload.replace('<', "&lt;").replace('>', "&gt;");
        let body = format!("<p>Results for {escaped}</p>");
        assert_eq!(classify_reflection(&body, PayloadShape::ScriptTag, marker), None);
    }

    #[test]
    fn event_handler_tag_is_html_context() {
        let ctx = reflect(PayloadShape::EventHandler, "rmpdef", |p| format!("<div>{p}</div>"));
        assert_eq!(ctx, Some(ReflectionContext::HtmlBody));
    }

    #[test]
    fn attribute_breakout_is_attribute_context() {
        let ctx = reflect(PayloadShape::AttributeBreakout, "rmpghi", |p| {
            format!(r#"<input name="q" value="{p}">"#)
        });
        assert_eq!(ctx, Some(ReflectionContext::Attribute));
    }

    #[test]
    fn attribute_breakout_in_text_is_harmless() {
        let ctx = reflect(PayloadShape::AttributeBreakout, "rmpghi", |p| format!("<p>{p}</p>"));
        assert_eq!(ctx, None);
    }

    #[test]
    fn javascript_uri_in_href_is_attribute_context() {
        let ctx = reflect(PayloadShape::JavascriptUri, "rmpjkl", |p| format!(r#"<a href="{p}">back</a>"#));
        assert_eq!(ctx, Some(ReflectionContext::Attribute));
    }

    #[test]
    fn script_breakout_is_script_context() {
        let ctx = reflect(PayloadShape::ScriptBreakout, "rmpmno", |p| {
            format!("<script>var q = '{p}';</script>")
        });
        assert_eq!(ctx, Some(ReflectionContext::Script));
    }

    #[test]
    fn script_breakout_inside_double_quoted_json_is_inert() {
        let body = r#"<script>var state = {"q": "';alert('rmpabc123');//"};</script>"#;
        assert_eq!(classify_reflection(body, PayloadShape::ScriptBreakout, "rmpabc123"), None);
    }

    #[test]
    fn script_breakout_outside_any_string_is_inert() {
        let ctx = reflect(PayloadShape::ScriptBreakout, "rmppqr", |p| format!("<script>var q = {p};</script>"));
        assert_eq!(ctx, None);
    }

    #[test]
    fn quote_tracking_skips_escapes_and_comments() {
        assert_eq!(open_quote_at(r#"var a = "it's"; var b = '"#), Some('\''));
        assert_eq!(open_quote_at(r"var a = 'don\'t"), Some('\''));
        assert_eq!(open_quote_at("// it's a comment\nvar q = "), None);
        assert_eq!(open_quote_at("/* it's */ var q = \""), Some('"'));
    }

    #[test]
    fn static_content_without_the_marker_never_matches() {
        let body = "<script>alert('XSS')</script>";
        assert_eq!(classify_reflection(body, PayloadShape::ScriptTag, "rmpzzz"), None);
    }

    #[test]
    fn direct_source_to_sink_is_high() {
        let findings = analyze_dom_script("el.innerHTML = location.hash.slice(1);", "inline_script:/");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding_type(), "DOM_XSS_SOURCE_TO_SINK");
        assert_eq!(findings[0].severity(), Severity::High);
    }

    #[test]
    fn nearby_source_is_medium() {
        let script = "var q = location.search;\nvar out = document.getElementById('o');\nout.innerHTML = q;";
        let findings = analyze_dom_script(script, "script:/app.js");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding_type(), "DOM_XSS_PROXIMITY");
        assert_eq!(findings[0].severity(), Severity::Medium);
    }

    #[test]
    fn sinks_without_sources_are_ignored() {
        let findings = analyze_dom_script("el.innerHTML = '<b>static</b>';", "inline_script:/");
        assert!(findings.is_empty());
    }

    #[test]
    fn collects_inline_and_same_origin_scripts() {
        let base = Url::parse("https://example.com/page").unwrap();
        let body = r#"<script>var a = 1;</script>
            <script src="/static/app.js"></script>
            <script src="https://cdn.other.net/lib.js"></script>"#;
        let (inline, linked) = collect_scripts(body, &base);
        assert_eq!(inline.len(), 1);
        assert_eq!(linked, vec![Url::parse("https://example.com/static/app.js").unwrap()]);
    }

    #[tokio::test]
    async fn raw_reflection_of_a_parameter_is_reported() {
        let base = serve(|req| {
            let q = req.param("q").unwrap_or_default();
            Reply::ok(format!("<html><body><p>Results for {q}</p></body></html>"))
        })
        .await;
        let url = base.join("/search?q=shoes").unwrap();
        let ctx = ProbeContext::new(
            ScanTarget::from_validated(url, vec!["127.0.0.1".parse().unwrap()]),
            Arc::new(ScanConfig::default()),
            Vec::new(),
        );

        let result = run_xss_scan(&ctx).await;

        assert_eq!(result.error(), None);
        let codes: Vec<&str> = result.findings().iter().map(Finding::finding_type).collect();
        assert_eq!(codes, vec!["XSS_REFLECTED"]);
        assert_eq!(result.findings()[0].location(), "url_parameter:q");
        assert_eq!(result.score(), 70);
        assert_eq!(result.details()["reflections"], json!(["url_parameter:q:html_body"]));
    }

    #[tokio::test]
    async fn escaped_reflection_scans_clean() {
        let base = serve(|req| {
            let q = req.param("q").unwrap_or_default().replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;");
            Reply::ok(format!("<html><body><p>Results for {q}</p></body></html>"))
        })
        .await;
        let url = base.join("/search?q=shoes").unwrap();
        let ctx = ProbeContext::new(
            ScanTarget::from_validated(url, vec!["127.0.0.1".parse().unwrap()]),
            Arc::new(ScanConfig::default()),
            Vec::new(),
        );

        let result = run_xss_scan(&ctx).await;
        assert!(result.findings().is_empty(), "{:?}", result.findings());
        assert_eq!(result.score(), 100);
        assert_eq!(result.details()["reflections"], json!([]));
    }

    #[test]
    fn score_penalizes_by_severity() {
        let f = |s| Finding::new("X", s, "here", "test");
        assert_eq!(xss_score(&[]), 100);
        assert_eq!(xss_score(&[f(Severity::High), f(Severity::Medium)]), 60);
        assert_eq!(xss_score(&vec![f(Severity::High); 4]), 0);
    }
}
