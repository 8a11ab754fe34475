// src/core/scanner/sqli_scanner.rs

use std::collections::BTreeSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use strum::Display;
use tracing::{debug, error, info, warn};

use super::http::{self, InjectionPoint, Page};
use super::ProbeContext;
use crate::config::SqliConfig;
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};

/// Backend engines recognisable from their error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DatabaseEngine {
    #[strum(serialize = "MySQL")]
    MySql,
    #[strum(serialize = "PostgreSQL")]
    PostgreSql,
    #[strum(serialize = "MSSQL")]
    MsSql,
    #[strum(serialize = "Oracle")]
    Oracle,
    #[strum(serialize = "SQLite")]
    Sqlite,
    #[strum(serialize = "MongoDB")]
    MongoDb,
}

pub type Signatures = Vec<(DatabaseEngine, Regex)>;

static SQL_ERROR_SIGNATURES: Lazy<Signatures> = Lazy::new(|| {
    [
        (DatabaseEngine::MySql, r"SQL syntax.*MySQL"),
        (DatabaseEngine::MySql, r"Warning.*mysql_"),
        (DatabaseEngine::MySql, r"MySQLSyntaxErrorException"),
        (DatabaseEngine::MySql, r"valid MySQL result"),
        (DatabaseEngine::MySql, r"check the manual that corresponds to your (MySQL|MariaDB)"),
        (DatabaseEngine::PostgreSql, r"PostgreSQL.*ERROR"),
        (DatabaseEngine::PostgreSql, r"Warning.*\Wpg_"),
        (DatabaseEngine::PostgreSql, r"valid PostgreSQL result"),
        (DatabaseEngine::PostgreSql, r"Npgsql\."),
        (DatabaseEngine::PostgreSql, r"PG::SyntaxError:"),
        (DatabaseEngine::MsSql, r"Driver.*SQL[\-_ ]*Server"),
        (DatabaseEngine::MsSql, r"OLE DB.*SQL Server"),
        (DatabaseEngine::MsSql, r"\[Microsoft\]\[ODBC SQL Server Driver\]"),
        (DatabaseEngine::MsSql, r"\[Macromedia\]\[SQLServer JDBC Driver\]"),
        (DatabaseEngine::MsSql, r"\[SqlException"),
        (DatabaseEngine::MsSql, r"Unclosed quotation mark after the character string"),
        (DatabaseEngine::Oracle, r"\bORA-[0-9]{5}"),
        (DatabaseEngine::Oracle, r"Oracle error"),
        (DatabaseEngine::Oracle, r"Oracle.*Driver"),
        (DatabaseEngine::Oracle, r"Warning.*\W(oci|ora)_"),
        (DatabaseEngine::Sqlite, r"SQLite/JDBCDriver"),
        (DatabaseEngine::Sqlite, r"SQLite\.Exception"),
        (DatabaseEngine::Sqlite, r"System\.Data\.SQLite\.SQLiteException"),
        (DatabaseEngine::Sqlite, r"Warning.*sqlite_"),
        (DatabaseEngine::Sqlite, r"\[SQLITE_ERROR\]"),
    ]
    .into_iter()
    .map(|(engine, pattern)| (engine, Regex::new(pattern).unwrap()))
    .collect()
});

/// Quote breaking, boolean tautologies and comment truncation.
const ERROR_BASED_PAYLOADS: &[&str] = &[
    "'",
    "\"",
    "1'",
    "' OR '1'='1",
    "' OR '1'='1' --",
    "' or 1=1#",
    "admin'--",
    "') or ('1'='1--",
];

/// `{n}` is replaced by the configured sleep duration in seconds.
const TIME_BASED_TEMPLATES: &[&str] = &[
    "' AND SLEEP({n})-- -",
    "1 AND SLEEP({n})",
    "' AND (SELECT * FROM (SELECT(SLEEP({n})))a)-- -",
    "'; SELECT pg_sleep({n})--",
    "' AND 1=(SELECT 1 FROM pg_sleep({n}))--",
    "'; WAITFOR DELAY '0:0:{n}'--",
];

/// Finds the first signature that matches `body` but not `baseline`, so error
/// text the page always shows is not mistaken for an injection.
pub fn first_new_signature(signatures: &Signatures, baseline: &str, body: &str) -> Option<(DatabaseEngine, String)> {
    signatures.iter().find_map(|(engine, regex)| {
        if regex.is_match(baseline) {
            return None;
        }
        regex.find(body).map(|m| (*engine, m.as_str().to_string()))
    })
}

// --- Time-based detection ---

/// One latency measurement of an injected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSample {
    Completed(Duration),
    /// The request hit the client timeout, which the sleep payload may have caused.
    TimedOut,
}

pub fn is_delayed(baseline: Duration, sample: TimingSample, threshold: Duration) -> bool {
    match sample {
        TimingSample::TimedOut => true,
        TimingSample::Completed(elapsed) => elapsed.saturating_sub(baseline) >= threshold,
    }
}

/// A time-based injection is confirmed only when at least `required` samples
/// (never fewer than two) were taken and every one of them was delayed.
pub fn timing_confirms(baseline: Duration, samples: &[TimingSample], threshold: Duration, required: usize) -> bool {
    let required = required.max(2);
    samples.len() >= required && samples.iter().all(|s| is_delayed(baseline, *s, threshold))
}

// --- Union-based detection ---

pub fn union_payloads(max_columns: usize) -> Vec<String> {
    (1..=max_columns)
        .map(|n| format!("' UNION SELECT {}-- -", vec!["NULL"; n].join(",")))
        .collect()
}

/// What a union attempt's response looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseShape {
    pub status: u16,
    pub database_error: bool,
}

impl ResponseShape {
    pub fn is_error_like(&self) -> bool {
        self.database_error || self.status >= 500
    }
}

/// Column count at which the response flipped from error-like to clean.
/// `shapes[i]` is the response to a union with `i + 1` columns.
pub fn detect_union_columns(shapes: &[ResponseShape]) -> Option<usize> {
    shapes
        .windows(2)
        .position(|w| w[0].is_error_like() && !w[1].is_error_like())
        .map(|i| i + 2)
}

// --- Probe ---

/// Probes every URL parameter and form field of the target page for error,
/// time and union based SQL injection.
pub async fn run_sqli_scan(ctx: &ProbeContext) -> ProbeResult {
    info!(target = %ctx.target, "Starting SQL injection scan.");

    let client = match http::build_client(ctx, true) {
        Ok(c) => c,
        Err(e) => return ctx.failure(ProbeKind::Sqli, e),
    };
    let page = match http::get_page(&client, ctx.target.url()).await {
        Ok(page) => page,
        Err(e) => {
            error!(error = %e, "Failed to fetch target page for SQL injection scan.");
            return ctx.failure(ProbeKind::Sqli, format!("HTTP request failed: {}", e));
        }
    };

    let points = http::injection_points(&page);
    debug!(points = points.len(), "Discovered injection points.");

    let mut findings = Vec::new();
    let mut engine: Option<DatabaseEngine> = None;
    let mut vulnerable = BTreeSet::new();

    for point in &points {
        let baseline = match point.send(&client, point.original_value()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(point = %point.identifier(), error = %e, "Baseline request failed, skipping injection point.");
                continue;
            }
        };

        let before = findings.len();
        if let Some((finding, detected)) = test_error_based(&client, point, &baseline).await {
            engine = engine.or(Some(detected));
            findings.push(finding);
        }
        if let Some(finding) = test_time_based(&client, point, &baseline, &ctx.config.sqli).await {
            findings.push(finding);
        }
        if let Some(finding) = test_union_based(&client, point, &baseline, ctx.config.sqli.max_union_columns).await {
            findings.push(finding);
        }
        if findings.len() > before {
            vulnerable.insert(point.identifier());
        }
    }

    let score = if findings.is_empty() { 100 } else { 0 };
    let summary = if points.is_empty() {
        "No injection points discovered on the target page".to_string()
    } else if findings.is_empty() {
        format!("No SQL injection detected across {} injection points", points.len())
    } else {
        format!("SQL injection confirmed at {} of {} injection points", vulnerable.len(), points.len())
    };

    info!(findings = findings.len(), "SQL injection scan finished.");
    ProbeResult::completed(ProbeKind::Sqli, score, summary, findings)
        .with_detail(
            "database_type",
            engine.map_or_else(|| "unknown".to_string(), |e| e.to_string()),
        )
        .with_detail("injection_points", vulnerable.into_iter().collect::<Vec<_>>())
        .with_detail("points_tested", points.len())
}

async fn test_error_based(client: &Client, point: &InjectionPoint, baseline: &Page) -> Option<(Finding, DatabaseEngine)> {
    for payload in ERROR_BASED_PAYLOADS {
        let response = match point.send(client, payload).await {
            Ok(page) => page,
            Err(e) => {
                debug!(point = %point.identifier(), error = %e, "Error-based payload request failed.");
                continue;
            }
        };
        if let Some((engine, matched)) = first_new_signature(&SQL_ERROR_SIGNATURES, &baseline.body, &response.body) {
            debug!(point = %point.identifier(), %engine, "Database error signature matched.");
            let finding = Finding::new(
                "SQLI_ERROR_BASED",
                Severity::Critical,
                point.location(),
                format!(
                    "Parameter '{}' triggers a {} error when injected with SQL syntax",
                    point.parameter(),
                    engine
                ),
            )
            .with_evidence(format!("payload {:?} produced: {}", payload, http::excerpt(&matched, 120)));
            return Some((finding, engine));
        }
    }
    None
}

async fn test_time_based(
    client: &Client,
    point: &InjectionPoint,
    baseline: &Page,
    config: &SqliConfig,
) -> Option<Finding> {
    let threshold = Duration::from_secs_f64(config.time_threshold_secs);
    let required = config.time_samples.max(2);

    for template in TIME_BASED_TEMPLATES {
        let payload = template.replace("{n}", &config.sleep_seconds.to_string());
        let mut samples = Vec::with_capacity(required);

        while samples.len() < required {
            let sample = match point.send(client, &payload).await {
                Ok(page) => TimingSample::Completed(page.elapsed),
                Err(e) if e.is_timeout() => TimingSample::TimedOut,
                Err(e) => {
                    debug!(point = %point.identifier(), error = %e, "Time-based payload request failed.");
                    break;
                }
            };
            let delayed = is_delayed(baseline.elapsed, sample, threshold);
            samples.push(sample);
            if !delayed {
                break;
            }
        }

        if timing_confirms(baseline.elapsed, &samples, threshold, required) {
            debug!(point = %point.identifier(), ?samples, "Consistent delay observed.");
            return Some(
                Finding::new(
                    "SQLI_TIME_BASED",
                    Severity::Critical,
                    point.location(),
                    format!(
                        "Parameter '{}' delays the response by at least {:.1}s when injected with a sleep payload",
                        point.parameter(),
                        threshold.as_secs_f64()
                    ),
                )
                .with_evidence(format!(
                    "payload {:?}: baseline {}ms, {} consecutive delayed samples",
                    payload,
                    baseline.elapsed.as_millis(),
                    samples.len()
                )),
            );
        }
    }
    None
}

async fn test_union_based(
    client: &Client,
    point: &InjectionPoint,
    baseline: &Page,
    max_columns: usize,
) -> Option<Finding> {
    let mut shapes = Vec::with_capacity(max_columns);
    for payload in union_payloads(max_columns) {
        let response = match point.send(client, &payload).await {
            Ok(page) => page,
            Err(e) => {
                debug!(point = %point.identifier(), error = %e, "Union payload request failed.");
                return None;
            }
        };
        let database_error = first_new_signature(&SQL_ERROR_SIGNATURES, &baseline.body, &response.body).is_some();
        shapes.push(ResponseShape {
            status: response.status.as_u16(),
            database_error,
        });
        if let Some(columns) = detect_union_columns(&shapes) {
            return Some(
                Finding::new(
                    "SQLI_UNION_BASED",
                    Severity::Critical,
                    point.location(),
                    format!(
                        "Parameter '{}' accepts a UNION SELECT with {} columns",
                        point.parameter(),
                        columns
                    ),
                )
                .with_evidence(payload),
            );
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::core::scanner::fixture::{serve, Reply};
    use crate::core::target::ScanTarget;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use url::Url;

    fn ms(millis: u64) -> TimingSample {
        TimingSample::Completed(Duration::from_millis(millis))
    }

    const THRESHOLD: Duration = Duration::from_secs(4);
    const BASELINE: Duration = Duration::from_millis(200);

    #[test]
    fn two_consistent_delays_confirm() {
        assert!(timing_confirms(BASELINE, &[ms(4200), ms(4200)], THRESHOLD, 2));
    }

    #[test]
    fn a_single_noisy_sample_never_confirms() {
        assert!(!timing_confirms(BASELINE, &[ms(4200)], THRESHOLD, 2));
        assert!(!timing_confirms(BASELINE, &[ms(4200), ms(300)], THRESHOLD, 2));
        // Even if the caller asks for one sample, two are required.
        assert!(!timing_confirms(BASELINE, &[ms(4200)], THRESHOLD, 1));
    }

    #[test]
    fn timeouts_count_as_delays() {
        assert!(timing_confirms(BASELINE, &[TimingSample::TimedOut, ms(5100)], THRESHOLD, 2));
    }

    #[test]
    fn delay_is_measured_against_the_baseline() {
        let slow_baseline = Duration::from_millis(3000);
        assert!(!is_delayed(slow_baseline, ms(6000), THRESHOLD));
        assert!(is_delayed(slow_baseline, ms(7000), THRESHOLD));
    }

    #[test]
    fn fingerprints_engines_from_error_text() {
        let cases = [
            ("You have an error in your SQL syntax; check the manual that corresponds to your MySQL server", DatabaseEngine::MySql),
            ("PostgreSQL query failed: ERROR:  syntax error at or near", DatabaseEngine::PostgreSql),
            ("Unclosed quotation mark after the character string ''.", DatabaseEngine::MsSql),
            ("ORA-01756: quoted string not properly terminated", DatabaseEngine::Oracle),
            ("[SQLITE_ERROR] SQL error or missing database", DatabaseEngine::Sqlite),
        ];
        for (body, expected) in cases {
            let (engine, _) = first_new_signature(&SQL_ERROR_SIGNATURES, "<html>ok</html>", body).unwrap();
            assert_eq!(engine, expected, "{body}");
        }
    }

    #[test]
    fn signatures_already_on_the_baseline_are_ignored() {
        let baseline = "<p>Tutorial: fixing ORA-00933 errors</p>";
        assert!(first_new_signature(&SQL_ERROR_SIGNATURES, baseline, baseline).is_none());
    }

    #[test]
    fn union_payloads_grow_one_column_at_a_time() {
        let payloads = union_payloads(3);
        assert_eq!(payloads[0], "' UNION SELECT NULL-- -");
        assert_eq!(payloads[2], "' UNION SELECT NULL,NULL,NULL-- -");
    }

    fn context(url: Url, config: ScanConfig) -> ProbeContext {
        ProbeContext::new(
            ScanTarget::from_validated(url, vec!["127.0.0.1".parse().unwrap()]),
            Arc::new(config),
            Vec::new(),
        )
    }

    /// Config whose timing threshold suits a loopback server.
    fn fast_timing() -> ScanConfig {
        let mut config = ScanConfig::default();
        config.sqli.time_threshold_secs = 0.3;
        config
    }

    #[tokio::test]
    async fn mysql_error_on_a_quote_is_critical_and_fingerprinted() {
        let base = serve(|req| {
            let id = req.param("id").unwrap_or_default();
            if id.contains('\'') {
                Reply::status(
                    500,
                    "You have an error in your SQL syntax; check the manual that corresponds to your MySQL server version",
                )
            } else {
                Reply::ok(format!("<html><body>item {id}</body></html>"))
            }
        })
        .await;

        let result = run_sqli_scan(&context(base.join("/item?id=1").unwrap(), ScanConfig::default())).await;

        assert_eq!(result.error(), None);
        let codes: Vec<&str> = result.findings().iter().map(Finding::finding_type).collect();
        assert_eq!(codes, vec!["SQLI_ERROR_BASED"]);
        assert_eq!(result.score(), 0);
        assert_eq!(result.risk_level(), Severity::Critical);
        assert_eq!(result.details()["database_type"], json!("MySQL"));
        assert_eq!(result.details()["injection_points"], json!(["url_parameter:id"]));
    }

    #[tokio::test]
    async fn one_slow_sleep_response_followed_by_a_fast_one_is_not_flagged() {
        let sleeps = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&sleeps);
        let base = serve(move |req| {
            let id = req.param("id").unwrap_or_default();
            let reply = Reply::ok("<html><body>item</body></html>");
            if id.contains("SLEEP(") && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                reply.delayed(Duration::from_millis(600))
            } else {
                reply
            }
        })
        .await;

        let result = run_sqli_scan(&context(base.join("/item?id=1").unwrap(), fast_timing())).await;

        assert_eq!(result.error(), None);
        assert!(result.findings().is_empty(), "{:?}", result.findings());
        assert_eq!(result.score(), 100);
        assert_eq!(result.details()["database_type"], json!("unknown"));
        assert_eq!(result.details()["injection_points"], json!([]));
        assert!(sleeps.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn consistently_slow_sleep_responses_are_flagged() {
        let base = serve(|req| {
            let reply = Reply::ok("<html><body>item</body></html>");
            if req.param("id").unwrap_or_default().contains("SLEEP(") {
                reply.delayed(Duration::from_millis(600))
            } else {
                reply
            }
        })
        .await;

        let result = run_sqli_scan(&context(base.join("/item?id=1").unwrap(), fast_timing())).await;

        let codes: Vec<&str> = result.findings().iter().map(Finding::finding_type).collect();
        assert_eq!(codes, vec!["SQLI_TIME_BASED"]);
        assert_eq!(result.score(), 0);
        assert_eq!(result.details()["injection_points"], json!(["url_parameter:id"]));
    }

    #[test]
    fn union_column_count_is_the_first_clean_response_after_errors() {
        let err = ResponseShape { status: 500, database_error: false };
        let db_err = ResponseShape { status: 200, database_error: true };
        let clean = ResponseShape { status: 200, database_error: false };

        assert_eq!(detect_union_columns(&[err, db_err, clean]), Some(3));
        assert_eq!(detect_union_columns(&[clean, clean, clean]), None);
        assert_eq!(detect_union_columns(&[err, err, err]), None);
    }
}
