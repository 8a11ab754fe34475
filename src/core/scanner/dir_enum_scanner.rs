// src/core/scanner/dir_enum_scanner.rs

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::http;
use super::ProbeContext;
use crate::config::{DirEnumConfig, SoftNotFoundStrategy};
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    CriticalFile,
    AdminPanel,
    Directory,
}

impl EntryKind {
    fn code(self) -> &'static str {
        match self {
            EntryKind::CriticalFile => "DIRENUM_SENSITIVE_FILE",
            EntryKind::AdminPanel => "DIRENUM_ADMIN_PANEL",
            EntryKind::Directory => "DIRENUM_DIRECTORY",
        }
    }

    fn label(self) -> &'static str {
        match self {
            EntryKind::CriticalFile => "Sensitive file",
            EntryKind::AdminPanel => "Admin panel",
            EntryKind::Directory => "Directory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordlistEntry {
    /// Path relative to the site root, without a leading slash.
    pub path: &'static str,
    pub kind: EntryKind,
    pub severity: Severity,
}

const fn file(path: &'static str, severity: Severity) -> WordlistEntry {
    WordlistEntry {
        path,
        kind: EntryKind::CriticalFile,
        severity,
    }
}

const fn admin(path: &'static str) -> WordlistEntry {
    WordlistEntry {
        path,
        kind: EntryKind::AdminPanel,
        severity: Severity::High,
    }
}

const fn dir(path: &'static str) -> WordlistEntry {
    WordlistEntry {
        path,
        kind: EntryKind::Directory,
        severity: Severity::Medium,
    }
}

pub static WORDLIST: &[WordlistEntry] = &[
    // Version control
    file(".git/HEAD", Severity::Critical),
    file(".git/config", Severity::Critical),
    file(".svn/entries", Severity::Critical),
    file(".hg/requires", Severity::Critical),
    file(".gitignore", Severity::Low),
    // Environment and configuration
    file(".env", Severity::Critical),
    file(".env.local", Severity::Critical),
    file(".env.production", Severity::Critical),
    file(".env.backup", Severity::Critical),
    file("config.php", Severity::Critical),
    file("configuration.php", Severity::Critical),
    file("wp-config.php", Severity::Critical),
    file("wp-config.php.bak", Severity::Critical),
    file("settings.php", Severity::Critical),
    file("db.php", Severity::Critical),
    file("database.yml", Severity::Critical),
    file("config.json", Severity::Critical),
    file("config.xml", Severity::Critical),
    file("web.config", Severity::Critical),
    file("app.config", Severity::High),
    file(".htpasswd", Severity::Critical),
    file(".htaccess", Severity::Medium),
    // Backups and dumps
    file("backup.sql", Severity::Critical),
    file("database.sql", Severity::Critical),
    file("dump.sql", Severity::Critical),
    file("backup.zip", Severity::High),
    file("backup.tar.gz", Severity::High),
    file("backup.bak", Severity::High),
    file("site.tar.gz", Severity::High),
    file("www.zip", Severity::High),
    // Database files
    file("database.db", Severity::Critical),
    file("db.sqlite", Severity::Critical),
    file("data.db", Severity::Critical),
    // Logs
    file("error.log", Severity::High),
    file("access.log", Severity::High),
    file("debug.log", Severity::High),
    file("application.log", Severity::High),
    file("error_log", Severity::High),
    // Development leftovers
    file("phpinfo.php", Severity::High),
    file("info.php", Severity::High),
    file("test.php", Severity::Medium),
    file("composer.json", Severity::Medium),
    file("package.json", Severity::Medium),
    file("package-lock.json", Severity::Medium),
    file("yarn.lock", Severity::Medium),
    file("Gemfile", Severity::Medium),
    file("requirements.txt", Severity::Medium),
    file("swagger.json", Severity::Medium),
    file("swagger.yaml", Severity::Medium),
    file("openapi.json", Severity::Medium),
    file("api-docs.json", Severity::Medium),
    // System and documentation files
    file(".DS_Store", Severity::Medium),
    file("Thumbs.db", Severity::Low),
    file("desktop.ini", Severity::Low),
    file("README.md", Severity::Low),
    file("CHANGELOG.md", Severity::Low),
    file("TODO.txt", Severity::Low),
    file("notes.txt", Severity::Low),
    // Admin panels
    admin("admin/"),
    admin("administrator/"),
    admin("admin.php"),
    admin("admin/login"),
    admin("admin-login"),
    admin("user/admin"),
    admin("wp-admin"),
    admin("phpmyadmin"),
    admin("pma"),
    admin("cpanel"),
    admin("plesk"),
    admin("webmail"),
    admin("panel"),
    admin("dashboard"),
    admin("console"),
    admin("manager/html"),
    admin("backend"),
    admin("controlpanel"),
    admin("adminpanel"),
    // Common directories
    dir("backup/"),
    dir("backups/"),
    dir("old/"),
    dir("temp/"),
    dir("tmp/"),
    dir("cache/"),
    dir("logs/"),
    dir("log/"),
    dir("test/"),
    dir("tests/"),
    dir("dev/"),
    dir("staging/"),
    dir("beta/"),
    dir("demo/"),
    dir("private/"),
    dir("secret/"),
    dir("internal/"),
    dir("uploads/"),
    dir("includes/"),
    dir("data/"),
    dir("sql/"),
];

// --- Soft-404 detection ---

fn normalize_body(body: &str, requested_path: &str) -> String {
    let lowered = body.to_lowercase();
    let path = requested_path.to_lowercase();
    if path.is_empty() {
        lowered
    } else {
        lowered.replace(&path, "")
    }
}

fn tokens(text: &str) -> HashSet<&str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect()
}

/// Token-set Jaccard similarity in `[0, 1]`.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (tokens(a), tokens(b));
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    shared / union
}

/// What the site answers for a path that cannot exist.
#[derive(Debug, Clone)]
pub struct NotFoundFingerprint {
    status: StatusCode,
    body: String,
}

impl NotFoundFingerprint {
    pub fn new(status: StatusCode, body: &str, requested_path: &str) -> Self {
        Self {
            status,
            body: normalize_body(body, requested_path),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether a response for `requested_path` is indistinguishable from the
    /// baseline under `strategy`.
    pub fn matches(&self, status: StatusCode, body: &str, requested_path: &str, strategy: SoftNotFoundStrategy) -> bool {
        if status != self.status {
            return false;
        }
        match strategy {
            SoftNotFoundStrategy::StatusOnly => true,
            SoftNotFoundStrategy::ExactBody => normalize_body(body, requested_path) == self.body,
            SoftNotFoundStrategy::Similarity { threshold } => {
                jaccard_similarity(&normalize_body(body, requested_path), &self.body) >= threshold
            }
        }
    }
}

/// Requests a random path and records the response as the not-found baseline.
pub async fn capture_fingerprint(client: &Client, base: &Url) -> Result<NotFoundFingerprint, String> {
    let probe = format!("rampart-{}", Uuid::new_v4().simple());
    let url = base.join(&probe).map_err(|e| format!("Invalid baseline URL: {}", e))?;
    let page = http::get_page(client, &url).await.map_err(|e| {
        warn!(error = %e, "Soft-404 baseline request failed.");
        format!("Baseline request failed: {}", e)
    })?;
    debug!(status = %page.status, "Captured not-found fingerprint.");
    Ok(NotFoundFingerprint::new(page.status, &page.body, url.path()))
}

// --- Enumeration ---

fn is_directory_redirect(entry: &WordlistEntry, requested: &Url, status: StatusCode, location: Option<&str>) -> bool {
    if !status.is_redirection() || entry.kind == EntryKind::CriticalFile || entry.path.ends_with('/') {
        return false;
    }
    location
        .and_then(|loc| requested.join(loc).ok())
        .is_some_and(|target| target.path() == format!("{}/", requested.path()))
}

fn head_is_inconclusive(status: StatusCode) -> bool {
    !(status.is_success()
        || status.is_redirection()
        || matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::GONE
        ))
}

async fn check_entry(
    client: &Client,
    base: &Url,
    entry: &WordlistEntry,
    fingerprint: &NotFoundFingerprint,
    strategy: SoftNotFoundStrategy,
) -> Option<Finding> {
    let url = base.join(entry.path).ok()?;

    let head = client.head(url.clone()).send().await;
    let (status, location) = match &head {
        Ok(response) => (
            Some(response.status()),
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        ),
        Err(e) => {
            debug!(path = entry.path, error = %e, "HEAD failed, falling back to GET.");
            (None, None)
        }
    };

    let needs_get = match status {
        None => true,
        Some(s) if head_is_inconclusive(s) => true,
        Some(s) => s.is_success() && s == fingerprint.status() && strategy != SoftNotFoundStrategy::StatusOnly,
    };

    let present = if needs_get {
        let response = client.get(url.clone()).send().await.ok()?;
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        if is_directory_redirect(entry, &url, status, location.as_deref()) {
            Some(status)
        } else if status.is_success() && !fingerprint.matches(status, &body, url.path(), strategy) {
            Some(status)
        } else {
            None
        }
    } else {
        let status = status?;
        if is_directory_redirect(entry, &url, status, location.as_deref()) {
            Some(status)
        } else if status.is_success() && !fingerprint.matches(status, "", url.path(), strategy) {
            Some(status)
        } else {
            None
        }
    }?;

    debug!(path = entry.path, status = %present, "Entry present.");
    Some(
        Finding::new(
            entry.kind.code(),
            entry.severity,
            url.path(),
            format!("{} accessible at /{}", entry.kind.label(), entry.path),
        )
        .with_evidence(format!("HTTP {}", present.as_u16())),
    )
}

/// Probes every wordlist entry under `base` with at most `config.concurrency`
/// requests in flight. Findings come back in wordlist order.
pub async fn enumerate(client: &Client, base: &Url, config: &DirEnumConfig) -> Result<Vec<Finding>, String> {
    let fingerprint = Arc::new(capture_fingerprint(client, base).await?);
    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let strategy = config.soft_404;
    let mut set = JoinSet::new();

    for (index, entry) in WORDLIST.iter().enumerate() {
        let client = client.clone();
        let base = base.clone();
        let fingerprint = Arc::clone(&fingerprint);
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            check_entry(&client, &base, entry, &fingerprint, strategy)
                .await
                .map(|finding| (index, finding))
        });
    }

    let mut found = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(hit)) => found.push(hit),
            Ok(None) => {}
            Err(e) => error!(error = %e, "Directory enumeration task failed."),
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, finding)| finding).collect())
}

/// `100 - 10 * min(critical_and_high, 10)`.
pub fn dir_enum_score(findings: &[Finding]) -> u8 {
    let severe = findings.iter().filter(|f| f.severity() >= Severity::High).count().min(10);
    (100 - 10 * severe) as u8
}

pub async fn run_dir_enum_scan(ctx: &ProbeContext) -> ProbeResult {
    info!(target = %ctx.target, entries = WORDLIST.len(), "Starting directory enumeration.");

    let client = match http::build_client(ctx, false) {
        Ok(c) => c,
        Err(e) => return ctx.failure(ProbeKind::DirectoryEnum, e),
    };
    let base = match ctx.target.url().join("/") {
        Ok(base) => base,
        Err(e) => return ctx.failure(ProbeKind::DirectoryEnum, format!("Invalid base URL: {}", e)),
    };

    let findings = match enumerate(&client, &base, &ctx.config.dir_enum).await {
        Ok(findings) => findings,
        Err(e) => return ctx.failure(ProbeKind::DirectoryEnum, e),
    };

    let count = |kind: EntryKind| {
        findings
            .iter()
            .filter(|f| f.finding_type() == kind.code())
            .count()
    };
    let summary = if findings.is_empty() {
        format!("None of {} common paths are exposed", WORDLIST.len())
    } else {
        format!(
            "{} sensitive files, {} admin panels and {} directories exposed",
            count(EntryKind::CriticalFile),
            count(EntryKind::AdminPanel),
            count(EntryKind::Directory)
        )
    };

    info!(found = findings.len(), "Directory enumeration finished.");
    ProbeResult::completed(ProbeKind::DirectoryEnum, dir_enum_score(&findings), summary, findings)
        .with_detail("entries_checked", WORDLIST.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::fixture::{serve, Reply};
    use reqwest::redirect::Policy;

    fn client() -> Client {
        Client::builder().no_proxy().redirect(Policy::none()).build().unwrap()
    }

    #[test]
    fn wordlist_is_large_and_unique() {
        assert!(WORDLIST.len() >= 80);
        let paths: HashSet<&str> = WORDLIST.iter().map(|e| e.path).collect();
        assert_eq!(paths.len(), WORDLIST.len());
        assert!(WORDLIST.iter().all(|e| !e.path.starts_with('/')));
    }

    #[test]
    fn similarity_ignores_the_requested_path() {
        let baseline = NotFoundFingerprint::new(StatusCode::OK, "<p>No page at /rampart-1234</p>", "/rampart-1234");
        let strategy = SoftNotFoundStrategy::default();
        assert!(baseline.matches(StatusCode::OK, "<p>No page at /.env</p>", "/.env", strategy));
        assert!(!baseline.matches(StatusCode::OK, "DB_PASSWORD=hunter2\nAPP_KEY=x", "/.env", strategy));
        assert!(!baseline.matches(StatusCode::NOT_FOUND, "<p>No page at /.env</p>", "/.env", strategy));
    }

    #[test]
    fn exact_and_status_only_strategies() {
        let baseline = NotFoundFingerprint::new(StatusCode::OK, "Not here: /x", "/x");
        assert!(baseline.matches(StatusCode::OK, "NOT HERE: /y", "/y", SoftNotFoundStrategy::ExactBody));
        assert!(!baseline.matches(StatusCode::OK, "Not here: /y!", "/y", SoftNotFoundStrategy::ExactBody));
        assert!(baseline.matches(StatusCode::OK, "anything", "/y", SoftNotFoundStrategy::StatusOnly));
    }

    #[test]
    fn jaccard_bounds() {
        assert_eq!(jaccard_similarity("", ""), 1.0);
        assert_eq!(jaccard_similarity("a b", "a b"), 1.0);
        assert_eq!(jaccard_similarity("a b", "c d"), 0.0);
        assert_eq!(jaccard_similarity("a b c", "a b d"), 0.5);
    }

    #[test]
    fn trailing_slash_redirects_count_for_directory_like_entries() {
        let base = Url::parse("https://example.com/").unwrap();
        let wp = WORDLIST.iter().find(|e| e.path == "wp-admin").unwrap();
        let url = base.join(wp.path).unwrap();
        assert!(is_directory_redirect(wp, &url, StatusCode::MOVED_PERMANENTLY, Some("/wp-admin/")));
        assert!(!is_directory_redirect(wp, &url, StatusCode::FOUND, Some("/login")));

        let env = WORDLIST.iter().find(|e| e.path == ".env").unwrap();
        let url = base.join(env.path).unwrap();
        assert!(!is_directory_redirect(env, &url, StatusCode::MOVED_PERMANENTLY, Some("/.env/")));
    }

    #[test]
    fn score_caps_at_ten_severe_findings() {
        let f = |s| Finding::new("X", s, "/x", "test");
        assert_eq!(dir_enum_score(&[]), 100);
        assert_eq!(dir_enum_score(&[f(Severity::Critical), f(Severity::Medium)]), 90);
        assert_eq!(dir_enum_score(&vec![f(Severity::High); 14]), 0);
    }

    #[tokio::test]
    async fn soft_404_site_yields_no_findings() {
        let base = serve(|req| {
            Reply::ok(format!(
                "<html><body><h1>Sorry</h1><p>The page {} does not exist.</p></body></html>",
                req.path()
            ))
        })
        .await;
        let findings = enumerate(&client(), &base, &DirEnumConfig::default()).await.unwrap();
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[tokio::test]
    async fn real_404_site_reports_only_existing_paths() {
        let base = serve(|req| match req.path() {
            "/.env" => Reply::ok("APP_KEY=base64:abc\nDB_PASSWORD=secret"),
            "/admin/" => Reply::ok("<html><title>Admin login</title></html>"),
            _ => Reply::status(404, "Not Found"),
        })
        .await;
        let findings = enumerate(&client(), &base, &DirEnumConfig::default()).await.unwrap();
        let codes: Vec<(&str, &str, Severity)> = findings
            .iter()
            .map(|f| (f.finding_type(), f.location(), f.severity()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("DIRENUM_SENSITIVE_FILE", "/.env", Severity::Critical),
                ("DIRENUM_ADMIN_PANEL", "/admin/", Severity::High),
            ]
        );
        assert_eq!(dir_enum_score(&findings), 80);
    }
}
