// src/core/scanner/mod.rs

// Public interface of the `scanner` module: the probe context, the dispatch
// table and the orchestrator that runs the enabled probes under a worker pool.
pub mod database_scanner;
pub mod dir_enum_scanner;
#[cfg(test)]
mod fixture;
pub mod headers_scanner;
pub mod http;
pub mod password_scanner;
pub mod port_scanner;
pub mod quick_wins_scanner;
pub mod sqli_scanner;
pub mod ssl_scanner;
pub mod xss_scanner;

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::core::error::ScanError;
use crate::core::models::{ProbeKind, ProbeResult, ScanRequest, ScanResult, ScanState, ScanStatus, Severity};
use crate::core::scoring::{aggregate, risk_level_for};
use crate::core::target::{validate_target, ScanTarget};

// --- Probe Context ---

/// Everything a probe may read. Cloning is cheap; all fields are shared.
#[derive(Clone)]
pub struct ProbeContext {
    pub target: Arc<ScanTarget>,
    pub config: Arc<ScanConfig>,
    passwords: Arc<[String]>,
}

impl ProbeContext {
    pub fn new(target: ScanTarget, config: Arc<ScanConfig>, passwords: Vec<String>) -> Self {
        Self {
            target: Arc::new(target),
            config,
            passwords: passwords.into(),
        }
    }

    /// Breach-check candidates supplied with the request.
    pub fn passwords(&self) -> &[String] {
        &self.passwords
    }

    /// An errored result scored at the configured floor.
    pub fn failure(&self, kind: ProbeKind, error: impl Into<String>) -> ProbeResult {
        ProbeResult::failed(kind, error, self.config.error_floor_score)
    }
}

impl fmt::Debug for ProbeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeContext")
            .field("target", &self.target)
            .field("passwords", &format_args!("<{} redacted>", self.passwords.len()))
            .finish_non_exhaustive()
    }
}

// --- Dispatch ---

impl ProbeKind {
    /// Runs the probe for this category against `ctx.target`.
    pub async fn run(self, ctx: &ProbeContext) -> ProbeResult {
        match self {
            ProbeKind::PortScan => port_scanner::run_port_scan(ctx).await,
            ProbeKind::SslTls => ssl_scanner::run_ssl_scan(ctx).await,
            ProbeKind::Headers => headers_scanner::run_headers_scan(ctx).await,
            ProbeKind::Sqli => sqli_scanner::run_sqli_scan(ctx).await,
            ProbeKind::Xss => xss_scanner::run_xss_scan(ctx).await,
            ProbeKind::DirectoryEnum => dir_enum_scanner::run_dir_enum_scan(ctx).await,
            ProbeKind::QuickWins => quick_wins_scanner::run_quick_wins_scan(ctx).await,
            ProbeKind::Passwords => password_scanner::run_password_scan(ctx).await,
            ProbeKind::Database => database_scanner::run_database_scan(ctx).await,
        }
    }
}

/// The seam between the orchestrator and the probes it dispatches.
#[async_trait]
pub trait ProbeRunner: Send + Sync + 'static {
    async fn run(&self, kind: ProbeKind, ctx: ProbeContext) -> ProbeResult;
}

/// Runs the real network probes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveProbes;

#[async_trait]
impl ProbeRunner for LiveProbes {
    async fn run(&self, kind: ProbeKind, ctx: ProbeContext) -> ProbeResult {
        kind.run(&ctx).await
    }
}

// --- Orchestrator ---

/// Aborts the wrapped task when dropped, so an abandoned probe never outlives
/// the scan that started it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn join_failure(ctx: &ProbeContext, kind: ProbeKind, e: JoinError) -> ProbeResult {
    if e.is_panic() {
        let msg = panic_message(e.into_panic());
        error!(probe = %kind, panic = %msg, "Probe panicked.");
        ctx.failure(kind, format!("probe panicked: {}", msg))
    } else {
        warn!(probe = %kind, "Probe task was cancelled.");
        ctx.failure(kind, "cancelled")
    }
}

/// Runs one probe in its own task, bounded by `budget`.
async fn invoke<R: ProbeRunner>(runner: Arc<R>, kind: ProbeKind, ctx: ProbeContext, budget: Duration) -> ProbeResult {
    let probe_ctx = ctx.clone();
    let mut task = AbortOnDrop(tokio::spawn(async move { runner.run(kind, probe_ctx).await }));

    match timeout(budget, &mut task.0).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => join_failure(&ctx, kind, e),
        Err(_) => {
            warn!(probe = %kind, budget_secs = budget.as_secs(), "Probe timed out.");
            ctx.failure(kind, "timeout")
        }
    }
}

/// Validates a request, runs its probes and folds their results into a
/// [`ScanResult`].
pub struct Orchestrator<R = LiveProbes> {
    config: Arc<ScanConfig>,
    runner: Arc<R>,
}

impl Orchestrator<LiveProbes> {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_runner(config, LiveProbes)
    }
}

impl<R: ProbeRunner> Orchestrator<R> {
    pub fn with_runner(config: ScanConfig, runner: R) -> Self {
        Self {
            config: Arc::new(config),
            runner: Arc::new(runner),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Runs a scan end to end.
    ///
    /// Only invalid input is returned as an error, and always before any probe
    /// is dispatched. Every failure after that point is recorded in the result.
    pub async fn run(&self, request: ScanRequest) -> Result<ScanResult, ScanError> {
        let probes = request.enabled_probes()?;
        let target = validate_target(&request.target).await?;
        self.execute(request, target, probes).await
    }

    /// Runs `probes` against an already validated target.
    pub async fn execute(
        &self,
        request: ScanRequest,
        target: ScanTarget,
        probes: BTreeSet<ProbeKind>,
    ) -> Result<ScanResult, ScanError> {
        let scan_id = Uuid::new_v4().to_string();
        let mut state = ScanState::Pending;
        let start_time = Utc::now();
        let started = Instant::now();

        let ScanRequest {
            target: raw_target,
            scan_type,
            passwords,
            ..
        } = request;
        let ctx = ProbeContext::new(target, Arc::clone(&self.config), passwords);

        state.advance(ScanState::Running)?;
        info!(scan_id = %scan_id, target = %ctx.target, scan_type = %scan_type, probes = probes.len(), "Scan started.");

        let results = self.dispatch(&ctx, &probes).await;

        let security_score = aggregate(&results, &self.config.weights);
        let all_errored = results.values().all(ProbeResult::is_error);
        let (status, risk_level) = if all_errored {
            state.advance(ScanState::Failed)?;
            (ScanStatus::Failed, Severity::Critical)
        } else {
            state.advance(ScanState::Completed)?;
            (ScanStatus::Completed, risk_level_for(security_score))
        };

        let end_time = Utc::now();
        let duration = started.elapsed().as_secs_f64();
        info!(
            scan_id = %scan_id,
            score = security_score,
            risk = %risk_level,
            status = %status,
            duration_secs = duration,
            "Scan finished."
        );

        Ok(ScanResult {
            scan_id,
            target: raw_target,
            scan_type,
            security_score,
            risk_level,
            start_time,
            end_time,
            duration,
            status,
            results,
        })
    }

    /// Runs every probe under the worker pool and the global deadline. The
    /// returned map has exactly one entry per requested probe.
    async fn dispatch(&self, ctx: &ProbeContext, probes: &BTreeSet<ProbeKind>) -> BTreeMap<ProbeKind, ProbeResult> {
        let pool = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let budget = self.config.probe_timeout(probes.len());
        let deadline = Instant::now() + self.config.global_timeout();
        debug!(budget_secs = budget.as_secs(), workers = self.config.max_concurrent_probes, "Dispatching probes.");

        let mut set = JoinSet::new();
        for &kind in probes {
            let pool = Arc::clone(&pool);
            let runner = Arc::clone(&self.runner);
            let ctx = ctx.clone();
            set.spawn(async move {
                let result = match pool.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(probe = %kind, "Probe started.");
                        invoke(runner, kind, ctx, budget).await
                    }
                    Err(e) => ctx.failure(kind, format!("worker pool closed: {}", e)),
                };
                (kind, result)
            });
        }

        let mut results = BTreeMap::new();
        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((kind, result)))) => {
                    debug!(probe = %kind, score = result.score(), error = ?result.error(), "Probe finished.");
                    results.insert(kind, result);
                }
                Ok(Some(Err(e))) => error!(error = %e, "Probe worker failed."),
                Ok(None) => break,
                Err(_) => {
                    warn!(pending = set.len(), "Global scan timeout reached, aborting outstanding probes.");
                    set.abort_all();
                    break;
                }
            }
        }

        for &kind in probes {
            results.entry(kind).or_insert_with(|| ctx.failure(kind, "timeout"));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ScanType;
    use strum::IntoEnumIterator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const PUBLIC_TARGET: &str = "https://93.184.216.34";

    /// Scripted behaviour for one probe.
    #[derive(Clone, Copy)]
    enum Script {
        Score(u8),
        Fail,
        Panic,
        Hang,
    }

    #[derive(Default)]
    struct MockRunner {
        scripts: BTreeMap<ProbeKind, Script>,
        calls: Mutex<Vec<ProbeKind>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockRunner {
        fn with(scripts: &[(ProbeKind, Script)]) -> Self {
            Self {
                scripts: scripts.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ProbeRunner for MockRunner {
        async fn run(&self, kind: ProbeKind, ctx: ProbeContext) -> ProbeResult {
            self.calls.lock().unwrap().push(kind);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match self.scripts.get(&kind).copied().unwrap_or(Script::Score(100)) {
                Script::Score(score) => ProbeResult::completed(kind, score, "mock", Vec::new()),
                Script::Fail => ctx.failure(kind, "connection refused"),
                Script::Panic => panic!("boom"),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    ProbeResult::completed(kind, 100, "late", Vec::new())
                }
            }
        }
    }

    fn orchestrator(runner: MockRunner) -> Orchestrator<MockRunner> {
        Orchestrator::with_runner(ScanConfig::default(), runner)
    }

    #[tokio::test]
    async fn clean_full_scan_scores_100_low() {
        let orch = orchestrator(MockRunner::default());
        let result = orch.run(ScanRequest::new(PUBLIC_TARGET, ScanType::Full)).await.unwrap();
        assert_eq!(result.results.len(), 9);
        assert_eq!(result.security_score, 100.0);
        assert_eq!(result.risk_level, Severity::Low);
        assert_eq!(result.status, ScanStatus::Completed);
        assert_eq!(result.target, PUBLIC_TARGET);
        assert!(Uuid::parse_str(&result.scan_id).is_ok());
        assert!(result.end_time >= result.start_time);
    }

    #[tokio::test]
    async fn sqli_only_failure_is_zero_critical() {
        let runner = MockRunner::with(&[(ProbeKind::Sqli, Script::Score(0))]);
        let request = ScanRequest::new(PUBLIC_TARGET, ScanType::Custom).with_option("sqli", true);
        let result = orchestrator(runner).run(request).await.unwrap();
        assert_eq!(result.results.keys().copied().collect::<Vec<_>>(), vec![ProbeKind::Sqli]);
        assert_eq!(result.security_score, 0.0);
        assert_eq!(result.risk_level, Severity::Critical);
        assert_eq!(result.status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn quick_scan_dispatches_only_quick_probes() {
        let orch = orchestrator(MockRunner::default());
        let result = orch.run(ScanRequest::new(PUBLIC_TARGET, ScanType::Quick)).await.unwrap();
        let mut calls = orch.runner.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec![ProbeKind::SslTls, ProbeKind::Headers, ProbeKind::QuickWins]);
        assert_eq!(result.results.len(), 3);
    }

    #[tokio::test]
    async fn every_probe_erroring_fails_the_scan() {
        let runner = MockRunner::with(&[
            (ProbeKind::SslTls, Script::Fail),
            (ProbeKind::Headers, Script::Fail),
            (ProbeKind::QuickWins, Script::Fail),
        ]);
        let result = orchestrator(runner)
            .run(ScanRequest::new(PUBLIC_TARGET, ScanType::Quick))
            .await
            .unwrap();
        assert_eq!(result.status, ScanStatus::Failed);
        assert_eq!(result.risk_level, Severity::Critical);
        assert_eq!(result.security_score, 0.0);
        assert!(result.results.values().all(ProbeResult::is_error));
    }

    #[tokio::test]
    async fn panicking_probe_becomes_an_error() {
        let runner = MockRunner::with(&[(ProbeKind::Headers, Script::Panic)]);
        let result = orchestrator(runner)
            .run(ScanRequest::new(PUBLIC_TARGET, ScanType::Quick))
            .await
            .unwrap();
        let headers = &result.results[&ProbeKind::Headers];
        assert_eq!(headers.error(), Some("probe panicked: boom"));
        assert_eq!(headers.score(), 0);
        assert_eq!(result.status, ScanStatus::Completed);
        assert!(!result.results[&ProbeKind::SslTls].is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_times_out_without_blocking_the_rest() {
        let runner = MockRunner::with(&[(ProbeKind::QuickWins, Script::Hang)]);
        let result = orchestrator(runner)
            .run(ScanRequest::new(PUBLIC_TARGET, ScanType::Quick))
            .await
            .unwrap();
        assert_eq!(result.results[&ProbeKind::QuickWins].error(), Some("timeout"));
        assert_eq!(result.results[&ProbeKind::SslTls].score(), 100);
        assert_eq!(result.results.len(), 3);
        // Three probes fit in one wave, so the budget is the 180s cap.
        assert!(result.duration >= 180.0 && result.duration < 181.0, "{}", result.duration);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probes_never_outlive_the_global_budget() {
        let config = ScanConfig {
            global_timeout_secs: 30,
            max_probe_timeout_secs: 600,
            max_concurrent_probes: 1,
            ..ScanConfig::default()
        };
        let scripts: Vec<(ProbeKind, Script)> = ProbeKind::iter().map(|k| (k, Script::Hang)).collect();
        let orch = Orchestrator::with_runner(config, MockRunner::with(&scripts));
        let result = orch.run(ScanRequest::new(PUBLIC_TARGET, ScanType::Full)).await.unwrap();
        assert_eq!(result.results.len(), 9);
        assert!(result.results.values().all(|r| r.error() == Some("timeout")));
        assert_eq!(result.status, ScanStatus::Failed);
        assert!(result.duration <= 30.5, "{}", result.duration);
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrency() {
        let config = ScanConfig {
            max_concurrent_probes: 2,
            ..ScanConfig::default()
        };
        let orch = Orchestrator::with_runner(config, MockRunner::default());
        orch.run(ScanRequest::new(PUBLIC_TARGET, ScanType::Full)).await.unwrap();
        assert!(orch.runner.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(orch.runner.calls.lock().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_dispatch() {
        let orch = orchestrator(MockRunner::default());

        let loopback = orch.run(ScanRequest::new("http://127.0.0.1:8080", ScanType::Full)).await;
        assert!(matches!(loopback, Err(ScanError::DisallowedAddress { .. })));

        let private = orch.run(ScanRequest::new("http://10.0.0.5", ScanType::Quick)).await;
        assert!(matches!(private, Err(ScanError::DisallowedAddress { .. })));

        let options = orch
            .run(ScanRequest::new(PUBLIC_TARGET, ScanType::Custom).with_option("telnet", true))
            .await;
        assert!(matches!(options, Err(ScanError::InvalidOptions(_))));

        assert!(orch.runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_results_use_renormalized_weights() {
        let runner = MockRunner::with(&[
            (ProbeKind::Sqli, Script::Score(50)),
            (ProbeKind::Xss, Script::Fail),
        ]);
        let result = orchestrator(runner)
            .run(ScanRequest::new(PUBLIC_TARGET, ScanType::Full))
            .await
            .unwrap();
        let weights = &ScanConfig::default().weights;
        let expected = aggregate(&result.results, weights);
        assert_eq!(result.security_score, expected);
        assert!(result.security_score < 100.0);
        assert_eq!(result.risk_level, risk_level_for(expected));
    }

    #[test]
    fn context_debug_redacts_passwords() {
        let url = url::Url::parse(PUBLIC_TARGET).unwrap();
        let target = ScanTarget::from_validated(url, vec!["93.184.216.34".parse().unwrap()]);
        let ctx = ProbeContext::new(target, Arc::new(ScanConfig::default()), vec!["hunter2".into()]);
        assert!(!format!("{ctx:?}").contains("hunter2"));
        assert_eq!(ctx.passwords().len(), 1);
        let failed = ctx.failure(ProbeKind::Database, "x");
        assert_eq!(failed.score(), 0);
        assert!(failed.findings().is_empty());
    }
}
