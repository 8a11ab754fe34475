// src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::ConfigError;
use crate::core::models::ProbeKind;
use crate::logging::{get_config_dir, PROJECT_NAME};

lazy_static! {
    pub static ref CONFIG_ENV: String = format!("{}_CONFIG", PROJECT_NAME.clone());
}

const CONFIG_FILE: &str = "config.json";

/// Every tunable the orchestrator and the probes read.
///
/// Built once by the caller and shared read-only with every probe; probes
/// never consult the environment themselves. Every field has a default, so a
/// configuration file only needs the keys it wants to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Wall-clock budget for a whole scan.
    pub global_timeout_secs: u64,
    /// Upper bound on the per-probe timeout derived from the global budget.
    pub max_probe_timeout_secs: u64,
    /// Size of the probe-level worker pool.
    pub max_concurrent_probes: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Score recorded for a probe that errored or timed out.
    pub error_floor_score: u8,
    pub weights: WeightTable,
    pub sqli: SqliConfig,
    pub dir_enum: DirEnumConfig,
    pub ports: PortScanConfig,
    pub headers: HeaderWeights,
    pub ssl: SslConfig,
    pub passwords: PasswordConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            global_timeout_secs: 300,
            max_probe_timeout_secs: 180,
            max_concurrent_probes: 4,
            request_timeout_secs: 10,
            user_agent: format!("RampartRS/{}", env!("CARGO_PKG_VERSION")),
            error_floor_score: 0,
            weights: WeightTable::default(),
            sqli: SqliConfig::default(),
            dir_enum: DirEnumConfig::default(),
            ports: PortScanConfig::default(),
            headers: HeaderWeights::default(),
            ssl: SslConfig::default(),
            passwords: PasswordConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Loads the configuration from the file named by `RAMPART_RS_SCANNER_CONFIG`,
    /// or from `config.json` in the project config directory. A missing file
    /// yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os(CONFIG_ENV.as_str()) {
            Some(path) => PathBuf::from(path),
            None => get_config_dir().join(CONFIG_FILE),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file found, using defaults.");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScanConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        info!(path = %path.display(), "Loaded scan configuration.");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.global_timeout_secs == 0 || self.max_probe_timeout_secs == 0 {
            return invalid("timeouts must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be greater than zero");
        }
        if self.max_concurrent_probes == 0 {
            return invalid("max_concurrent_probes must be at least 1");
        }
        if self.error_floor_score > 100 {
            return invalid("error_floor_score must be between 0 and 100");
        }
        self.weights.validate()?;

        if self.sqli.time_samples < 2 {
            return invalid("sqli.time_samples must be at least 2");
        }
        if !(self.sqli.time_threshold_secs > 0.0) {
            return invalid("sqli.time_threshold_secs must be positive");
        }
        if (self.sqli.sleep_seconds as f64) < self.sqli.time_threshold_secs {
            return invalid("sqli.sleep_seconds must not be shorter than sqli.time_threshold_secs");
        }
        if !(1..=20).contains(&self.sqli.max_union_columns) {
            return invalid("sqli.max_union_columns must be between 1 and 20");
        }

        if self.dir_enum.concurrency == 0 {
            return invalid("dir_enum.concurrency must be at least 1");
        }
        if let SoftNotFoundStrategy::Similarity { threshold } = self.dir_enum.soft_404 {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return invalid("dir_enum.soft_404.threshold must be in (0, 1]");
            }
        }

        if self.ports.concurrency == 0 || self.ports.connect_timeout_ms == 0 {
            return invalid("ports.concurrency and ports.connect_timeout_ms must be greater than zero");
        }
        if self.ports.ports.is_empty() {
            return invalid("ports.ports must list at least one port");
        }

        Ok(())
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Per-probe budget: the global budget split across the number of waves
    /// the worker pool needs, capped at `max_probe_timeout_secs`.
    pub fn probe_timeout(&self, probe_count: usize) -> Duration {
        let workers = self.max_concurrent_probes.max(1);
        let waves = probe_count.max(1).div_ceil(workers) as u32;
        let share = self.global_timeout() / waves;
        share.min(Duration::from_secs(self.max_probe_timeout_secs))
    }
}

/// Category weights used by the aggregator before renormalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightTable {
    pub sqli: f64,
    pub xss: f64,
    pub ssl_tls: f64,
    pub database: f64,
    pub headers: f64,
    pub passwords: f64,
    pub port_scan: f64,
    pub quick_wins: f64,
    pub directory_enum: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            sqli: 0.20,
            xss: 0.15,
            ssl_tls: 0.15,
            database: 0.15,
            headers: 0.10,
            passwords: 0.10,
            port_scan: 0.05,
            quick_wins: 0.05,
            directory_enum: 0.05,
        }
    }
}

impl WeightTable {
    pub fn weight(&self, kind: ProbeKind) -> f64 {
        match kind {
            ProbeKind::Sqli => self.sqli,
            ProbeKind::Xss => self.xss,
            ProbeKind::SslTls => self.ssl_tls,
            ProbeKind::Database => self.database,
            ProbeKind::Headers => self.headers,
            ProbeKind::Passwords => self.passwords,
            ProbeKind::PortScan => self.port_scan,
            ProbeKind::QuickWins => self.quick_wins,
            ProbeKind::DirectoryEnum => self.directory_enum,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use strum::IntoEnumIterator;

        for kind in ProbeKind::iter() {
            let weight = self.weight(kind);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weight for {kind} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliConfig {
    /// Minimum extra latency over the baseline for a delayed sample.
    pub time_threshold_secs: f64,
    /// Consecutive delayed samples needed to flag a time-based injection.
    pub time_samples: usize,
    /// Delay requested by the sleep payloads.
    pub sleep_seconds: u64,
    pub max_union_columns: usize,
}

impl Default for SqliConfig {
    fn default() -> Self {
        Self {
            time_threshold_secs: 4.0,
            time_samples: 2,
            sleep_seconds: 5,
            max_union_columns: 6,
        }
    }
}

/// How a response is compared with the captured "not found" page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SoftNotFoundStrategy {
    /// Same status code as the baseline means "not found".
    StatusOnly,
    /// Same status and byte-identical normalized body.
    ExactBody,
    /// Same status and token similarity at or above `threshold`.
    Similarity { threshold: f64 },
}

impl Default for SoftNotFoundStrategy {
    fn default() -> Self {
        SoftNotFoundStrategy::Similarity { threshold: 0.9 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirEnumConfig {
    pub concurrency: usize,
    pub soft_404: SoftNotFoundStrategy,
}

impl Default for DirEnumConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            soft_404: SoftNotFoundStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortScanConfig {
    pub ports: Vec<u16>,
    pub connect_timeout_ms: u64,
    pub concurrency: usize,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            ports: vec![
                21, 22, 23, 25, 53, 80, 110, 143, 443, 445, 3306, 3389, 5432, 5900, 6379, 8080, 8443, 27017,
            ],
            connect_timeout_ms: 2000,
            concurrency: 10,
        }
    }
}

/// Points deducted from the header probe's score per missing header or issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderWeights {
    pub strict_transport_security: u8,
    pub content_security_policy: u8,
    pub x_frame_options: u8,
    pub x_content_type_options: u8,
    pub referrer_policy: u8,
    pub permissions_policy: u8,
    pub x_xss_protection: u8,
    pub information_disclosure: u8,
    pub insecure_cookie: u8,
}

impl Default for HeaderWeights {
    fn default() -> Self {
        Self {
            strict_transport_security: 15,
            content_security_policy: 15,
            x_frame_options: 10,
            x_content_type_options: 10,
            referrer_policy: 10,
            permissions_policy: 10,
            x_xss_protection: 5,
            information_disclosure: 5,
            insecure_cookie: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub port: u16,
    /// Certificates expiring within this many days are HIGH.
    pub expiry_warning_days: i64,
    /// Certificates expiring within this many days are MEDIUM.
    pub expiry_notice_days: i64,
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            port: 443,
            expiry_warning_days: 30,
            expiry_notice_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// k-anonymity range endpoint; the 5-character hash prefix is appended.
    pub breach_api_url: String,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            breach_api_url: "https://api.pwnedpasswords.com/range/".to_string(),
        }
    }
}
