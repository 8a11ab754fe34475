// src/core/scoring.rs

//! Turns a set of per-probe results into one security score.
//!
//! Everything here is a pure function of its inputs. Results live in ordered
//! maps, so the floating-point sums are evaluated in the same order no matter
//! which probe finished first.

use std::collections::BTreeMap;

use crate::config::WeightTable;
use crate::core::models::{Finding, ProbeKind, ProbeResult, RiskLevel, Severity};

/// Rescales the configured weights of `kinds` so they sum to 1.0.
///
/// If every selected weight is zero the probes share the score equally.
pub fn renormalize(
    weights: &WeightTable,
    kinds: impl IntoIterator<Item = ProbeKind>,
) -> BTreeMap<ProbeKind, f64> {
    let raw: BTreeMap<ProbeKind, f64> = kinds.into_iter().map(|k| (k, weights.weight(k))).collect();
    let total: f64 = raw.values().sum();

    if raw.is_empty() {
        return raw;
    }
    if total <= 0.0 {
        let share = 1.0 / raw.len() as f64;
        return raw.into_keys().map(|k| (k, share)).collect();
    }
    raw.into_iter().map(|(k, w)| (k, w / total)).collect()
}

/// Weighted average of the probe scores, rounded to one decimal.
///
/// Errored probes already carry their floor score, so they pull the average
/// down instead of being skipped.
pub fn aggregate(results: &BTreeMap<ProbeKind, ProbeResult>, weights: &WeightTable) -> f64 {
    let normalized = renormalize(weights, results.keys().copied());
    let weighted: f64 = results
        .iter()
        .map(|(kind, result)| normalized.get(kind).copied().unwrap_or(0.0) * f64::from(result.score()))
        .sum();
    round_one_decimal(weighted.clamp(0.0, 100.0))
}

pub fn risk_level_for(score: f64) -> RiskLevel {
    if score >= 80.0 {
        Severity::Low
    } else if score >= 60.0 {
        Severity::Medium
    } else if score >= 40.0 {
        Severity::High
    } else {
        Severity::Critical
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Points taken off a probe's score for each finding of a given severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityDeductions {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl SeverityDeductions {
    /// Used by the SSL, password and database probes.
    pub const STANDARD: Self = Self {
        critical: 30,
        high: 20,
        medium: 10,
        low: 5,
    };

    /// Used by the quick-win checks.
    pub const QUICK_WINS: Self = Self {
        critical: 20,
        high: 20,
        medium: 10,
        low: 5,
    };

    pub fn for_severity(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// `100 - Σ deduction(severity)`, floored at zero.
pub fn deduction_score(findings: &[Finding], deductions: &SeverityDeductions) -> u8 {
    let total: u32 = findings.iter().map(|f| deductions.for_severity(f.severity())).sum();
    100u32.saturating_sub(total) as u8
}
