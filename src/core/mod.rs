// src/core/mod.rs

/// Error types returned at the library boundary.
pub mod error;

/// Data structures shared by the probes, the orchestrator and the front-end:
/// findings, per-probe results, scan requests and the final scan record.
pub mod models;

/// Weight renormalization, weighted aggregation and risk classification.
pub mod scoring;

/// Target parsing and the loopback/private address guard.
pub mod target;

/// The orchestrator and every individual probe.
pub mod scanner;

/// Static, human-readable explanations and remediation steps for every
/// finding code a probe can emit.
pub mod knowledge_base;
