// src/core/error.rs

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::models::ScanState;

/// Errors that reject a scan before any probe is dispatched.
///
/// Everything that can go wrong once probes are running degrades into the
/// `ScanResult` instead (see `ProbeResult::error`).
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("target {host} resolves to {addr}, which is a {reason} address and may not be scanned")]
    DisallowedAddress {
        host: String,
        addr: IpAddr,
        reason: &'static str,
    },

    #[error("could not resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("illegal scan state transition from {from} to {to}")]
    IllegalTransition { from: ScanState, to: ScanState },
}

/// Errors raised while loading `ScanConfig` from disk.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
