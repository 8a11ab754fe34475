// src/lib.rs

//! Scan orchestration and scoring core for Rampart RS.
//!
//! The terminal front-end in `main.rs` is one consumer of this library; any
//! other caller builds a [`core::models::ScanRequest`], hands it to an
//! [`core::scanner::Orchestrator`] and receives a [`core::models::ScanResult`].

pub mod config;
pub mod core;
pub mod logging;
