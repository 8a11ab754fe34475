// src/core/scanner/port_scanner.rs

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::ProbeContext;
use crate::config::PortScanConfig;
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};

/// Well-known services behind the default port list.
const SERVICES: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (1433, "MSSQL"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (6379, "Redis"),
    (8080, "HTTP-Alt"),
    (8443, "HTTPS-Alt"),
    (27017, "MongoDB"),
];

/// Remote-access and file-sharing services that are common attack entry points.
const RISKY_PORTS: &[u16] = &[21, 23, 445, 3389, 5900];
const DATABASE_PORTS: &[u16] = &[1433, 3306, 5432, 6379, 27017];
const WEB_PORTS: &[u16] = &[80, 443, 8080, 8443];

pub fn service_name(port: u16) -> &'static str {
    SERVICES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// The finding an open port produces, if any. Web ports are expected to be
/// open on a web target and produce nothing.
pub fn classify_port(port: u16) -> Option<Finding> {
    let service = service_name(port);
    let location = format!("port:{port}");
    if RISKY_PORTS.contains(&port) {
        Some(Finding::new(
            "PORT_RISKY_SERVICE",
            Severity::High,
            location,
            format!("Potentially risky service {service} is reachable on port {port}"),
        ))
    } else if DATABASE_PORTS.contains(&port) {
        Some(Finding::new(
            "PORT_DATABASE_EXPOSED",
            Severity::Medium,
            location,
            format!("{service} is reachable from the internet on port {port}"),
        ))
    } else if WEB_PORTS.contains(&port) {
        None
    } else {
        Some(Finding::new(
            "PORT_SERVICE_EXPOSED",
            Severity::Low,
            location,
            format!("{service} is reachable on port {port}"),
        ))
    }
}

/// `100 - 15 * high - 10 * medium`, with a further 5 points off for more
/// than five open ports or 10 for more than ten.
pub fn port_score(findings: &[Finding], open_count: usize) -> u8 {
    let high = findings.iter().filter(|f| f.severity() == Severity::High).count() as i64;
    let medium = findings.iter().filter(|f| f.severity() == Severity::Medium).count() as i64;
    let crowding = if open_count > 10 {
        10
    } else if open_count > 5 {
        5
    } else {
        0
    };
    (100 - 15 * high - 10 * medium - crowding).clamp(0, 100) as u8
}

async fn is_open(addr: SocketAddr, connect_timeout: Duration) -> bool {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "Port closed.");
            false
        }
        Err(_) => {
            debug!(%addr, "Port connect timed out.");
            false
        }
    }
}

/// Connect-scans `config.ports` on `ip`. Returns the open ports in ascending
/// order.
pub async fn scan_ports(ip: IpAddr, config: &PortScanConfig) -> Vec<u16> {
    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    let mut set = JoinSet::new();

    for &port in &config.ports {
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            is_open(SocketAddr::new(ip, port), connect_timeout).await.then_some(port)
        });
    }

    let mut open = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(port)) => open.push(port),
            Ok(None) => {}
            Err(e) => error!(error = %e, "Port scan task failed."),
        }
    }
    open.sort_unstable();
    open.dedup();
    open
}

pub async fn run_port_scan(ctx: &ProbeContext) -> ProbeResult {
    let Some(ip) = ctx.target.primary_addr() else {
        return ctx.failure(ProbeKind::PortScan, "target has no resolved address");
    };
    info!(target = %ctx.target, %ip, ports = ctx.config.ports.ports.len(), "Starting port scan.");

    let open = scan_ports(ip, &ctx.config.ports).await;
    let findings: Vec<Finding> = open.iter().filter_map(|&port| classify_port(port)).collect();
    let score = port_score(&findings, open.len());

    let summary = format!("Found {} open ports out of {} scanned", open.len(), ctx.config.ports.ports.len());
    let open_ports: Vec<_> = open
        .iter()
        .map(|&port| json!({ "port": port, "service": service_name(port) }))
        .collect();

    info!(open = open.len(), "Port scan finished.");
    ProbeResult::completed(ProbeKind::PortScan, score, summary, findings).with_detail("open_ports", open_ports)
}
