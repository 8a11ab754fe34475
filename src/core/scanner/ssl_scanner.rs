// src/core/scanner/ssl_scanner.rs

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use native_tls::{Protocol, TlsConnector};
use serde_json::json;
use strum::{Display, EnumIter, IntoEnumIterator};
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

use super::ProbeContext;
use crate::config::SslConfig;
use crate::core::models::{Finding, ProbeKind, ProbeResult, Severity};
use crate::core::scoring::{deduction_score, SeverityDeductions};

/// Signature algorithms built on broken hashes (MD2, MD5, SHA-1).
const WEAK_SIGNATURE_OIDS: &[&str] = &[
    "1.2.840.113549.1.1.2",
    "1.2.840.113549.1.1.4",
    "1.2.840.113549.1.1.5",
    "1.3.14.3.2.29",
    "1.2.840.10045.4.1",
    "1.2.840.10040.4.3",
];

const MIN_RSA_BITS: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum TlsVersion {
    #[strum(serialize = "SSLv3")]
    Ssl3,
    #[strum(serialize = "TLSv1.0")]
    Tls10,
    #[strum(serialize = "TLSv1.1")]
    Tls11,
    #[strum(serialize = "TLSv1.2")]
    Tls12,
}

impl TlsVersion {
    fn protocol(self) -> Protocol {
        match self {
            TlsVersion::Ssl3 => Protocol::Sslv3,
            TlsVersion::Tls10 => Protocol::Tlsv10,
            TlsVersion::Tls11 => Protocol::Tlsv11,
            TlsVersion::Tls12 => Protocol::Tlsv12,
        }
    }

    pub fn is_legacy(self) -> bool {
        !matches!(self, TlsVersion::Tls12)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub signature_oid: String,
    pub rsa_key_bits: Option<usize>,
}

/// Everything learned from the handshakes against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsObservation {
    /// Whether the chain and hostname verified with the default trust store.
    pub trusted: bool,
    pub certificate: Option<CertificateFacts>,
    pub supported: Vec<TlsVersion>,
}

/// Raises the flag when dropped. The blocking handshake thread cannot be
/// aborted, so it polls the flag before every new connection instead.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

const CANCELLED: &str = "cancelled";

pub async fn run_ssl_scan(ctx: &ProbeContext) -> ProbeResult {
    info!(target = %ctx.target, "Starting SSL/TLS scan.");

    let Some(ip) = ctx.target.primary_addr() else {
        return ctx.failure(ProbeKind::SslTls, "target has no resolved address");
    };
    let addr = SocketAddr::new(ip, ctx.config.ssl.port);
    let host = ctx.target.host().to_string();
    let io_timeout = ctx.config.request_timeout();

    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(Arc::clone(&cancel));

    debug!(%addr, "Spawning blocking task for TLS handshakes.");
    let observation = spawn_blocking(move || perform_tls_scan(&host, addr, io_timeout, &cancel))
        .await
        .unwrap_or_else(|e| {
            error!(panic = %e, "Blocking SSL scan task panicked!");
            Err(format!("Task panicked: {}", e))
        });

    let observation = match observation {
        Ok(observation) => observation,
        Err(e) => return ctx.failure(ProbeKind::SslTls, e),
    };

    let findings = analyze_tls(&observation, Utc::now(), &ctx.config.ssl);
    let score = deduction_score(&findings, &SeverityDeductions::STANDARD);
    let summary = match &observation.certificate {
        Some(cert) if findings.is_empty() => format!("Valid certificate issued by {}", cert.issuer),
        Some(_) => format!("{} TLS issues found", findings.len()),
        None => "Server presented no certificate".to_string(),
    };

    let mut result = ProbeResult::completed(ProbeKind::SslTls, score, summary, findings)
        .with_detail("trusted", observation.trusted)
        .with_detail(
            "protocols",
            observation.supported.iter().map(ToString::to_string).collect::<Vec<_>>(),
        );
    if let Some(cert) = &observation.certificate {
        result = result.with_detail(
            "certificate",
            json!({
                "subject": cert.subject,
                "issuer": cert.issuer,
                "not_before": cert.not_before.to_rfc3339(),
                "not_after": cert.not_after.to_rfc3339(),
                "days_until_expiry": cert.not_after.signed_duration_since(Utc::now()).num_days(),
                "signature_algorithm": cert.signature_oid,
                "rsa_key_bits": cert.rsa_key_bits,
            }),
        );
    }

    info!(findings = result.findings().len(), "SSL/TLS scan finished.");
    result
}

fn connect(addr: SocketAddr, io_timeout: Duration, cancel: &AtomicBool) -> Result<TcpStream, String> {
    if cancel.load(Ordering::Relaxed) {
        debug!(%addr, "TLS scan cancelled before connecting.");
        return Err(CANCELLED.to_string());
    }
    let stream = TcpStream::connect_timeout(&addr, io_timeout).map_err(|e| {
        error!(error = %e, "TCP connection failed");
        format!("TCP Connection Error: {}", e)
    })?;
    stream
        .set_read_timeout(Some(io_timeout))
        .and_then(|_| stream.set_write_timeout(Some(io_timeout)))
        .map_err(|e| format!("Socket configuration failed: {}", e))?;
    Ok(stream)
}

fn lenient_connector(version: Option<TlsVersion>) -> Result<TlsConnector, native_tls::Error> {
    let mut builder = TlsConnector::builder();
    builder
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true);
    if let Some(version) = version {
        builder
            .min_protocol_version(Some(version.protocol()))
            .max_protocol_version(Some(version.protocol()));
    }
    builder.build()
}

fn perform_tls_scan(
    host: &str,
    addr: SocketAddr,
    io_timeout: Duration,
    cancel: &AtomicBool,
) -> Result<TlsObservation, String> {
    debug!(host, %addr, "Performing verified TLS handshake.");

    let strict = TlsConnector::new().map_err(|e| {
        error!(error = %e, "Failed to create TlsConnector");
        format!("TlsConnector Error: {}", e)
    })?;

    let (stream, trusted) = match strict.connect(host, connect(addr, io_timeout, cancel)?) {
        Ok(stream) => (stream, true),
        Err(e) => {
            warn!(error = %e, "Verified handshake failed, retrying without verification.");
            let lenient = lenient_connector(None).map_err(|e| format!("TlsConnector Error: {}", e))?;
            let stream = lenient.connect(host, connect(addr, io_timeout, cancel)?).map_err(|e| {
                error!(error = %e, "TLS handshake failed");
                format!("TLS Handshake Error: {}", e)
            })?;
            (stream, false)
        }
    };

    let certificate = match stream.peer_certificate() {
        Ok(Some(cert)) => {
            let der = cert.to_der().map_err(|e| {
                error!(error = %e, "Failed to convert certificate to DER format");
                format!("Could not convert certificate to DER: {}", e)
            })?;
            Some(certificate_facts(&der)?)
        }
        Ok(None) => {
            debug!("TLS connection successful, but no peer certificate provided.");
            None
        }
        Err(e) => {
            error!(error = %e, "Failed to retrieve peer certificate from stream");
            return Err(format!("Could not get peer certificate: {}", e));
        }
    };
    drop(stream);

    let mut supported = Vec::new();
    for version in TlsVersion::iter() {
        if cancel.load(Ordering::Relaxed) {
            return Err(CANCELLED.to_string());
        }
        if supports_version(host, addr, io_timeout, version, cancel) {
            supported.push(version);
        }
    }

    Ok(TlsObservation {
        trusted,
        certificate,
        supported,
    })
}

/// A local TLS library that refuses to build a connector for `version`
/// counts as "not supported".
fn supports_version(
    host: &str,
    addr: SocketAddr,
    io_timeout: Duration,
    version: TlsVersion,
    cancel: &AtomicBool,
) -> bool {
    let connector = match lenient_connector(Some(version)) {
        Ok(connector) => connector,
        Err(e) => {
            debug!(%version, error = %e, "Local TLS library cannot offer protocol.");
            return false;
        }
    };
    let Ok(stream) = connect(addr, io_timeout, cancel) else {
        return false;
    };
    let accepted = connector.connect(host, stream).is_ok();
    debug!(%version, accepted, "Protocol probe finished.");
    accepted
}

fn certificate_facts(der: &[u8]) -> Result<CertificateFacts, String> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        format!("X.509 Parse Error: {}", e)
    })?;
    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let validity = x509.validity();
    let rsa_key_bits = match x509.public_key().parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(rsa)) => Some(rsa.key_size()),
        _ => None,
    };

    Ok(CertificateFacts {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        not_before: asn1_time_to_chrono_utc(&validity.not_before),
        not_after: asn1_time_to_chrono_utc(&validity.not_after),
        signature_oid: x509.signature_algorithm.algorithm.to_id_string(),
        rsa_key_bits,
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

/// Turns a handshake observation into findings as of `now`.
pub fn analyze_tls(observation: &TlsObservation, now: DateTime<Utc>, config: &SslConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    let location = "certificate";

    if !observation.trusted {
        findings.push(Finding::new(
            "SSL_UNTRUSTED_CERTIFICATE",
            Severity::Critical,
            location,
            "Certificate chain or hostname failed verification",
        ));
    }

    match &observation.certificate {
        None => findings.push(Finding::new(
            "SSL_NO_CERTIFICATE",
            Severity::High,
            location,
            "TLS handshake completed without a peer certificate",
        )),
        Some(cert) => {
            let days_left = cert.not_after.signed_duration_since(now).num_days();
            if now < cert.not_before {
                findings.push(
                    Finding::new(
                        "SSL_NOT_YET_VALID",
                        Severity::Critical,
                        location,
                        "Certificate is not valid yet",
                    )
                    .with_evidence(format!("not before {}", cert.not_before.to_rfc3339())),
                );
            } else if now > cert.not_after {
                findings.push(
                    Finding::new("SSL_EXPIRED", Severity::Critical, location, "Certificate has expired")
                        .with_evidence(format!("expired {}", cert.not_after.to_rfc3339())),
                );
            } else if days_left < config.expiry_warning_days {
                findings.push(Finding::new(
                    "SSL_EXPIRING_SOON",
                    Severity::High,
                    location,
                    format!("Certificate expires in {days_left} days"),
                ));
            } else if days_left < config.expiry_notice_days {
                findings.push(Finding::new(
                    "SSL_EXPIRING",
                    Severity::Medium,
                    location,
                    format!("Certificate expires in {days_left} days"),
                ));
            }

            if WEAK_SIGNATURE_OIDS.contains(&cert.signature_oid.as_str()) {
                findings.push(
                    Finding::new(
                        "SSL_WEAK_SIGNATURE",
                        Severity::Medium,
                        location,
                        "Certificate is signed with a deprecated hash algorithm",
                    )
                    .with_evidence(cert.signature_oid.clone()),
                );
            }
            if let Some(bits) = cert.rsa_key_bits.filter(|bits| *bits < MIN_RSA_BITS) {
                findings.push(Finding::new(
                    "SSL_WEAK_KEY",
                    Severity::Medium,
                    location,
                    format!("RSA key is only {bits} bits"),
                ));
            }
        }
    }

    for version in observation.supported.iter().filter(|v| v.is_legacy()) {
        findings.push(Finding::new(
            "SSL_LEGACY_PROTOCOL",
            Severity::High,
            format!("protocol:{version}"),
            format!("Server still accepts {version}"),
        ));
    }

    findings
}
