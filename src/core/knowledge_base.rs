//! This module acts as the central "brain" of the scanner.
//! It contains a static, read-only database of every finding code a probe can
//! emit, with a human-readable explanation and remediation steps for each.
//! Probes only attach a code; the front-end looks the details up here.

use crate::core::models::ProbeKind;

/// Everything the front-end shows about one finding code.
pub struct FindingDetail {
    /// The machine-readable code carried by `Finding::finding_type`.
    pub code: &'static str,
    /// A short, human-readable title for the finding.
    pub title: &'static str,
    /// The probe that emits this code.
    pub category: ProbeKind,
    /// What the finding means and why it matters.
    pub description: &'static str,
    /// Clear, actionable steps the user can take to fix the issue.
    pub remediation: &'static str,
}

/// The centralized, static knowledge base of all possible findings.
static FINDINGS: &[FindingDetail] = &[
    // --- SQL Injection ---
    FindingDetail {
        code: "SQLI_ERROR_BASED",
        title: "Error-Based SQL Injection",
        category: ProbeKind::Sqli,
        description: "Injected SQL syntax caused the database to return an error message to the browser. The input reaches a query unescaped, and the error text also reveals the database engine.",
        remediation: "Use parameterized queries or prepared statements for every query that includes user input, and disable detailed database errors in production."
    },
    FindingDetail {
        code: "SQLI_TIME_BASED",
        title: "Blind (Time-Based) SQL Injection",
        category: ProbeKind::Sqli,
        description: "Sleep payloads consistently delayed the response well beyond the normal latency. An attacker can extract data one bit at a time even though no error is shown.",
        remediation: "Replace string-built queries with parameterized queries and apply strict input validation on the affected parameter."
    },
    FindingDetail {
        code: "SQLI_UNION_BASED",
        title: "UNION-Based SQL Injection",
        category: ProbeKind::Sqli,
        description: "A UNION SELECT with a specific column count was accepted by the query. This lets an attacker append their own SELECT and read arbitrary tables.",
        remediation: "Use parameterized queries, run the application with a least-privilege database account, and never interpolate input into SQL."
    },
    // --- Cross-Site Scripting ---
    FindingDetail {
        code: "XSS_REFLECTED",
        title: "Reflected Cross-Site Scripting",
        category: ProbeKind::Xss,
        description: "A payload sent in a request was echoed back unescaped into an executable position of the page. A crafted link can run script in a victim's session.",
        remediation: "Context-aware output encoding for every reflected value (HTML body, attribute, script), plus a Content-Security-Policy that forbids inline script."
    },
    FindingDetail {
        code: "DOM_XSS_SOURCE_TO_SINK",
        title: "DOM XSS: Source Flows Into Sink",
        category: ProbeKind::Xss,
        description: "Client-side script passes an attacker-controllable value such as location.hash directly into an HTML-writing sink such as innerHTML or eval.",
        remediation: "Use textContent or safe DOM APIs instead of innerHTML/document.write, and sanitize URL-derived values with a vetted library before rendering."
    },
    FindingDetail {
        code: "DOM_XSS_PROXIMITY",
        title: "DOM XSS: Source Near Sink",
        category: ProbeKind::Xss,
        description: "Script reads an attacker-controllable value shortly before writing HTML. The value may reach the sink through an intermediate variable.",
        remediation: "Review the data flow between the source and the sink; prefer textContent and sanitize any URL-derived value before it is rendered."
    },
    // --- SSL/TLS ---
    FindingDetail {
        code: "SSL_UNTRUSTED_CERTIFICATE",
        title: "Untrusted Certificate",
        category: ProbeKind::SslTls,
        description: "The certificate did not verify against the system trust store or does not match the hostname. Browsers show a full-page warning and users are trained to click through, enabling interception.",
        remediation: "Install a certificate issued by a trusted CA for the exact hostname, including the full intermediate chain."
    },
    FindingDetail {
        code: "SSL_NO_CERTIFICATE",
        title: "No Certificate Presented",
        category: ProbeKind::SslTls,
        description: "The TLS handshake completed without the server presenting a certificate, so clients cannot authenticate the server.",
        remediation: "Configure the web server or load balancer with a valid certificate for this hostname."
    },
    FindingDetail {
        code: "SSL_EXPIRED",
        title: "Certificate Expired",
        category: ProbeKind::SslTls,
        description: "The certificate is past its expiry date. Browsers will refuse the connection or show a prominent security warning.",
        remediation: "Renew the certificate immediately and automate renewal (for example with an ACME client such as Certbot)."
    },
    FindingDetail {
        code: "SSL_NOT_YET_VALID",
        title: "Certificate Not Yet Valid",
        category: ProbeKind::SslTls,
        description: "The certificate's validity period has not started. This usually means a clock problem or a certificate deployed too early.",
        remediation: "Check the server clock and deploy a certificate whose validity window includes the current date."
    },
    FindingDetail {
        code: "SSL_EXPIRING_SOON",
        title: "Certificate Expiring Soon",
        category: ProbeKind::SslTls,
        description: "The certificate expires within the next 30 days. An outage is imminent if it is not renewed.",
        remediation: "Renew the certificate now and set up automated renewal with monitoring."
    },
    FindingDetail {
        code: "SSL_EXPIRING",
        title: "Certificate Expiring",
        category: ProbeKind::SslTls,
        description: "The certificate expires within the next 90 days.",
        remediation: "Schedule renewal, ideally through an automated ACME client."
    },
    FindingDetail {
        code: "SSL_WEAK_SIGNATURE",
        title: "Weak Certificate Signature",
        category: ProbeKind::SslTls,
        description: "The certificate is signed with MD5 or SHA-1. Collisions against these hashes are practical, so such signatures can be forged.",
        remediation: "Reissue the certificate with a SHA-256 (or stronger) signature."
    },
    FindingDetail {
        code: "SSL_WEAK_KEY",
        title: "Weak RSA Key",
        category: ProbeKind::SslTls,
        description: "The certificate's RSA key is shorter than 2048 bits and within reach of factoring attacks.",
        remediation: "Generate a new key of at least 2048 bits (3072 recommended) or switch to an ECDSA key, and reissue the certificate."
    },
    FindingDetail {
        code: "SSL_LEGACY_PROTOCOL",
        title: "Legacy Protocol Enabled",
        category: ProbeKind::SslTls,
        description: "The server still negotiates SSLv3, TLS 1.0 or TLS 1.1. These versions have known weaknesses (POODLE, BEAST) and are deprecated.",
        remediation: "Disable everything below TLS 1.2 in the server configuration and enable TLS 1.3 where possible."
    },
    // --- HTTP Security Headers ---
    FindingDetail {
        code: "HEADERS_HSTS_MISSING",
        title: "HSTS Header Missing",
        category: ProbeKind::Headers,
        description: "HTTP Strict Transport Security tells browsers to only use HTTPS for this site. Without it, a first visit over plain HTTP can be downgraded by a man-in-the-middle.",
        remediation: "Send 'Strict-Transport-Security: max-age=31536000; includeSubDomains' on every HTTPS response."
    },
    FindingDetail {
        code: "HEADERS_CSP_MISSING",
        title: "Content-Security-Policy Missing",
        category: ProbeKind::Headers,
        description: "A Content Security Policy limits where scripts, styles and other resources may load from, and is one of the strongest defenses against XSS.",
        remediation: "Start with a restrictive policy such as \"default-src 'self'\" and relax it only for the origins the site actually needs."
    },
    FindingDetail {
        code: "HEADERS_X_FRAME_OPTIONS_MISSING",
        title: "X-Frame-Options Missing",
        category: ProbeKind::Headers,
        description: "Without this header the site can be embedded in an iframe on another domain, enabling clickjacking.",
        remediation: "Set 'X-Frame-Options: DENY' or 'SAMEORIGIN', or use the CSP 'frame-ancestors' directive."
    },
    FindingDetail {
        code: "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING",
        title: "X-Content-Type-Options Missing",
        category: ProbeKind::Headers,
        description: "This header prevents browsers from guessing the content type of a response (MIME sniffing), which can turn an uploaded file into executable script.",
        remediation: "Add 'X-Content-Type-Options: nosniff' to every response."
    },
    FindingDetail {
        code: "HEADERS_REFERRER_POLICY_MISSING",
        title: "Referrer-Policy Missing",
        category: ProbeKind::Headers,
        description: "Without a Referrer-Policy the full URL, including query strings that may carry tokens, can leak to third-party sites.",
        remediation: "Set 'Referrer-Policy: strict-origin-when-cross-origin' or 'no-referrer'."
    },
    FindingDetail {
        code: "HEADERS_PERMISSIONS_POLICY_MISSING",
        title: "Permissions-Policy Missing",
        category: ProbeKind::Headers,
        description: "Permissions-Policy restricts which browser features (camera, geolocation, payment) the page and its iframes may use.",
        remediation: "Add a Permissions-Policy that disables features the site does not use, e.g. 'camera=(), microphone=(), geolocation=()'."
    },
    FindingDetail {
        code: "HEADERS_X_XSS_PROTECTION_MISSING",
        title: "X-XSS-Protection Missing",
        category: ProbeKind::Headers,
        description: "This legacy header controlled the XSS filter of older browsers. Modern browsers ignore it, but older clients still benefit.",
        remediation: "Send 'X-XSS-Protection: 0' together with a strong CSP, or '1; mode=block' if legacy clients matter."
    },
    FindingDetail {
        code: "HEADERS_INFO_DISCLOSURE",
        title: "Server Information Disclosure",
        category: ProbeKind::Headers,
        description: "Response headers reveal the server software and version, which helps attackers pick known exploits.",
        remediation: "Remove X-Powered-By and X-AspNet-Version headers and configure the server to omit its version from the Server header."
    },
    FindingDetail {
        code: "HEADERS_INSECURE_COOKIE",
        title: "Insecure Cookie Attributes",
        category: ProbeKind::Headers,
        description: "A cookie is set without Secure, HttpOnly or SameSite. It may be sent over plain HTTP, read by injected script, or attached to cross-site requests.",
        remediation: "Set cookies with 'Secure; HttpOnly; SameSite=Lax' (or Strict) unless a specific cookie genuinely needs script access."
    },
    // --- Port Scan ---
    FindingDetail {
        code: "PORT_RISKY_SERVICE",
        title: "Risky Service Exposed",
        category: ProbeKind::PortScan,
        description: "A remote-access or file-sharing service (FTP, Telnet, SMB, RDP, VNC) is reachable from the internet. These services are frequent targets of brute-force and exploit campaigns.",
        remediation: "Close the port at the firewall or restrict it to a VPN or allow-listed addresses. Replace FTP and Telnet with SFTP and SSH."
    },
    FindingDetail {
        code: "PORT_DATABASE_EXPOSED",
        title: "Database Port Exposed",
        category: ProbeKind::PortScan,
        description: "A database or cache service is directly reachable from the internet.",
        remediation: "Bind the service to a private interface and allow access only from application servers."
    },
    FindingDetail {
        code: "PORT_SERVICE_EXPOSED",
        title: "Non-Web Service Exposed",
        category: ProbeKind::PortScan,
        description: "A service other than the web server accepts connections. Every exposed service adds attack surface.",
        remediation: "Confirm the service must be public; otherwise close the port or restrict it by source address."
    },
    // --- Quick Wins ---
    FindingDetail {
        code: "ROBOTS_SENSITIVE_PATHS",
        title: "robots.txt Reveals Sensitive Paths",
        category: ProbeKind::QuickWins,
        description: "robots.txt is public and lists paths that look sensitive (admin areas, backups, configuration). It acts as a map for attackers.",
        remediation: "Protect sensitive paths with authentication instead of hiding them, and remove them from robots.txt."
    },
    FindingDetail {
        code: "ROBOTS_EXCESSIVE_PATHS",
        title: "robots.txt Lists Many Paths",
        category: ProbeKind::QuickWins,
        description: "A very large robots.txt reveals much of the site structure.",
        remediation: "Keep robots.txt minimal and rely on access control for anything private."
    },
    FindingDetail {
        code: "CLICKJACKING_UNPROTECTED",
        title: "Clickjacking Possible",
        category: ProbeKind::QuickWins,
        description: "Neither X-Frame-Options nor a CSP frame-ancestors directive is present, so any site can frame this page and trick users into clicking hidden controls.",
        remediation: "Add 'X-Frame-Options: DENY' or \"Content-Security-Policy: frame-ancestors 'self'\"."
    },
    FindingDetail {
        code: "CLICKJACKING_PERMISSIVE",
        title: "Framing Explicitly Allowed",
        category: ProbeKind::QuickWins,
        description: "X-Frame-Options is set to a value that permits framing by any origin.",
        remediation: "Change X-Frame-Options to DENY or SAMEORIGIN."
    },
    FindingDetail {
        code: "HTTP_METHOD_DANGEROUS",
        title: "Dangerous HTTP Method Allowed",
        category: ProbeKind::QuickWins,
        description: "The server advertises methods such as PUT, DELETE, TRACE, CONNECT or PATCH. Unless an API needs them, they can allow file uploads, deletions or request tracing.",
        remediation: "Restrict allowed methods to GET, HEAD, POST and OPTIONS at the web server unless others are required."
    },
    FindingDetail {
        code: "HTTP_TRACE_ENABLED",
        title: "HTTP TRACE Enabled",
        category: ProbeKind::QuickWins,
        description: "TRACE echoes the request, including headers, back to the client (Cross-Site Tracing). It can expose cookies and auth headers to script.",
        remediation: "Disable TRACE (e.g. 'TraceEnable off' in Apache)."
    },
    FindingDetail {
        code: "SECURITY_TXT_MISSING",
        title: "security.txt Missing",
        category: ProbeKind::QuickWins,
        description: "No security.txt (RFC 9116) with a Contact field was found, so researchers have no clear channel to report vulnerabilities.",
        remediation: "Publish /.well-known/security.txt with at least 'Contact:' and 'Expires:' fields."
    },
    // --- Directory Enumeration ---
    FindingDetail {
        code: "DIRENUM_SENSITIVE_FILE",
        title: "Sensitive File Exposed",
        category: ProbeKind::DirectoryEnum,
        description: "A configuration, version-control, backup, database or log file is publicly downloadable. These files often contain credentials or source code.",
        remediation: "Remove the file from the web root or deny access to it in the server configuration, then rotate any secrets it contained."
    },
    FindingDetail {
        code: "DIRENUM_ADMIN_PANEL",
        title: "Admin Panel Reachable",
        category: ProbeKind::DirectoryEnum,
        description: "An administrative interface is reachable from the internet and is a prime target for credential stuffing.",
        remediation: "Restrict the panel to a VPN or allow-listed addresses and enforce strong authentication with MFA."
    },
    FindingDetail {
        code: "DIRENUM_DIRECTORY",
        title: "Directory Accessible",
        category: ProbeKind::DirectoryEnum,
        description: "A common directory (backups, logs, temp, uploads) responds successfully and may list or serve internal files.",
        remediation: "Disable directory listing and confirm the directory should be public."
    },
    // --- Passwords ---
    FindingDetail {
        code: "PASSWORD_HTTP_TRANSMISSION",
        title: "Password Sent Over HTTP",
        category: ProbeKind::Passwords,
        description: "A password form is served or submitted over unencrypted HTTP, so credentials travel in clear text.",
        remediation: "Serve the entire site over HTTPS, point every form action at https:// URLs and enable HSTS."
    },
    FindingDetail {
        code: "PASSWORD_PREFILLED",
        title: "Pre-Filled Password Field",
        category: ProbeKind::Passwords,
        description: "A password input is delivered with a value already in the page source, where anyone viewing the page can read it.",
        remediation: "Never render password values into HTML. Remove the value attribute from password inputs."
    },
    FindingDetail {
        code: "PASSWORD_NO_POLICY",
        title: "No Visible Password Policy",
        category: ProbeKind::Passwords,
        description: "The page with password fields shows no password requirements, which suggests weak passwords are accepted.",
        remediation: "Enforce and display a password policy (minimum length of 12, breached-password screening)."
    },
    FindingDetail {
        code: "PASSWORD_AUTOCOMPLETE",
        title: "Password Autocomplete Not Configured",
        category: ProbeKind::Passwords,
        description: "The password field lacks an explicit autocomplete value, so browsers and password managers cannot tell whether it is a login or a new password.",
        remediation: "Set autocomplete='current-password' on login forms and autocomplete='new-password' on registration and change forms."
    },
    FindingDetail {
        code: "PASSWORD_BREACHED",
        title: "Breached Password",
        category: ProbeKind::Passwords,
        description: "A checked password appears in public breach corpora and is tried first in credential-stuffing attacks.",
        remediation: "Change the password everywhere it is used and screen new passwords against breach lists at registration."
    },
    // --- Database ---
    FindingDetail {
        code: "DB_CONNECTION_STRING_EXPOSED",
        title: "Database Connection String Exposed",
        category: ProbeKind::Database,
        description: "A database connection string appears in client-visible page source and may include host names and credentials.",
        remediation: "Move connection strings to server-side configuration or a secret store and rotate the exposed credentials."
    },
    FindingDetail {
        code: "DB_ERROR_EXPOSED",
        title: "Database Errors Exposed",
        category: ProbeKind::Database,
        description: "Malformed input makes the application display raw database errors, revealing the engine and query structure.",
        remediation: "Catch database exceptions, log them server-side and return a generic error page."
    },
    FindingDetail {
        code: "DB_ERROR_ON_PAGE",
        title: "Database Error on Page",
        category: ProbeKind::Database,
        description: "The page shows database error text even without injected input.",
        remediation: "Fix the failing query and disable detailed error output in production."
    },
    FindingDetail {
        code: "NOSQL_INJECTION",
        title: "Possible NoSQL Injection",
        category: ProbeKind::Database,
        description: "Operator payloads such as {\"$ne\": null} produced MongoDB or BSON errors, so the parameter likely reaches a query object unsanitized.",
        remediation: "Validate parameter types, reject keys starting with '$', and use a sanitization layer such as mongo-sanitize."
    },
];

/// Retrieves the full detail for a given finding code from the static knowledge base.
pub fn get_finding_detail(code: &str) -> Option<&'static FindingDetail> {
    FINDINGS.iter().find(|f| f.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const EMITTED: &[&str] = &[
        "SQLI_ERROR_BASED",
        "SQLI_TIME_BASED",
        "SQLI_UNION_BASED",
        "XSS_REFLECTED",
        "DOM_XSS_SOURCE_TO_SINK",
        "DOM_XSS_PROXIMITY",
        "SSL_UNTRUSTED_CERTIFICATE",
        "SSL_NO_CERTIFICATE",
        "SSL_EXPIRED",
        "SSL_NOT_YET_VALID",
        "SSL_EXPIRING_SOON",
        "SSL_EXPIRING",
        "SSL_WEAK_SIGNATURE",
        "SSL_WEAK_KEY",
        "SSL_LEGACY_PROTOCOL",
        "HEADERS_HSTS_MISSING",
        "HEADERS_CSP_MISSING",
        "HEADERS_X_FRAME_OPTIONS_MISSING",
        "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING",
        "HEADERS_REFERRER_POLICY_MISSING",
        "HEADERS_PERMISSIONS_POLICY_MISSING",
        "HEADERS_X_XSS_PROTECTION_MISSING",
        "HEADERS_INFO_DISCLOSURE",
        "HEADERS_INSECURE_COOKIE",
        "PORT_RISKY_SERVICE",
        "PORT_DATABASE_EXPOSED",
        "PORT_SERVICE_EXPOSED",
        "ROBOTS_SENSITIVE_PATHS",
        "ROBOTS_EXCESSIVE_PATHS",
        "CLICKJACKING_UNPROTECTED",
        "CLICKJACKING_PERMISSIVE",
        "HTTP_METHOD_DANGEROUS",
        "HTTP_TRACE_ENABLED",
        "SECURITY_TXT_MISSING",
        "DIRENUM_SENSITIVE_FILE",
        "DIRENUM_ADMIN_PANEL",
        "DIRENUM_DIRECTORY",
        "PASSWORD_HTTP_TRANSMISSION",
        "PASSWORD_PREFILLED",
        "PASSWORD_NO_POLICY",
        "PASSWORD_AUTOCOMPLETE",
        "PASSWORD_BREACHED",
        "DB_CONNECTION_STRING_EXPOSED",
        "DB_ERROR_EXPOSED",
        "DB_ERROR_ON_PAGE",
        "NOSQL_INJECTION",
    ];

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<&str> = FINDINGS.iter().map(|f| f.code).collect();
        assert_eq!(codes.len(), FINDINGS.len());
    }

    #[test]
    fn every_emitted_code_is_documented() {
        for code in EMITTED {
            assert!(get_finding_detail(code).is_some(), "{code} has no knowledge base entry");
        }
        assert_eq!(EMITTED.len(), FINDINGS.len());
    }

    #[test]
    fn categories_match_code_prefixes() {
        assert_eq!(get_finding_detail("SQLI_TIME_BASED").unwrap().category, ProbeKind::Sqli);
        assert_eq!(get_finding_detail("NOSQL_INJECTION").unwrap().category, ProbeKind::Database);
        assert!(get_finding_detail("DNS_SPF_MISSING").is_none());
    }
}
