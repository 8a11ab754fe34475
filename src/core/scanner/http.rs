// src/core/scanner/http.rs

//! HTTP plumbing shared by the web probes: client construction, page fetches,
//! form discovery and the injection points derived from them.
//!
//! Parsed `scraper::Html` documents are not `Send`, so every function that
//! parses HTML here is synchronous and returns owned data.

use std::net::SocketAddr;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, StatusCode};
use scraper::{Html, Selector};
use tokio::time::Instant;
use tracing::{debug, error, warn};
use url::{Host, Url};

use super::ProbeContext;

static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form").unwrap());
static FIELD_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("input, textarea, select").unwrap());

/// Value submitted for fields we are not injecting into and that have no
/// value of their own.
const FILLER_VALUE: &str = "test";

const MAX_REDIRECTS: usize = 5;

/// Whether `candidate` stays on the same host as `base`, on the same port or
/// the default port of its scheme. Anything else could land on an address
/// the target guard never saw.
pub fn same_site(base: &Url, candidate: &Url) -> bool {
    if !matches!(candidate.scheme(), "http" | "https") || candidate.host_str() != base.host_str() {
        return false;
    }
    candidate.port().is_none() || candidate.port_or_known_default() == base.port_or_known_default()
}

/// Builds the connection-pooled client a probe uses for all of its requests.
///
/// The target's host name is pinned to the addresses that passed validation,
/// and redirects are only followed while they stay on the target's host.
pub fn build_client(ctx: &ProbeContext, follow_redirects: bool) -> Result<Client, String> {
    let config = &ctx.config;
    let redirect = if follow_redirects {
        let scope = ctx.target.url().clone();
        Policy::custom(move |attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                attempt.stop()
            } else if same_site(&scope, attempt.url()) {
                attempt.follow()
            } else {
                warn!(location = %attempt.url(), "Not following redirect away from the target host.");
                attempt.stop()
            }
        })
    } else {
        Policy::none()
    };

    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
        .connect_timeout(config.request_timeout())
        .redirect(redirect);

    if let Some(Host::Domain(domain)) = ctx.target.url().host() {
        // Port 0 takes the port from each request URL.
        let pinned: Vec<SocketAddr> = ctx.target.addrs().iter().map(|ip| SocketAddr::new(*ip, 0)).collect();
        builder = builder.resolve_to_addrs(domain, &pinned);
    }

    builder.build().map_err(|e| {
        error!(error = %e, "Failed to build HTTP client.");
        format!("Failed to build HTTP client: {}", e)
    })
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    pub elapsed: Duration,
}

/// Sends `request`, reads the whole body and records how long it took.
pub async fn fetch(request: RequestBuilder) -> Result<Page, reqwest::Error> {
    let started = Instant::now();
    let response = request.send().await?;
    let url = response.url().clone();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await?;
    Ok(Page {
        url,
        status,
        headers,
        body,
        elapsed: started.elapsed(),
    })
}

pub async fn get_page(client: &Client, url: &Url) -> Result<Page, reqwest::Error> {
    fetch(client.get(url.clone())).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    /// Lowercased `type` attribute, or the tag name for textarea/select.
    pub kind: String,
    pub value: String,
}

impl FormField {
    /// Free-text fields worth injecting into.
    pub fn is_injectable(&self) -> bool {
        !matches!(
            self.kind.as_str(),
            "hidden" | "submit" | "button" | "reset" | "file" | "image" | "checkbox" | "radio" | "select"
        )
    }

    /// Fields a browser would include when submitting the form.
    fn is_submitted(&self) -> bool {
        !matches!(self.kind.as_str(), "button" | "reset" | "file" | "image")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlForm {
    pub action: Url,
    pub method: FormMethod,
    pub fields: Vec<FormField>,
}

impl HtmlForm {
    /// Key/value pairs for a submission that puts `payload` into `target_field`.
    pub fn submission(&self, target_field: &str, payload: &str) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|f| f.is_submitted())
            .map(|f| {
                let value = if f.name == target_field {
                    payload.to_string()
                } else if f.value.is_empty() {
                    FILLER_VALUE.to_string()
                } else {
                    f.value.clone()
                };
                (f.name.clone(), value)
            })
            .collect()
    }
}

/// Extracts every form on a page, resolving actions against `base`.
pub fn discover_forms(body: &str, base: &Url) -> Vec<HtmlForm> {
    let document = Html::parse_document(body);
    document
        .select(&FORM_SELECTOR)
        .map(|form| {
            let element = form.value();
            let action = element
                .attr("action")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .and_then(|a| base.join(a).ok())
                .unwrap_or_else(|| base.clone());
            let method = match element.attr("method") {
                Some(m) if m.trim().eq_ignore_ascii_case("post") => FormMethod::Post,
                _ => FormMethod::Get,
            };
            let fields = form
                .select(&FIELD_SELECTOR)
                .filter_map(|input| {
                    let input = input.value();
                    let name = input.attr("name")?.to_string();
                    let kind = match input.name() {
                        "textarea" | "select" => input.name().to_string(),
                        _ => input.attr("type").unwrap_or("text").to_ascii_lowercase(),
                    };
                    let value = input.attr("value").unwrap_or_default().to_string();
                    Some(FormField { name, kind, value })
                })
                .collect();
            HtmlForm { action, method, fields }
        })
        .collect()
}

/// Returns `url` with the query parameter `name` set to `value`, keeping every
/// other parameter and its order.
pub fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == name { value.to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let mut next = url.clone();
    next.query_pairs_mut().clear().extend_pairs(&pairs);
    next
}

/// A single place a payload can be injected.
#[derive(Debug, Clone)]
pub enum InjectionPoint {
    UrlParameter {
        url: Url,
        name: String,
        original: String,
    },
    FormField {
        form: HtmlForm,
        name: String,
        original: String,
    },
}

impl InjectionPoint {
    /// Location string used on findings, e.g. `url_parameter:id` or `form:/login`.
    pub fn location(&self) -> String {
        match self {
            InjectionPoint::UrlParameter { name, .. } => format!("url_parameter:{name}"),
            InjectionPoint::FormField { form, .. } => format!("form:{}", form.action.path()),
        }
    }

    /// Unique identifier of the point, including the form field name.
    pub fn identifier(&self) -> String {
        match self {
            InjectionPoint::UrlParameter { .. } => self.location(),
            InjectionPoint::FormField { form, name, .. } => format!("form:{}#{}", form.action.path(), name),
        }
    }

    pub fn parameter(&self) -> &str {
        match self {
            InjectionPoint::UrlParameter { name, .. } | InjectionPoint::FormField { name, .. } => name,
        }
    }

    pub fn original_value(&self) -> &str {
        match self {
            InjectionPoint::UrlParameter { original, .. } | InjectionPoint::FormField { original, .. } => original,
        }
    }

    pub fn request(&self, client: &Client, payload: &str) -> RequestBuilder {
        match self {
            InjectionPoint::UrlParameter { url, name, .. } => client.get(with_query_param(url, name, payload)),
            InjectionPoint::FormField { form, name, .. } => {
                let pairs = form.submission(name, payload);
                match form.method {
                    FormMethod::Get => {
                        let mut action = form.action.clone();
                        action.query_pairs_mut().clear().extend_pairs(&pairs);
                        client.get(action)
                    }
                    FormMethod::Post => client.post(form.action.clone()).form(&pairs),
                }
            }
        }
    }

    pub async fn send(&self, client: &Client, payload: &str) -> Result<Page, reqwest::Error> {
        fetch(self.request(client, payload)).await
    }
}

/// Every URL parameter of the page plus every injectable field of its forms.
/// Forms that submit to another host are left out.
pub fn injection_points(page: &Page) -> Vec<InjectionPoint> {
    let mut points = Vec::new();
    let mut seen = Vec::new();
    for (name, value) in page.url.query_pairs() {
        if seen.contains(&name) {
            continue;
        }
        points.push(InjectionPoint::UrlParameter {
            url: page.url.clone(),
            name: name.to_string(),
            original: value.to_string(),
        });
        seen.push(name);
    }

    for form in discover_forms(&page.body, &page.url) {
        if !same_site(&page.url, &form.action) {
            debug!(action = %form.action, "Skipping form that submits off the target host.");
            continue;
        }
        for field in form.fields.iter().filter(|f| f.is_injectable()) {
            points.push(InjectionPoint::FormField {
                form: form.clone(),
                name: field.name.clone(),
                original: if field.value.is_empty() {
                    FILLER_VALUE.to_string()
                } else {
                    field.value.clone()
                },
            });
        }
    }
    points
}

/// Shortens `text` to at most `max` characters for use as finding evidence.
pub fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::core::scanner::fixture::{serve, Reply};
    use crate::core::target::ScanTarget;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const LOGIN_PAGE: &str = r#"
        <html><body>
          <form action="/login" method="POST">
            <input type="hidden" name="csrf" value="tok123">
            <input type="text" name="username">
            <input type="password" name="password">
            <input type="submit" name="go" value="Sign in">
          </form>
          <form action="search">
            <input name="q" value="shoes">
            <textarea name="comment"></textarea>
          </form>
        </body></html>"#;

    fn page(url: &str, body: &str) -> Page {
        Page {
            url: Url::parse(url).unwrap(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.to_string(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn discovers_forms_with_resolved_actions() {
        let base = Url::parse("https://example.com/account/").unwrap();
        let forms = discover_forms(LOGIN_PAGE, &base);
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].action.as_str(), "https://example.com/login");
        assert_eq!(forms[0].method, FormMethod::Post);
        assert_eq!(forms[1].action.as_str(), "https://example.com/account/search");
        assert_eq!(forms[1].method, FormMethod::Get);
        assert_eq!(forms[1].fields[1].kind, "textarea");
    }

    #[test]
    fn submission_carries_hidden_values_and_fills_blanks() {
        let base = Url::parse("https://example.com/").unwrap();
        let forms = discover_forms(LOGIN_PAGE, &base);
        let pairs = forms[0].submission("username", "' OR 1=1--");
        assert!(pairs.contains(&("csrf".to_string(), "tok123".to_string())));
        assert!(pairs.contains(&("username".to_string(), "' OR 1=1--".to_string())));
        assert!(pairs.contains(&("password".to_string(), "test".to_string())));
        assert!(pairs.contains(&("go".to_string(), "Sign in".to_string())));
    }

    #[test]
    fn injection_points_cover_params_and_text_fields() {
        let page = page("https://example.com/item?id=7&sort=asc&id=8", LOGIN_PAGE);
        let points = injection_points(&page);
        let ids: Vec<String> = points.iter().map(InjectionPoint::identifier).collect();
        assert_eq!(
            ids,
            vec![
                "url_parameter:id",
                "url_parameter:sort",
                "form:/login#username",
                "form:/login#password",
                "form:/search#q",
                "form:/search#comment",
            ]
        );
        assert_eq!(points[0].original_value(), "7");
        assert_eq!(points[2].location(), "form:/login");
    }

    #[test]
    fn with_query_param_replaces_only_the_named_parameter() {
        let url = Url::parse("https://example.com/p?a=1&b=2").unwrap();
        let next = with_query_param(&url, "b", "<x>");
        assert_eq!(next.query(), Some("a=1&b=%3Cx%3E"));
    }

    #[test]
    fn same_site_requires_the_same_host_and_port() {
        let base = Url::parse("http://example.com:8080/app").unwrap();
        let allowed = |s: &str| same_site(&base, &Url::parse(s).unwrap());
        assert!(allowed("http://example.com:8080/login"));
        assert!(allowed("https://example.com/login"));
        assert!(!allowed("http://example.com:9090/"));
        assert!(!allowed("http://www.example.com:8080/"));
        assert!(!allowed("http://169.254.169.254/latest/meta-data/"));
        assert!(!allowed("ftp://example.com/"));
    }

    #[test]
    fn forms_posting_to_other_hosts_are_not_injection_points() {
        let body = r#"
            <form action="http://10.0.0.5/login" method="POST"><input name="user"></form>
            <form action="/search"><input name="q"></form>"#;
        let page = page("https://example.com/", body);
        let ids: Vec<String> = injection_points(&page).iter().map(InjectionPoint::identifier).collect();
        assert_eq!(ids, vec!["form:/search#q"]);
    }

    fn context(url: &Url, addrs: &[&str]) -> ProbeContext {
        let addrs = addrs.iter().map(|a| a.parse().unwrap()).collect();
        ProbeContext::new(
            ScanTarget::from_validated(url.clone(), addrs),
            Arc::new(ScanConfig::default()),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn redirects_off_the_target_host_are_not_followed() {
        let internal_hits = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&internal_hits);
        let internal = serve(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Reply::ok("metadata")
        })
        .await;
        let location = internal.to_string();
        let front = serve(move |_| Reply::redirect(location.clone())).await;

        let ctx = context(&front, &["93.184.216.34"]);
        let client = build_client(&ctx, true).unwrap();
        let page = get_page(&client, &front).await.unwrap();

        assert_eq!(page.status, StatusCode::FOUND);
        assert_eq!(page.url, front);
        assert_eq!(internal_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn redirects_on_the_target_host_are_followed() {
        let base = serve(|req| match req.path() {
            "/" => Reply::redirect("/home"),
            _ => Reply::ok("welcome"),
        })
        .await;
        let ctx = context(&base, &["93.184.216.34"]);
        let client = build_client(&ctx, true).unwrap();
        let page = get_page(&client, &base).await.unwrap();
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.url.path(), "/home");
        assert_eq!(page.body, "welcome");
    }

    #[tokio::test]
    async fn host_names_connect_to_the_validated_addresses() {
        let served = serve(|_| Reply::ok("pinned")).await;
        let port = served.port().unwrap();
        let url = Url::parse(&format!("http://rampart-pinned.invalid:{port}/")).unwrap();

        let ctx = context(&url, &["127.0.0.1"]);
        let client = build_client(&ctx, false).unwrap();
        let page = get_page(&client, &url).await.unwrap();
        assert_eq!(page.body, "pinned");
    }

    #[test]
    fn excerpt_is_char_safe() {
        assert_eq!(excerpt("  héllo wörld  ", 5), "héllo...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
