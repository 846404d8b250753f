//! Reverse-proxy route installation and request forwarding.
//!
//! The [`ProxyTable`] maps claimed paths to backend base URLs. A path ending
//! in `/*` claims its whole subtree; any other path matches exactly.
//! [`ProxyTable::install_all`] turns configuration declarations into live
//! routes and is safe to call again on every reload: a path that is already
//! live keeps its existing handler instead of failing.
//!
//! [`forward`] sends one HTTP request to a backend, preserving method, path,
//! query, headers and body, and copies the response back.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{self as http, header, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use parking_lot::RwLock;

use crate::config::ProxyRouteConfig;

/// A live proxy route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    /// Path as declared, including any `/*` suffix.
    pub path: String,
    /// Backend base URL.
    pub target: String,
}

impl ProxyRoute {
    fn prefix(&self) -> Option<&str> {
        self.path.strip_suffix("/*")
    }

    fn matches(&self, path: &str) -> bool {
        match self.prefix() {
            Some(prefix) => {
                path == prefix
                    || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
                    || prefix.is_empty()
            }
            None => self.path == path,
        }
    }
}

/// What happened to one declaration during installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A new route was installed.
    Installed,
    /// The path was already live; the existing handler was kept.
    AlreadyInstalled,
    /// The declaration was not installed.
    Skipped(String),
}

/// Per-declaration result of [`ProxyTable::install_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Declared path.
    pub path: String,
    /// Outcome.
    pub outcome: InstallOutcome,
}

/// Live proxy routes.
///
/// Lookups take a cheap snapshot; installation builds a complete new map off
/// the lock and swaps it in.
#[derive(Debug, Default)]
pub struct ProxyTable {
    routes: RwLock<Arc<BTreeMap<String, Arc<ProxyRoute>>>>,
}

impl ProxyTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install every enabled declaration.
    ///
    /// Disabled declarations and ones with an empty path, an empty target or
    /// a target that is not an http(s) URL are skipped with a log line. A
    /// path that is already live, from an earlier call or earlier in the same
    /// list, keeps the handler it has. Live paths that no declaration names
    /// any more are removed. `on_installed` is called with every path that is
    /// live after this call.
    pub fn install_all<F>(&self, routes: &[ProxyRouteConfig], mut on_installed: F) -> Vec<InstallReport>
    where
        F: FnMut(&str),
    {
        let mut next = BTreeMap::clone(&self.snapshot());
        let mut reports = Vec::with_capacity(routes.len());
        let mut live = BTreeSet::new();

        for decl in routes {
            let outcome = install_one(&mut next, decl);
            match &outcome {
                InstallOutcome::Installed => {
                    tracing::info!(path = %decl.path, target = %decl.target_url, "Proxy route installed");
                    if live.insert(decl.path.clone()) {
                        on_installed(&decl.path);
                    }
                }
                InstallOutcome::AlreadyInstalled => {
                    tracing::debug!(path = %decl.path, "Proxy route already installed");
                    if live.insert(decl.path.clone()) {
                        on_installed(&decl.path);
                    }
                }
                InstallOutcome::Skipped(reason) => {
                    tracing::info!(path = %decl.path, reason = %reason, "Proxy route skipped");
                }
            }
            reports.push(InstallReport {
                path: decl.path.clone(),
                outcome,
            });
        }

        next.retain(|path, _| {
            let keep = live.contains(path);
            if !keep {
                tracing::info!(path = %path, "Proxy route removed");
            }
            keep
        });

        *self.routes.write() = Arc::new(next);
        reports
    }

    /// Find the route for a request path.
    ///
    /// An exact path wins; otherwise the longest matching `/*` prefix.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<Arc<ProxyRoute>> {
        let routes = self.snapshot();
        if let Some(route) = routes.get(path) {
            if route.prefix().is_none() {
                return Some(Arc::clone(route));
            }
        }
        routes
            .values()
            .filter(|route| route.prefix().is_some() && route.matches(path))
            .max_by_key(|route| route.path.len())
            .cloned()
    }

    /// Paths currently live, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    /// Number of live routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no route is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<BTreeMap<String, Arc<ProxyRoute>>> {
        Arc::clone(&self.routes.read())
    }
}

fn install_one(
    routes: &mut BTreeMap<String, Arc<ProxyRoute>>,
    decl: &ProxyRouteConfig,
) -> InstallOutcome {
    if !decl.enable {
        return InstallOutcome::Skipped("disabled".into());
    }
    if decl.path.is_empty() || decl.target_url.is_empty() {
        return InstallOutcome::Skipped("empty path or target".into());
    }
    if !decl.path.starts_with('/') {
        return InstallOutcome::Skipped("path must start with '/'".into());
    }
    if reqwest::Url::parse(&decl.target_url)
        .map(|url| !matches!(url.scheme(), "http" | "https"))
        .unwrap_or(true)
    {
        return InstallOutcome::Skipped(format!("invalid target url: {}", decl.target_url));
    }

    if let Some(existing) = routes.get(&decl.path) {
        if existing.target != decl.target_url {
            tracing::warn!(
                path = %decl.path,
                current = %existing.target,
                requested = %decl.target_url,
                "Proxy path already installed with a different target; keeping current handler"
            );
        }
        return InstallOutcome::AlreadyInstalled;
    }

    routes.insert(
        decl.path.clone(),
        Arc::new(ProxyRoute {
            path: decl.path.clone(),
            target: decl.target_url.clone(),
        }),
    );
    InstallOutcome::Installed
}

// =============================================================================
// Forwarding
// =============================================================================

/// Failure to complete a forwarded request.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The request body exceeded the size limit or could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The backend could not be reached or returned an unreadable response.
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Headers that describe one hop and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Join a backend base URL with a request path and query.
///
/// The base URL's own path is kept as a prefix, so `http://b/api` with
/// `/users?id=1` becomes `http://b/api/users?id=1`.
#[must_use]
pub fn join_target(base: &str, path: &str, query: Option<&str>) -> String {
    let mut url = String::with_capacity(base.len() + path.len() + 16);
    url.push_str(base.trim_end_matches('/'));
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Collect the body of `request`, refusing bodies over `max_body_bytes`.
///
/// # Errors
///
/// Returns `ForwardError::Body` if the body is too large or cannot be read.
pub async fn read_body(request: Request, max_body_bytes: usize) -> Result<http::Request<Bytes>, ForwardError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|err| ForwardError::Body(err.to_string()))?;
    Ok(http::Request::from_parts(parts, body))
}

/// Forward `request` to `base`, appending its path and query.
///
/// `overrides` are set on the outbound request after the incoming headers
/// are copied. The backend's status, headers and body are returned as-is,
/// including error statuses.
///
/// # Errors
///
/// Returns `ForwardError::Transport` if the backend cannot be reached.
pub async fn forward(
    client: &reqwest::Client,
    base: &str,
    overrides: &HashMap<String, String>,
    request: http::Request<Bytes>,
) -> Result<Response, ForwardError> {
    let (parts, body) = request.into_parts();
    let url = join_target(base, parts.uri.path(), parts.uri.query());

    let mut headers = HeaderMap::with_capacity(parts.headers.len() + overrides.len() + 1);
    for (name, value) in &parts.headers {
        if !is_hop_by_hop(name) && name != header::HOST && name != header::CONTENT_LENGTH {
            headers.append(name.clone(), value.clone());
        }
    }
    if let Some(host) = parts.headers.get(header::HOST) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }
    for (name, value) in overrides {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid header override"),
        }
    }

    tracing::debug!(method = %parts.method, url = %url, "Forwarding request");

    let upstream = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let mut response_headers = HeaderMap::with_capacity(upstream.headers().len());
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) && name != header::CONTENT_LENGTH {
            response_headers.append(name.clone(), value.clone());
        }
    }
    let bytes = upstream.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}
