//! Single-host reverse proxy core
//!
//! Rewrites the request target onto the backend, forces the `Host` header,
//! drops hop-by-hop headers in both directions and bounds the time to the
//! upstream response headers. Bodies are streamed unless the wrapped transport
//! rewrites them.

use crate::body::ProxyBody;
use crate::error::{ProxyError, Result};
use crate::metrics::ProxyMetrics;
use crate::policy::TimeoutPolicy;
use crate::transport::RoundTrip;
use hyper::header::{HeaderMap, HeaderValue, CONNECTION, HOST};
use hyper::http::uri::{Authority, Scheme};
use hyper::{Request, Response, Uri};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

/// Headers meaningful only for a single connection
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct ReverseProxy {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    host: HeaderValue,
    transport: Arc<dyn RoundTrip>,
    timeout: TimeoutPolicy,
    endpoint_kind: &'static str,
    metrics: ProxyMetrics,
}

impl ReverseProxy {
    /// Proxy to `target`, which must carry a scheme and an authority
    pub fn new(
        target: Uri,
        transport: Arc<dyn RoundTrip>,
        timeout: TimeoutPolicy,
        endpoint_kind: &'static str,
        metrics: ProxyMetrics,
    ) -> Result<Self> {
        let scheme = target
            .scheme()
            .cloned()
            .ok_or_else(|| ProxyError::Configuration(format!("target {} has no scheme", target)))?;
        let authority = target
            .authority()
            .cloned()
            .ok_or_else(|| ProxyError::Configuration(format!("target {} has no host", target)))?;
        let host = HeaderValue::from_str(authority.as_str())
            .map_err(|e| ProxyError::Configuration(format!("invalid target host: {}", e)))?;

        Ok(Self {
            scheme,
            authority,
            base_path: target.path().trim_end_matches('/').to_string(),
            host,
            transport,
            timeout,
            endpoint_kind,
            metrics,
        })
    }

    pub fn endpoint_kind(&self) -> &'static str {
        self.endpoint_kind
    }

    /// Forward one request and return the upstream response
    pub async fn forward(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        self.metrics.record_request(self.endpoint_kind);

        let (mut parts, body) = request.into_parts();
        parts.uri = self.target_uri(&parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.insert(HOST, self.host.clone());

        debug!("Forwarding {} {} via {}", parts.method, parts.uri, self.endpoint_kind);

        let started = Instant::now();
        let limit = self.timeout.request_timeout;
        let outcome = match tokio_timeout(limit, self.transport.round_trip(Request::from_parts(parts, body))).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProxyError::UpstreamTimeout(limit)),
        };

        match outcome {
            Ok(mut response) => {
                self.metrics.observe_upstream(self.endpoint_kind, started.elapsed());
                strip_hop_by_hop(response.headers_mut());
                debug!("Upstream {} responded with {}", self.endpoint_kind, response.status());
                Ok(response)
            }
            Err(e) => {
                if matches!(
                    e,
                    ProxyError::UpstreamConnection(_) | ProxyError::UpstreamTimeout(_) | ProxyError::UpstreamProtocol(_)
                ) {
                    self.metrics.record_upstream_error(self.endpoint_kind);
                    warn!("Upstream {} request failed: {}", self.endpoint_kind, e);
                }
                Err(e)
            }
        }
    }

    /// Keep path and query, replace scheme and authority with the backend's
    fn target_uri(&self, original: &Uri) -> Result<Uri> {
        let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let path_and_query = if path_and_query.starts_with('/') {
            format!("{}{}", self.base_path, path_and_query)
        } else {
            format!("{}/{}", self.base_path, path_and_query)
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::UpstreamProtocol(format!("invalid request target: {}", e)))
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP.iter().copied().chain(listed.iter().map(String::as_str)) {
        headers.remove(name);
    }
}
