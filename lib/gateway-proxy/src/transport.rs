//! The round-trip capability shared by every transport layer
//!
//! Transports compose by holding an inner [`RoundTrip`]: the authorizing and
//! cloud transports decorate a [`DialerTransport`], which performs the actual
//! HTTP/1.1 exchange over a freshly dialed stream.

use crate::body::{self, ProxyBody};
use crate::dialer::Dialer;
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use hyper::client::conn::http1;
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait RoundTrip: Send + Sync {
    /// Send one request upstream and return its response.
    ///
    /// The request URI is absolute (scheme and authority of the target).
    async fn round_trip(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>>;
}

#[async_trait]
impl<T: RoundTrip + ?Sized> RoundTrip for Arc<T> {
    async fn round_trip(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        (**self).round_trip(request).await
    }
}

/// Raw HTTP/1.1 transport over a [`Dialer`]. Performs no authorization.
pub struct DialerTransport<D> {
    dialer: D,
}

impl<D: Dialer> DialerTransport<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }
}

#[async_trait]
impl<D: Dialer> RoundTrip for DialerTransport<D> {
    async fn round_trip(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        let (mut parts, body) = request.into_parts();

        let stream = self.dialer.dial(&parts.uri).await.map_err(|e| {
            ProxyError::UpstreamConnection(format!("{} dial failed: {}", self.dialer.name(), e))
        })?;

        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProxyError::UpstreamConnection(format!("handshake failed: {}", e)))?;

        let name = self.dialer.name();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Upstream {} connection closed with error: {}", name, e);
            }
        });

        // HTTP/1.1 servers expect origin-form request targets
        let origin = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .parse::<Uri>()
            .map_err(|e| ProxyError::UpstreamProtocol(format!("invalid request target: {}", e)))?;
        parts.uri = origin;

        let response = sender
            .send_request(Request::from_parts(parts, body))
            .await
            .map_err(|e| ProxyError::UpstreamConnection(format!("request failed: {}", e)))?;

        Ok(response.map(body::streaming))
    }
}
