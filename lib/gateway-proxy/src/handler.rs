//! Request handler mounted by the gateway for one endpoint

use crate::body::{self, BoxError, ProxyBody};
use crate::error::{ProxyError, Result};
use crate::forwarder::ReverseProxy;
use hyper::body::{Body, Bytes};
use hyper::{Request, Response};
use tracing::debug;

enum HandlerKind {
    Proxy(ReverseProxy),
    /// Answers every request with the same "not supported" error
    Unsupported(String),
}

pub struct ProxyHandler {
    label: String,
    kind: HandlerKind,
}

impl ProxyHandler {
    pub fn proxy(label: impl Into<String>, proxy: ReverseProxy) -> Self {
        Self {
            label: label.into(),
            kind: HandlerKind::Proxy(proxy),
        }
    }

    pub fn unsupported(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: HandlerKind::Unsupported(reason.into()),
        }
    }

    /// Short description used in logs, e.g. `unix:/var/run/docker.sock`
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_supported(&self) -> bool {
        matches!(self.kind, HandlerKind::Proxy(_))
    }

    /// API family served by this handler (`docker` or `azure`), if it forwards at all
    pub fn endpoint_kind(&self) -> Option<&'static str> {
        match &self.kind {
            HandlerKind::Proxy(proxy) => Some(proxy.endpoint_kind()),
            HandlerKind::Unsupported(_) => None,
        }
    }

    /// Forward a request, keeping failures typed
    pub async fn forward(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        match &self.kind {
            HandlerKind::Proxy(proxy) => proxy.forward(request).await,
            HandlerKind::Unsupported(reason) => Err(ProxyError::Unsupported(reason.clone())),
        }
    }

    /// Forward a request, translating failures into JSON error responses
    pub async fn handle<B>(&self, request: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        match self.forward(request.map(body::streaming)).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Request through {} failed: {}", self.label, e);
                e.into_response()
            }
        }
    }
}
