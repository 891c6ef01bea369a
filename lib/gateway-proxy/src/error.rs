//! Error taxonomy of the proxy pipeline and its translation to HTTP responses

use crate::body::{self, ProxyBody};
use gateway_core::CoreError;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// Bad or missing TLS/credential material. Raised at construction only.
    #[error("Invalid proxy configuration: {0}")]
    Configuration(String),

    #[error("Access denied to resource: {0}")]
    Authorization(String),

    #[error("Unable to reach upstream: {0}")]
    UpstreamConnection(String),

    #[error("Upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Unexpected upstream response: {0}")]
    UpstreamProtocol(String),

    #[error("Unable to sign request: {0}")]
    Signature(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Store error: {0}")]
    Store(#[from] CoreError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Configuration(_) | ProxyError::Signature(_) | ProxyError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Authorization(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamConnection(_) | ProxyError::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ProxyError::Configuration(_) => "Endpoint is misconfigured",
            ProxyError::Authorization(_) => "Access denied to resource",
            ProxyError::UpstreamConnection(_) => "Unable to reach the endpoint",
            ProxyError::UpstreamTimeout(_) => "The endpoint did not respond in time",
            ProxyError::UpstreamProtocol(_) => "Unexpected response from the endpoint",
            ProxyError::Signature(_) => "Unable to sign the request",
            ProxyError::Unsupported(_) => "Operation not supported",
            ProxyError::Store(_) => "Unable to read gateway data",
        }
    }

    // Upstream failures never echo what the failed attempt returned.
    fn details(&self) -> Option<String> {
        match self {
            ProxyError::Authorization(_) | ProxyError::Unsupported(_) => Some(self.to_string()),
            _ => None,
        }
    }

    /// Translate into the JSON error response returned to the caller
    pub fn into_response(self) -> Response<ProxyBody> {
        let payload = ErrorBody {
            message: self.message(),
            details: self.details(),
        };
        let bytes = serde_json::to_vec(&payload).unwrap_or_else(|_| b"{}".to_vec());

        let mut response = Response::new(body::full(bytes));
        *response.status_mut() = self.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::collect;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::Authorization("c1".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ProxyError::UpstreamConnection("refused".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::UpstreamTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(ProxyError::UpstreamProtocol("bad json".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ProxyError::Signature("no key".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ProxyError::Unsupported("npipe".into()).status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_authorization_response_body() {
        let response = ProxyError::Authorization("container c1".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let bytes = collect(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["message"], "Access denied to resource");
        assert!(value["details"].as_str().unwrap().contains("container c1"));
    }

    #[tokio::test]
    async fn test_upstream_error_does_not_leak_details() {
        let response = ProxyError::UpstreamConnection("dial unix /secret/path: refused".into()).into_response();
        let bytes = collect(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("/secret/path"));
    }
}
