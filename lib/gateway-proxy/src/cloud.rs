//! Cloud management transport
//!
//! Requests go to a fixed management API and carry a bearer token obtained
//! with the endpoint's application credentials. No resource-level
//! authorization happens here.

use crate::body::ProxyBody;
use crate::error::{ProxyError, Result};
use crate::transport::RoundTrip;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gateway_core::AzureCredentials;
use hyper::header::{HeaderValue, AUTHORIZATION};
use hyper::{Request, Response};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const CLOUD_API_BASE_URL: &str = "https://management.azure.com";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Tokens this close to expiry are refreshed before use
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

/// Source of bearer tokens for the cloud management API
#[async_trait]
pub trait CloudTokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A fixed token, for tests and pre-issued credentials
pub struct StaticToken(pub String);

#[async_trait]
impl CloudTokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// OAuth2 client-credentials grant against the tenant's token endpoint,
/// cached until shortly before expiry
pub struct ClientCredentialsTokenSource {
    client: reqwest::Client,
    credentials: AzureCredentials,
    authority: String,
    cached: RwLock<Option<AccessToken>>,
}

impl ClientCredentialsTokenSource {
    pub fn new(credentials: AzureCredentials) -> Self {
        Self::with_authority(credentials, DEFAULT_AUTHORITY)
    }

    pub fn with_authority(credentials: AzureCredentials, authority: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            authority: authority.into().trim_end_matches('/').to_string(),
            cached: RwLock::new(None),
        }
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/token", self.authority, self.credentials.tenant_id)
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.application_id.as_str()),
            ("client_secret", self.credentials.authentication_key.as_str()),
            ("resource", "https://management.azure.com/"),
        ];

        let response = self
            .client
            .post(self.token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamConnection(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Token endpoint for tenant {} answered {}", self.credentials.tenant_id, status);
            return Err(ProxyError::UpstreamProtocol(format!(
                "token endpoint answered {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::UpstreamProtocol(format!("invalid token response: {}", e)))?;

        // expires_in is a string in v1 responses and a number in v2
        let lifetime = match body.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(3600);

        Ok(AccessToken {
            token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        })
    }
}

#[async_trait]
impl CloudTokenSource for ClientCredentialsTokenSource {
    async fn token(&self) -> Result<String> {
        let now = Utc::now();
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(current) = cached.as_ref() {
            if current.is_fresh(now) {
                return Ok(current.token.clone());
            }
        }

        let token = self.request_token().await?;
        info!(
            "Obtained cloud token for application {} (expires {})",
            self.credentials.application_id, token.expires_at
        );
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

/// Decorates a transport with the bearer token of a [`CloudTokenSource`]
pub struct CloudTransport<T> {
    inner: T,
    tokens: Arc<dyn CloudTokenSource>,
}

impl<T: RoundTrip> CloudTransport<T> {
    pub fn new(inner: T, tokens: Arc<dyn CloudTokenSource>) -> Self {
        Self { inner, tokens }
    }
}

#[async_trait]
impl<T: RoundTrip> RoundTrip for CloudTransport<T> {
    async fn round_trip(&self, mut request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        let token = self.tokens.token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ProxyError::UpstreamProtocol(format!("unusable token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);

        debug!("Forwarding cloud request {} {}", request.method(), request.uri());
        self.inner.round_trip(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingTransport {
        authorization: Mutex<Option<String>>,
    }

    #[async_trait]
    impl RoundTrip for CapturingTransport {
        async fn round_trip(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
            let header = request
                .headers()
                .get(AUTHORIZATION)
                .map(|v| v.to_str().unwrap().to_string());
            *self.authorization.lock().unwrap() = header;
            Ok(Response::new(body::empty()))
        }
    }

    #[tokio::test]
    async fn test_bearer_token_replaces_caller_authorization() {
        let inner = Arc::new(CapturingTransport::default());
        let transport = CloudTransport::new(inner.clone(), Arc::new(StaticToken("abc".to_string())));

        let request = Request::get("https://management.azure.com/subscriptions")
            .header(AUTHORIZATION, "Bearer console-session")
            .body(body::empty())
            .unwrap();
        transport.round_trip(request).await.unwrap();

        assert_eq!(inner.authorization.lock().unwrap().as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn test_token_freshness() {
        let now = Utc::now();
        let token = |secs| AccessToken {
            token: "t".to_string(),
            expires_at: now + ChronoDuration::seconds(secs),
        };
        assert!(token(3600).is_fresh(now));
        assert!(!token(30).is_fresh(now));
        assert!(!token(-5).is_fresh(now));
    }

    #[test]
    fn test_token_url() {
        let source = ClientCredentialsTokenSource::with_authority(
            AzureCredentials {
                application_id: "app".to_string(),
                tenant_id: "tenant-1".to_string(),
                authentication_key: "key".to_string(),
            },
            "http://127.0.0.1:9999/",
        );
        assert_eq!(source.token_url(), "http://127.0.0.1:9999/tenant-1/oauth2/token");
    }

    #[tokio::test]
    async fn test_unreachable_authority_is_connection_error() {
        let source = ClientCredentialsTokenSource::with_authority(
            AzureCredentials {
                application_id: "app".to_string(),
                tenant_id: "tenant-1".to_string(),
                authentication_key: "key".to_string(),
            },
            "http://127.0.0.1:1",
        );
        assert!(matches!(source.token().await, Err(ProxyError::UpstreamConnection(_))));
    }
}
