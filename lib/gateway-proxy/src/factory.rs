//! Construction of endpoint handlers
//!
//! The factory holds only shared collaborators. Every constructor either
//! returns a ready handler or fails before anything is installed.

use crate::authorizing::AuthorizingTransport;
use crate::cloud::{ClientCredentialsTokenSource, CloudTokenSource, CloudTransport, CLOUD_API_BASE_URL, DEFAULT_AUTHORITY};
use crate::dialer::TcpDialer;
use crate::error::{ProxyError, Result};
use crate::forwarder::ReverseProxy;
use crate::handler::ProxyHandler;
use crate::metrics::ProxyMetrics;
use crate::policy::TimeoutPolicy;
use crate::tls;
use crate::transport::{DialerTransport, RoundTrip};
use gateway_core::{AzureCredentials, DataServices, EndpointConfig, EndpointTransport, SignatureService, TlsConfiguration};
use hyper::Uri;
use std::sync::Arc;
use tracing::info;

const DOCKER: &str = "docker";
const AZURE: &str = "azure";

/// Placeholder authority for local transports, which dial a fixed path
#[cfg(unix)]
const SOCKET_HOST: &str = "http://unixsocket";
#[cfg(windows)]
const PIPE_HOST: &str = "http://npipe";

pub struct ProxyFactory {
    services: DataServices,
    signer: Option<Arc<dyn SignatureService>>,
    metrics: ProxyMetrics,
    timeout: TimeoutPolicy,
    cloud_authority: String,
}

impl ProxyFactory {
    pub fn new(services: DataServices, metrics: ProxyMetrics) -> Self {
        Self {
            services,
            signer: None,
            metrics,
            timeout: TimeoutPolicy::default(),
            cloud_authority: DEFAULT_AUTHORITY.to_string(),
        }
    }

    /// Key used by endpoints with signature enabled
    pub fn with_signer(mut self, signer: Arc<dyn SignatureService>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    /// Token authority for cloud endpoints
    pub fn with_cloud_authority(mut self, authority: impl Into<String>) -> Self {
        self.cloud_authority = authority.into();
        self
    }

    pub fn metrics(&self) -> &ProxyMetrics {
        &self.metrics
    }

    /// Build the handler described by a stored endpoint
    pub fn build(&self, config: &EndpointConfig) -> Result<ProxyHandler> {
        let transport = config
            .transport()
            .map_err(|e| ProxyError::Configuration(e.to_string()))?;

        let handler = match transport {
            EndpointTransport::Socket { path } => self.socket_proxy(&path),
            EndpointTransport::NamedPipe { path } => self.named_pipe_proxy(&path),
            EndpointTransport::Tcp {
                address,
                tls: Some(tls),
                signature,
            } => self.tcp_tls_proxy(&address, &tls, signature),
            EndpointTransport::Tcp {
                address,
                tls: None,
                signature,
            } => self.tcp_proxy(&address, signature),
            EndpointTransport::Http { address } => self.http_proxy(&address),
            EndpointTransport::Cloud { credentials } => self.cloud_proxy(&credentials),
        }?;

        info!("Built handler {} for endpoint {} ({})", handler.label(), config.id, config.name);
        Ok(handler)
    }

    /// Plain forward without authorization
    pub fn http_proxy(&self, address: &str) -> Result<ProxyHandler> {
        let target = parse_target("http", address)?;
        let transport = Arc::new(DialerTransport::new(TcpDialer::plain()));
        let proxy = ReverseProxy::new(target, transport, self.timeout.clone(), DOCKER, self.metrics.clone())?;
        Ok(ProxyHandler::proxy(format!("http:{}", address), proxy))
    }

    pub fn tcp_tls_proxy(&self, address: &str, tls: &TlsConfiguration, signature: bool) -> Result<ProxyHandler> {
        let config = tls::client_config_from_disk(tls)?;
        let target = parse_target("https", address)?;
        let inner = DialerTransport::new(TcpDialer::with_tls(config));
        self.authorized_proxy_over(format!("tcp+tls:{}", address), target, inner, signature)
    }

    pub fn tcp_proxy(&self, address: &str, signature: bool) -> Result<ProxyHandler> {
        let target = parse_target("http", address)?;
        let inner = DialerTransport::new(TcpDialer::plain());
        self.authorized_proxy_over(format!("tcp:{}", address), target, inner, signature)
    }

    /// Local socket endpoints never sign requests
    #[cfg(unix)]
    pub fn socket_proxy(&self, path: &str) -> Result<ProxyHandler> {
        let inner = DialerTransport::new(crate::dialer::UnixDialer::new(path));
        self.authorized_proxy_over(format!("unix:{}", path), socket_target()?, inner, false)
    }

    #[cfg(not(unix))]
    pub fn socket_proxy(&self, path: &str) -> Result<ProxyHandler> {
        Ok(ProxyHandler::unsupported(
            format!("unix:{}", path),
            "unix sockets are not supported on this platform",
        ))
    }

    #[cfg(windows)]
    pub fn named_pipe_proxy(&self, path: &str) -> Result<ProxyHandler> {
        let inner = DialerTransport::new(crate::dialer::named_pipe_dialer(path));
        let target: Uri = PIPE_HOST
            .parse()
            .map_err(|e| ProxyError::Configuration(format!("invalid pipe target: {}", e)))?;
        self.authorized_proxy_over(format!("npipe:{}", path), target, inner, false)
    }

    #[cfg(not(windows))]
    pub fn named_pipe_proxy(&self, path: &str) -> Result<ProxyHandler> {
        info!("Named pipe endpoint {} served by an unsupported-platform handler", path);
        Ok(ProxyHandler::unsupported(
            format!("npipe:{}", path),
            "named pipes are not supported on this platform",
        ))
    }

    /// Fixed management API, authenticated with the application's credentials
    pub fn cloud_proxy(&self, credentials: &AzureCredentials) -> Result<ProxyHandler> {
        let tokens = Arc::new(ClientCredentialsTokenSource::with_authority(
            credentials.clone(),
            self.cloud_authority.clone(),
        ));
        let inner = DialerTransport::new(TcpDialer::with_tls(tls::public_client_config()?));
        self.cloud_proxy_over(inner, tokens)
    }

    /// Cloud handler over an arbitrary transport and token source
    pub fn cloud_proxy_over<T>(&self, inner: T, tokens: Arc<dyn CloudTokenSource>) -> Result<ProxyHandler>
    where
        T: RoundTrip + 'static,
    {
        let target: Uri = CLOUD_API_BASE_URL
            .parse()
            .map_err(|e| ProxyError::Configuration(format!("invalid cloud target: {}", e)))?;
        let transport = Arc::new(CloudTransport::new(inner, tokens));
        let proxy = ReverseProxy::new(target, transport, self.timeout.clone(), AZURE, self.metrics.clone())?;
        Ok(ProxyHandler::proxy("azure", proxy))
    }

    /// Authorized handler over an arbitrary transport
    pub fn authorized_proxy_over<T>(
        &self,
        label: impl Into<String>,
        target: Uri,
        inner: T,
        signature: bool,
    ) -> Result<ProxyHandler>
    where
        T: RoundTrip + 'static,
    {
        let mut transport = AuthorizingTransport::new(inner, self.services.clone(), self.metrics.clone());
        if signature {
            transport = transport.with_signature(self.signer.clone());
        }
        let proxy = ReverseProxy::new(target, Arc::new(transport), self.timeout.clone(), DOCKER, self.metrics.clone())?;
        Ok(ProxyHandler::proxy(label, proxy))
    }
}

#[cfg(unix)]
fn socket_target() -> Result<Uri> {
    SOCKET_HOST
        .parse()
        .map_err(|e| ProxyError::Configuration(format!("invalid socket target: {}", e)))
}

fn parse_target(scheme: &str, address: &str) -> Result<Uri> {
    format!("{}://{}", scheme, address)
        .parse()
        .map_err(|e| ProxyError::Configuration(format!("invalid endpoint address {:?}: {}", address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{EndpointId, EndpointKind, MemoryStore};
    use std::path::PathBuf;

    fn factory() -> ProxyFactory {
        ProxyFactory::new(
            DataServices::from_store(Arc::new(MemoryStore::new())),
            ProxyMetrics::new().unwrap(),
        )
    }

    fn endpoint(url: &str) -> EndpointConfig {
        EndpointConfig {
            id: EndpointId(1),
            name: "local".to_string(),
            kind: EndpointKind::Docker,
            url: url.to_string(),
            tls: TlsConfiguration::default(),
            signature: false,
            azure: None,
        }
    }

    #[test]
    fn test_build_selects_transport() {
        let factory = factory();
        assert_eq!(factory.build(&endpoint("tcp://10.0.0.5:2375")).unwrap().label(), "tcp:10.0.0.5:2375");
        assert_eq!(factory.build(&endpoint("http://10.0.0.5:9000")).unwrap().label(), "http:10.0.0.5:9000");
        assert_eq!(
            factory.build(&endpoint("unix:///var/run/docker.sock")).unwrap().label(),
            "unix:/var/run/docker.sock"
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_named_pipe_is_unsupported_stub() {
        let handler = factory().build(&endpoint("npipe:////./pipe/docker_engine")).unwrap();
        assert!(!handler.is_supported());
    }

    #[test]
    fn test_missing_certificate_fails_construction() {
        let mut config = endpoint("tcp://10.0.0.5:2376");
        config.tls = TlsConfiguration {
            tls: true,
            tls_skip_verify: false,
            tls_ca_cert: Some(PathBuf::from("/nonexistent/ca.pem")),
            tls_cert: None,
            tls_key: None,
        };
        assert!(matches!(factory().build(&config), Err(ProxyError::Configuration(_))));
    }

    #[test]
    fn test_invalid_configuration_is_configuration_error() {
        assert!(matches!(
            factory().build(&endpoint("ftp://10.0.0.5")),
            Err(ProxyError::Configuration(_))
        ));

        let mut azure = endpoint("");
        azure.kind = EndpointKind::Azure;
        assert!(matches!(factory().build(&azure), Err(ProxyError::Configuration(_))));
    }

    #[test]
    fn test_cloud_proxy_builds() {
        let handler = factory()
            .cloud_proxy(&AzureCredentials {
                application_id: "app".to_string(),
                tenant_id: "tenant".to_string(),
                authentication_key: "key".to_string(),
            })
            .unwrap();
        assert_eq!(handler.label(), "azure");
        assert!(handler.is_supported());
    }
}
