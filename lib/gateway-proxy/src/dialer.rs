//! Connection strategies for reaching a backend
//!
//! A [`Dialer`] only opens a byte stream. The HTTP exchange on top of it is
//! driven by [`crate::transport::DialerTransport`].

use crate::policy::PipeRetryPolicy;
use async_trait::async_trait;
use hyper::Uri;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// A bidirectional byte stream usable by the HTTP client
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Open a connection for a request targeting `uri`
    async fn dial(&self, uri: &Uri) -> io::Result<BoxedStream>;
}

/// Single connect to a fixed Unix domain socket
#[cfg(unix)]
#[derive(Clone, Debug)]
pub struct UnixDialer {
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl UnixDialer {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
#[async_trait]
impl Dialer for UnixDialer {
    fn name(&self) -> &'static str {
        "unix"
    }

    async fn dial(&self, _uri: &Uri) -> io::Result<BoxedStream> {
        debug!("Dialing unix socket {}", self.path.display());
        let stream = tokio::net::UnixStream::connect(&self.path).await?;
        Ok(Box::new(stream))
    }
}

/// Single connect to a named pipe
#[cfg(windows)]
#[derive(Clone, Debug)]
pub struct PipeConnector {
    path: String,
}

#[cfg(windows)]
#[async_trait]
impl Dialer for PipeConnector {
    fn name(&self) -> &'static str {
        "npipe"
    }

    async fn dial(&self, _uri: &Uri) -> io::Result<BoxedStream> {
        use tokio::net::windows::named_pipe::ClientOptions;

        debug!("Dialing named pipe {}", self.path);
        let pipe = ClientOptions::new().open(&self.path)?;
        Ok(Box::new(pipe))
    }
}

/// Named pipe dialer retried under the fixed [`PipeRetryPolicy`]
#[cfg(windows)]
pub type NamedPipeDialer = RetryingDialer<PipeConnector>;

#[cfg(windows)]
pub fn named_pipe_dialer(path: impl Into<String>) -> NamedPipeDialer {
    RetryingDialer::new(PipeConnector { path: path.into() }, PipeRetryPolicy::default())
}

/// A dialer whose failed connects are retried under a [`PipeRetryPolicy`]
pub struct RetryingDialer<D> {
    inner: D,
    policy: PipeRetryPolicy,
}

impl<D: Dialer> RetryingDialer<D> {
    pub fn new(inner: D, policy: PipeRetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<D: Dialer> Dialer for RetryingDialer<D> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn dial(&self, uri: &Uri) -> io::Result<BoxedStream> {
        self.policy.run(|_| self.inner.dial(uri)).await
    }
}

/// TCP connect to the request authority, optionally wrapped in TLS
#[derive(Clone)]
pub struct TcpDialer {
    tls: Option<TlsConnector>,
}

impl TcpDialer {
    pub fn plain() -> Self {
        Self { tls: None }
    }

    pub fn with_tls(config: Arc<ClientConfig>) -> Self {
        Self {
            tls: Some(TlsConnector::from(config)),
        }
    }

    pub fn has_tls(&self) -> bool {
        self.tls.is_some()
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    fn name(&self) -> &'static str {
        if self.tls.is_some() {
            "tcp+tls"
        } else {
            "tcp"
        }
    }

    async fn dial(&self, uri: &Uri) -> io::Result<BoxedStream> {
        let host = uri
            .host()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "request URI has no host"))?
            .trim_matches(|c| c == '[' || c == ']');
        let default_port = if self.tls.is_some() { 443 } else { 80 };
        let port = uri.port_u16().unwrap_or(default_port);

        debug!("Dialing tcp {}:{} (tls: {})", host, port, self.tls.is_some());
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        match &self.tls {
            Some(connector) => {
                let server_name = ServerName::try_from(host.to_string())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let tls_stream = connector.connect(server_name, stream).await?;
                Ok(Box::new(tls_stream))
            }
            None => Ok(Box::new(stream)),
        }
    }
}
