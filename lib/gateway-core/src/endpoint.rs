//! Endpoint descriptions
//!
//! An [`EndpointConfig`] is what the console stores for one managed backend. The
//! proxy factory never looks at it directly: it asks for the derived
//! [`EndpointTransport`], which names exactly one way of reaching the backend.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier of a registered endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub u32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of backend management API
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Container runtime API (local socket, named pipe or TCP)
    Docker,
    /// Cloud provider management API
    Azure,
}

/// TLS material for a TCP endpoint, referenced by file path
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfiguration {
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub tls_ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,
    #[serde(default)]
    pub tls_key: Option<PathBuf>,
}

/// Service principal used to reach the cloud management API
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureCredentials {
    pub application_id: String,
    pub tenant_id: String,
    pub authentication_key: String,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("application_id", &self.application_id)
            .field("tenant_id", &self.tenant_id)
            .field("authentication_key", &"<redacted>")
            .finish()
    }
}

/// Stored description of one endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub id: EndpointId,
    pub name: String,
    pub kind: EndpointKind,
    /// `unix://`, `npipe://`, `tcp://`, `http://` or `https://` address
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tls: TlsConfiguration,
    /// Sign outbound requests so downstream agents can authenticate the gateway
    #[serde(default)]
    pub signature: bool,
    #[serde(default)]
    pub azure: Option<AzureCredentials>,
}

/// The single connection strategy derived from an [`EndpointConfig`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointTransport {
    Socket { path: String },
    NamedPipe { path: String },
    Tcp { address: String, tls: Option<TlsConfiguration>, signature: bool },
    Http { address: String },
    Cloud { credentials: AzureCredentials },
}

impl EndpointConfig {
    /// Resolve the transport this endpoint must be reached through
    pub fn transport(&self) -> Result<EndpointTransport> {
        if self.kind == EndpointKind::Azure {
            let credentials = self.azure.clone().ok_or_else(|| {
                CoreError::InvalidConfiguration(format!(
                    "endpoint {} is an Azure endpoint without credentials",
                    self.id
                ))
            })?;
            return Ok(EndpointTransport::Cloud { credentials });
        }

        let (scheme, rest) = self.url.split_once("://").ok_or_else(|| {
            CoreError::InvalidConfiguration(format!("endpoint {} has no URL scheme: {:?}", self.id, self.url))
        })?;

        if rest.is_empty() {
            return Err(CoreError::InvalidConfiguration(format!(
                "endpoint {} has an empty address",
                self.id
            )));
        }

        match scheme {
            "unix" => Ok(EndpointTransport::Socket { path: rest.to_string() }),
            "npipe" => Ok(EndpointTransport::NamedPipe { path: rest.replace('/', "\\") }),
            "tcp" => Ok(EndpointTransport::Tcp {
                address: rest.trim_end_matches('/').to_string(),
                tls: self.tls.tls.then(|| self.tls.clone()),
                signature: self.signature,
            }),
            "https" => {
                let mut tls = self.tls.clone();
                tls.tls = true;
                Ok(EndpointTransport::Tcp {
                    address: rest.trim_end_matches('/').to_string(),
                    tls: Some(tls),
                    signature: self.signature,
                })
            }
            "http" => Ok(EndpointTransport::Http { address: rest.trim_end_matches('/').to_string() }),
            other => Err(CoreError::InvalidConfiguration(format!(
                "endpoint {} uses unsupported scheme {:?}",
                self.id, other
            ))),
        }
    }
}
