//! Authorizing reverse proxy for container runtime endpoints
//!
//! A [`ProxyFactory`] turns an endpoint description into a [`ProxyHandler`]:
//! a dialer for the endpoint's transport, decorated with resource-level
//! authorization (runtime endpoints) or a bearer token (cloud endpoints),
//! behind a single-host [`ReverseProxy`].

pub mod access;
pub mod authorizing;
pub mod body;
pub mod cloud;
pub mod dialer;
pub mod endpoints;
pub mod error;
pub mod factory;
pub mod filter;
pub mod forwarder;
pub mod handler;
pub mod metrics;
pub mod policy;
pub mod registry_auth;
pub mod restrictions;
pub mod route;
pub mod signature;
pub mod tls;
pub mod transport;

pub use access::AccessContext;
pub use authorizing::AuthorizingTransport;
pub use body::{BoxError, ProxyBody};
pub use cloud::{ClientCredentialsTokenSource, CloudTokenSource, CloudTransport, StaticToken, CLOUD_API_BASE_URL};
pub use dialer::{BoxedStream, Dialer, RetryingDialer, TcpDialer};
pub use endpoints::EndpointRegistry;
pub use error::{ProxyError, Result};
pub use factory::ProxyFactory;
pub use forwarder::ReverseProxy;
pub use handler::ProxyHandler;
pub use metrics::ProxyMetrics;
pub use policy::{PipeRetryPolicy, TimeoutPolicy};
pub use route::{ApiResource, ApiRoute};
pub use signature::Ed25519Signer;
pub use transport::{DialerTransport, RoundTrip};

#[cfg(unix)]
pub use dialer::UnixDialer;
