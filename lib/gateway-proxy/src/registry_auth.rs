//! Registry credential lookup for image pulls, pushes and login checks

use crate::error::{ProxyError, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use gateway_core::{DockerHub, Registry};
use hyper::header::{HeaderName, HeaderValue};
use serde::Serialize;

pub const REGISTRY_AUTH_HEADER: HeaderName = HeaderName::from_static("x-registry-auth");

const DOCKER_HUB_ADDRESS: &str = "docker.io";
const DOCKER_HUB_HOSTS: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];

/// Credential payload expected by the runtime in `X-Registry-Auth`
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RegistryCredential {
    pub username: String,
    pub password: String,
    pub serveraddress: String,
}

impl std::fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("username", &self.username)
            .field("serveraddress", &self.serveraddress)
            .finish_non_exhaustive()
    }
}

impl RegistryCredential {
    /// Base64url encoded JSON, the encoding the runtime decodes
    pub fn header_value(&self) -> Result<HeaderValue> {
        let json = serde_json::to_vec(self).map_err(gateway_core::CoreError::from)?;
        HeaderValue::from_str(&URL_SAFE.encode(json))
            .map_err(|e| ProxyError::Configuration(format!("invalid registry credential: {}", e)))
    }
}

/// Registry host named by an image reference, `None` for Docker Hub images.
///
/// Only the first path segment can be a host, and only when it looks like one.
pub fn registry_host(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    let is_host = first.contains('.') || first.contains(':') || first == "localhost";
    is_host.then_some(first)
}

/// Value of the `fromImage` query parameter of an image pull
pub fn image_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "fromImage")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Registry host named by a login body's `serveraddress`
pub fn host_from_server_address(address: &str) -> Option<String> {
    let host = normalize(address);
    if host.is_empty() || DOCKER_HUB_HOSTS.contains(&host.as_str()) {
        None
    } else {
        Some(host)
    }
}

/// Pick the credential for `host`, falling back to Docker Hub when no host is named
pub fn match_credential(host: Option<&str>, registries: &[Registry], dockerhub: &DockerHub) -> Option<RegistryCredential> {
    let host = host.map(normalize).filter(|h| !DOCKER_HUB_HOSTS.contains(&h.as_str()));

    match host {
        Some(host) => registries
            .iter()
            .find(|registry| normalize(&registry.url) == host)
            .filter(|registry| registry.authentication)
            .map(|registry| RegistryCredential {
                username: registry.username.clone(),
                password: registry.password.clone(),
                serveraddress: registry.url.clone(),
            }),
        None => dockerhub.authentication.then(|| RegistryCredential {
            username: dockerhub.username.clone(),
            password: dockerhub.password.clone(),
            serveraddress: DOCKER_HUB_ADDRESS.to_string(),
        }),
    }
}

/// Reduce a registry URL to its lowercase authority
fn normalize(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
