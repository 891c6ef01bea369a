//! Access-controlling decorator around a container runtime transport
//!
//! Before dispatch: identify the addressed resource, refuse callers without
//! access (inspecting the resource first when its control may be inherited
//! from a service or stack), enforce container-create settings, attach
//! registry credentials and sign the request. After dispatch: filter list responses and refuse inspect
//! responses the caller may not see.

use crate::access::AccessContext;
use crate::body::{self, ProxyBody};
use crate::error::{ProxyError, Result};
use crate::filter::{self, FilterContext};
use crate::metrics::ProxyMetrics;
use crate::registry_auth::{self, REGISTRY_AUTH_HEADER};
use crate::restrictions;
use crate::route::{ApiResource, ApiRoute};
use crate::signature;
use crate::transport::RoundTrip;
use async_trait::async_trait;
use gateway_core::{DataServices, Principal, ResourceControl, SignatureService};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use hyper::http::request::Parts;
use hyper::{Request, Response, StatusCode, Uri};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Largest container configuration or login body inspected before dispatch
pub const REQUEST_BODY_LIMIT: usize = 4 * 1024 * 1024;
/// Largest list or inspect document rewritten after dispatch
pub const RESPONSE_BODY_LIMIT: usize = 64 * 1024 * 1024;

pub struct AuthorizingTransport<T> {
    inner: T,
    services: DataServices,
    metrics: ProxyMetrics,
    sign_requests: bool,
    signer: Option<Arc<dyn SignatureService>>,
}

impl<T: RoundTrip> AuthorizingTransport<T> {
    pub fn new(inner: T, services: DataServices, metrics: ProxyMetrics) -> Self {
        Self {
            inner,
            services,
            metrics,
            sign_requests: false,
            signer: None,
        }
    }

    /// Sign every dispatched request. Without a signer each request fails.
    pub fn with_signature(mut self, signer: Option<Arc<dyn SignatureService>>) -> Self {
        self.sign_requests = true;
        self.signer = signer;
        self
    }

    pub fn signs_requests(&self) -> bool {
        self.sign_requests
    }

    async fn authorize_target(&self, route: &ApiRoute, access: &AccessContext, parts: &Parts) -> Result<()> {
        let Some((resource, id)) = route.target() else {
            return Ok(());
        };
        if access.is_admin() {
            return Ok(());
        }

        let direct = self
            .services
            .resource_controls
            .resource_control_by_resource_id(id)
            .await?;

        // Inspect responses are checked against inherited controls after dispatch
        let control = match direct {
            Some(control) => Some(control),
            None if matches!(route, ApiRoute::Operate(_, _)) => {
                self.inherited_control(resource, id, access, parts).await?
            }
            None => None,
        };

        if access.can_access(control.as_ref()) {
            return Ok(());
        }

        self.metrics.record_denied(resource.as_str());
        warn!(
            "Denied {} {} to user {}",
            resource,
            id,
            access.principal().username
        );
        Err(ProxyError::Authorization(format!("{} {}", resource, id)))
    }

    /// Inspect the addressed resource and resolve the control it falls under
    /// through its own id, owning service or stack
    async fn inherited_control(
        &self,
        resource: ApiResource,
        id: &str,
        access: &AccessContext,
        parts: &Parts,
    ) -> Result<Option<ResourceControl>> {
        let uri = inspect_uri(&parts.uri, resource, id)?;
        let mut request = Request::new(body::empty());
        *request.uri_mut() = uri;
        if let Some(host) = parts.headers.get(HOST) {
            request.headers_mut().insert(HOST, host.clone());
        }
        if self.sign_requests {
            self.sign(&mut request, access.principal())?;
        }

        let response = self.inner.round_trip(request).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // The operation itself will fail upstream
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProxyError::UpstreamProtocol(format!(
                "inspecting {} {} returned {}",
                resource, id, status
            )));
        }

        let bytes = body::collect(response.into_body(), RESPONSE_BODY_LIMIT)
            .await
            .map_err(|e| ProxyError::UpstreamProtocol(format!("unreadable inspect body: {}", e)))?;
        let document: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| ProxyError::UpstreamProtocol(format!("inspect response is not JSON: {}", e)))?;

        let controls = self.services.resource_controls.resource_controls().await?;
        let control = filter::effective_control(resource, &document, &controls).cloned();
        if let Some(control) = &control {
            debug!("{} {} falls under control {} ({})", resource, id, control.id, control.resource_id);
        }
        Ok(control)
    }

    async fn enforce_settings(&self, access: &AccessContext, body: ProxyBody) -> Result<ProxyBody> {
        if access.is_admin() {
            return Ok(body);
        }
        let settings = self.services.settings.settings().await?;
        if !restrictions::restricts_container_create(&settings) {
            return Ok(body);
        }

        let bytes = buffer_request(body).await?;
        if let Err(e) = restrictions::check_container_create(&bytes, &settings) {
            self.metrics.record_denied("container");
            warn!("Refused container creation for user {}: {}", access.principal().username, e);
            return Err(e);
        }
        Ok(body::full(bytes))
    }

    async fn inject_registry_auth(&self, host: Option<&str>, headers: &mut HeaderMap) -> Result<()> {
        let registries = self.services.registries.registries().await?;
        let dockerhub = self.services.dockerhub.dockerhub().await?;

        if let Some(credential) = registry_auth::match_credential(host, &registries, &dockerhub) {
            debug!("Attaching credentials for registry {}", credential.serveraddress);
            headers.insert(REGISTRY_AUTH_HEADER, credential.header_value()?);
        }
        Ok(())
    }

    fn sign(&self, request: &mut Request<ProxyBody>, principal: &Principal) -> Result<()> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            error!("Request signing is enabled but no signing key is configured");
            ProxyError::Signature("no signing key configured".to_string())
        })?;

        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let timestamp = chrono::Utc::now().timestamp();

        signature::sign_request(
            request.headers_mut(),
            signer.as_ref(),
            principal.user_id,
            &method,
            &path,
            timestamp,
        )
        .inspect_err(|e| error!("Failed to sign request: {}", e))
    }

    async fn rewrite_response(
        &self,
        route: &ApiRoute,
        access: &AccessContext,
        response: Response<ProxyBody>,
    ) -> Result<Response<ProxyBody>> {
        let (mut parts, body) = response.into_parts();

        let bytes = body::collect(body, RESPONSE_BODY_LIMIT)
            .await
            .map_err(|e| ProxyError::UpstreamProtocol(format!("unreadable response body: {}", e)))?;
        let mut document: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| ProxyError::UpstreamProtocol(format!("response is not JSON: {}", e)))?;

        let controls = self.services.resource_controls.resource_controls().await?;
        let settings = self.services.settings.settings().await?;
        let ctx = FilterContext {
            access,
            controls: &controls,
            settings: &settings,
        };

        match route {
            ApiRoute::List(resource) => {
                let removed = filter::filter_list(*resource, &mut document, &ctx)?;
                self.metrics.record_filtered(resource.as_str(), removed);
                debug!("Filtered {} of {} list for {}", removed, resource, access.principal().username);
            }
            ApiRoute::Inspect(resource, id) => {
                if let Err(e) = filter::filter_inspect(*resource, &mut document, &ctx) {
                    if matches!(e, ProxyError::Authorization(_)) {
                        self.metrics.record_denied(resource.as_str());
                        warn!("Withheld {} {} from user {}", resource, id, access.principal().username);
                    }
                    return Err(e);
                }
            }
            _ => return Ok(Response::from_parts(parts, body::full(bytes))),
        }

        let rewritten = Bytes::from(serde_json::to_vec(&document).map_err(gateway_core::CoreError::from)?);
        parts.headers.remove(TRANSFER_ENCODING);
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
        Ok(Response::from_parts(parts, body::full(rewritten)))
    }
}

#[async_trait]
impl<T: RoundTrip> RoundTrip for AuthorizingTransport<T> {
    async fn round_trip(&self, request: Request<ProxyBody>) -> Result<Response<ProxyBody>> {
        let (mut parts, mut body) = request.into_parts();

        let principal = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ProxyError::Authorization("request carries no principal".to_string()))?;

        signature::strip_signature_headers(&mut parts.headers);

        let route = ApiRoute::parse(&parts.method, parts.uri.path());
        if route == ApiRoute::Malformed {
            warn!("Refused malformed path {} from user {}", parts.uri.path(), principal.username);
            return Err(ProxyError::Authorization("malformed request path".to_string()));
        }
        let access = AccessContext::resolve(principal, self.services.team_memberships.as_ref()).await?;

        self.authorize_target(&route, &access, &parts).await?;

        match &route {
            ApiRoute::ContainerCreate => {
                body = self.enforce_settings(&access, body).await?;
            }
            ApiRoute::ImageCreate => {
                let image = registry_auth::image_from_query(parts.uri.query());
                let host = image.as_deref().and_then(registry_auth::registry_host);
                self.inject_registry_auth(host, &mut parts.headers).await?;
            }
            ApiRoute::ImagePush(name) => {
                let host = registry_auth::registry_host(name);
                self.inject_registry_auth(host, &mut parts.headers).await?;
            }
            ApiRoute::RegistryAuth => {
                let bytes = buffer_request(body).await?;
                let address = serde_json::from_slice::<serde_json::Value>(&bytes)
                    .ok()
                    .and_then(|login| login.get("serveraddress")?.as_str().map(str::to_string));
                if let Some(address) = address {
                    let host = registry_auth::host_from_server_address(&address);
                    self.inject_registry_auth(host.as_deref(), &mut parts.headers).await?;
                }
                body = body::full(bytes);
            }
            _ => {}
        }

        let mut request = Request::from_parts(parts, body);
        if self.sign_requests {
            self.sign(&mut request, access.principal())?;
        }

        let response = self.inner.round_trip(request).await?;

        if route.rewrites_response() && response.status().is_success() {
            return self.rewrite_response(&route, &access, response).await;
        }
        Ok(response)
    }
}

/// Inspect URI for a resource on the same upstream as `uri`
fn inspect_uri(uri: &Uri, resource: ApiResource, id: &str) -> Result<Uri> {
    let id = utf8_percent_encode(id, NON_ALPHANUMERIC);
    let path = match resource {
        ApiResource::Container => format!("/containers/{}/json", id),
        ApiResource::Service => format!("/services/{}", id),
        ApiResource::Task => format!("/tasks/{}", id),
        ApiResource::Volume => format!("/volumes/{}", id),
        ApiResource::Network => format!("/networks/{}", id),
        ApiResource::Secret => format!("/secrets/{}", id),
        ApiResource::Config => format!("/configs/{}", id),
    };

    let mut builder = Uri::builder();
    if let (Some(scheme), Some(authority)) = (uri.scheme(), uri.authority()) {
        builder = builder.scheme(scheme.clone()).authority(authority.clone());
    }
    builder
        .path_and_query(path)
        .build()
        .map_err(|e| ProxyError::Authorization(format!("cannot resolve ownership of {} {}: {}", resource, id, e)))
}

async fn buffer_request(body: ProxyBody) -> Result<Bytes> {
    body::collect(body, REQUEST_BODY_LIMIT)
        .await
        .map_err(|e| ProxyError::Authorization(format!("request body could not be inspected: {}", e)))
}
