//! Router mapping gateway URLs onto endpoint handlers

use gateway_core::{EndpointId, Principal, UserId, UserRole};
use gateway_proxy::body::{self, BoxError, ProxyBody};
use gateway_proxy::{EndpointRegistry, ProxyMetrics};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode, Uri};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub const USER_ID_HEADER: &str = "x-gateway-user-id";
pub const USERNAME_HEADER: &str = "x-gateway-username";
pub const USER_ROLE_HEADER: &str = "x-gateway-user-role";

const ENDPOINTS_PREFIX: &str = "/api/endpoints/";

/// Where a request is sent
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    Health,
    Metrics,
    /// Request for an endpoint's API (`docker` or `azure`), with the gateway prefix removed
    Endpoint {
        id: EndpointId,
        api: &'static str,
        path_and_query: String,
    },
    NotFound,
}

/// Match a request against the gateway's URL layout
pub fn match_route(method: &Method, uri: &Uri) -> Route {
    let path = uri.path();

    if method == Method::GET && path == "/healthz" {
        return Route::Health;
    }
    if method == Method::GET && path == "/metrics" {
        return Route::Metrics;
    }

    let Some(rest) = path.strip_prefix(ENDPOINTS_PREFIX) else {
        return Route::NotFound;
    };
    let mut segments = rest.splitn(3, '/');
    let id = match segments.next().and_then(|s| s.parse::<u32>().ok()) {
        Some(id) => EndpointId(id),
        None => return Route::NotFound,
    };
    let api = match segments.next() {
        Some("docker") => "docker",
        Some("azure") => "azure",
        _ => return Route::NotFound,
    };

    let mut path_and_query = format!("/{}", segments.next().unwrap_or(""));
    if let Some(query) = uri.query() {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    Route::Endpoint {
        id,
        api,
        path_and_query,
    }
}

/// Read the caller identity set by the authentication layer
pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let user_id = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim().parse::<u32>().ok()?;
    let username = headers.get(USERNAME_HEADER)?.to_str().ok()?;
    let role = UserRole::parse(headers.get(USER_ROLE_HEADER)?.to_str().ok()?)?;
    Some(Principal::new(UserId(user_id), username, role))
}

fn json_error(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let bytes = json!({ "message": message }).to_string();
    let mut response = Response::new(body::full(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Router for dispatching gateway requests to endpoint handlers
pub struct Router {
    registry: Arc<EndpointRegistry>,
    metrics: ProxyMetrics,
}

impl Router {
    pub fn new(registry: Arc<EndpointRegistry>, metrics: ProxyMetrics) -> Self {
        Self { registry, metrics }
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        debug!("{} {}", request.method(), request.uri());

        match match_route(request.method(), request.uri()) {
            Route::Health => Response::new(body::full("OK\n")),
            Route::Metrics => self.metrics_response(),
            Route::Endpoint {
                id,
                api,
                path_and_query,
            } => self.dispatch(id, api, &path_and_query, request).await,
            Route::NotFound => json_error(StatusCode::NOT_FOUND, "Not found"),
        }
    }

    fn metrics_response(&self) -> Response<ProxyBody> {
        match self.metrics.gather() {
            Ok(text) => {
                let mut response = Response::new(body::full(text));
                if let Ok(value) = HeaderValue::from_str(&self.metrics.content_type()) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics")
            }
        }
    }

    async fn dispatch<B>(
        &self,
        id: EndpointId,
        api: &str,
        path_and_query: &str,
        request: Request<B>,
    ) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let Some(principal) = principal_from_headers(request.headers()) else {
            return json_error(StatusCode::UNAUTHORIZED, "Missing caller identity");
        };

        let Some(handler) = self.registry.get(id).await else {
            return json_error(StatusCode::NOT_FOUND, "Endpoint not found");
        };
        if handler.endpoint_kind().is_some_and(|kind| kind != api) {
            debug!("Endpoint {} does not serve the {} API", id, api);
            return json_error(StatusCode::NOT_FOUND, "Endpoint not found");
        }

        let uri = match Uri::try_from(path_and_query) {
            Ok(uri) => uri,
            Err(e) => {
                debug!("Rejecting request for endpoint {}: {}", id, e);
                return json_error(StatusCode::BAD_REQUEST, "Invalid request path");
            }
        };

        let (mut parts, body) = request.into_parts();
        parts.uri = uri;
        for name in [USER_ID_HEADER, USERNAME_HEADER, USER_ROLE_HEADER] {
            parts.headers.remove(name);
        }
        parts.extensions.insert(principal);

        handler.handle(Request::from_parts(parts, body)).await
    }
}
