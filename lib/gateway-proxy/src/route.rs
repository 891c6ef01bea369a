//! Classification of container runtime API requests
//!
//! Only the shape of the path and the method matter here. Anything not
//! recognised is passed through untouched. Paths are percent-decoded before
//! matching, the same way the runtime decodes them before routing.

use hyper::Method;
use percent_encoding::percent_decode_str;
use std::fmt;

/// Kind of runtime object a route addresses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiResource {
    Container,
    Service,
    Task,
    Volume,
    Network,
    Secret,
    Config,
}

impl ApiResource {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "containers" => Some(ApiResource::Container),
            "services" => Some(ApiResource::Service),
            "tasks" => Some(ApiResource::Task),
            "volumes" => Some(ApiResource::Volume),
            "networks" => Some(ApiResource::Network),
            "secrets" => Some(ApiResource::Secret),
            "configs" => Some(ApiResource::Config),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiResource::Container => "container",
            ApiResource::Service => "service",
            ApiResource::Task => "task",
            ApiResource::Volume => "volume",
            ApiResource::Network => "network",
            ApiResource::Secret => "secret",
            ApiResource::Config => "config",
        }
    }
}

impl fmt::Display for ApiResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiRoute {
    /// Collection listing, filtered after dispatch
    List(ApiResource),
    /// Read of a single resource, checked before and after dispatch
    Inspect(ApiResource, String),
    /// Any other operation on an identified resource, checked before dispatch
    Operate(ApiResource, String),
    ContainerCreate,
    /// Image pull (`POST /images/create`)
    ImageCreate,
    /// Image push (`POST /images/{name}/push`)
    ImagePush(String),
    /// Registry login check (`POST /auth`)
    RegistryAuth,
    Passthrough,
    /// Path that does not decode to a clean UTF-8 path; never dispatched
    Malformed,
}

/// Identifiers that name collection-level operations, not resources
const COLLECTION_ACTIONS: &[&str] = &["json", "create", "prune"];

impl ApiRoute {
    pub fn parse(method: &Method, path: &str) -> Self {
        let Ok(decoded) = percent_decode_str(path).decode_utf8() else {
            return ApiRoute::Malformed;
        };
        let segments: Vec<&str> = strip_version(&decoded).split('/').filter(|s| !s.is_empty()).collect();
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return ApiRoute::Malformed;
        }

        match segments.as_slice() {
            ["containers", "create"] if method == Method::POST => ApiRoute::ContainerCreate,
            ["images", "create"] if method == Method::POST => ApiRoute::ImageCreate,
            ["images", name @ .., "push"] if method == Method::POST && !name.is_empty() => {
                ApiRoute::ImagePush(name.join("/"))
            }
            ["auth"] if method == Method::POST => ApiRoute::RegistryAuth,
            ["containers", "json"] if method == Method::GET => ApiRoute::List(ApiResource::Container),
            [collection] if method == Method::GET => match ApiResource::from_segment(collection) {
                Some(ApiResource::Container) | None => ApiRoute::Passthrough,
                Some(resource) => ApiRoute::List(resource),
            },
            [collection, id, rest @ ..] => {
                let Some(resource) = ApiResource::from_segment(collection) else {
                    return ApiRoute::Passthrough;
                };
                if COLLECTION_ACTIONS.contains(id) {
                    return ApiRoute::Passthrough;
                }
                let id = id.to_string();
                let is_inspect = method == Method::GET
                    && match resource {
                        ApiResource::Container => rest.len() == 1 && rest[0] == "json",
                        _ => rest.is_empty(),
                    };
                if is_inspect {
                    ApiRoute::Inspect(resource, id)
                } else {
                    ApiRoute::Operate(resource, id)
                }
            }
            _ => ApiRoute::Passthrough,
        }
    }

    /// The single resource this route addresses, if any
    pub fn target(&self) -> Option<(ApiResource, &str)> {
        match self {
            ApiRoute::Inspect(resource, id) | ApiRoute::Operate(resource, id) => Some((*resource, id.as_str())),
            _ => None,
        }
    }

    /// Whether a successful response must be rewritten before it reaches the caller
    pub fn rewrites_response(&self) -> bool {
        matches!(self, ApiRoute::List(_) | ApiRoute::Inspect(_, _))
    }
}

/// Drop the optional `/v1.41` API version prefix
fn strip_version(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    if let Some((first, rest)) = trimmed.split_once('/') {
        let is_version = first
            .strip_prefix('v')
            .is_some_and(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit() || c == '.'));
        if is_version {
            return rest;
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> ApiRoute {
        ApiRoute::parse(&Method::GET, path)
    }

    #[test]
    fn test_list_routes() {
        assert_eq!(get("/containers/json"), ApiRoute::List(ApiResource::Container));
        assert_eq!(get("/v1.41/containers/json"), ApiRoute::List(ApiResource::Container));
        assert_eq!(get("/services"), ApiRoute::List(ApiResource::Service));
        assert_eq!(get("/volumes"), ApiRoute::List(ApiResource::Volume));
        assert_eq!(get("/networks"), ApiRoute::List(ApiResource::Network));
        assert_eq!(get("/secrets"), ApiRoute::List(ApiResource::Secret));
        assert_eq!(get("/configs"), ApiRoute::List(ApiResource::Config));
        assert_eq!(get("/tasks"), ApiRoute::List(ApiResource::Task));
    }

    #[test]
    fn test_inspect_routes() {
        assert_eq!(get("/containers/abc/json"), ApiRoute::Inspect(ApiResource::Container, "abc".into()));
        assert_eq!(get("/v1.30/services/svc1"), ApiRoute::Inspect(ApiResource::Service, "svc1".into()));
        assert_eq!(get("/volumes/data"), ApiRoute::Inspect(ApiResource::Volume, "data".into()));
        assert_eq!(get("/networks/net1"), ApiRoute::Inspect(ApiResource::Network, "net1".into()));
        assert_eq!(get("/tasks/t1"), ApiRoute::Inspect(ApiResource::Task, "t1".into()));
    }

    #[test]
    fn test_operate_routes() {
        assert_eq!(
            ApiRoute::parse(&Method::POST, "/containers/abc/start"),
            ApiRoute::Operate(ApiResource::Container, "abc".into())
        );
        assert_eq!(get("/containers/abc/logs"), ApiRoute::Operate(ApiResource::Container, "abc".into()));
        assert_eq!(
            ApiRoute::parse(&Method::DELETE, "/volumes/data"),
            ApiRoute::Operate(ApiResource::Volume, "data".into())
        );
        assert_eq!(
            ApiRoute::parse(&Method::POST, "/services/svc1/update"),
            ApiRoute::Operate(ApiResource::Service, "svc1".into())
        );
    }

    #[test]
    fn test_encoded_identifiers_are_decoded() {
        assert_eq!(
            ApiRoute::parse(&Method::POST, "/v1.41/containers/%632/stop"),
            ApiRoute::Operate(ApiResource::Container, "c2".into())
        );
        assert_eq!(
            ApiRoute::parse(&Method::DELETE, "/%76olumes/private%2Ddata"),
            ApiRoute::Operate(ApiResource::Volume, "private-data".into())
        );
        assert_eq!(get("/containers/%64b/json"), ApiRoute::Inspect(ApiResource::Container, "db".into()));
        assert_eq!(get("/%63ontainers/json"), ApiRoute::List(ApiResource::Container));
        assert_eq!(
            ApiRoute::parse(&Method::POST, "/containers//c2//stop"),
            ApiRoute::Operate(ApiResource::Container, "c2".into())
        );
    }

    #[test]
    fn test_malformed_paths() {
        assert_eq!(ApiRoute::parse(&Method::POST, "/containers/%ff/stop"), ApiRoute::Malformed);
        assert_eq!(ApiRoute::parse(&Method::POST, "/containers/../containers/c2/stop"), ApiRoute::Malformed);
        assert_eq!(ApiRoute::parse(&Method::POST, "/containers/%2e%2e/c2/stop"), ApiRoute::Malformed);
        assert_eq!(ApiRoute::parse(&Method::POST, "/containers/./c2"), ApiRoute::Malformed);
    }

    #[test]
    fn test_collection_actions_pass_through() {
        assert_eq!(ApiRoute::parse(&Method::POST, "/volumes/create"), ApiRoute::Passthrough);
        assert_eq!(ApiRoute::parse(&Method::POST, "/networks/prune"), ApiRoute::Passthrough);
        assert_eq!(ApiRoute::parse(&Method::POST, "/services/create"), ApiRoute::Passthrough);
        assert_eq!(get("/info"), ApiRoute::Passthrough);
        assert_eq!(get("/_ping"), ApiRoute::Passthrough);
        assert_eq!(get("/containers"), ApiRoute::Passthrough);
    }

    #[test]
    fn test_registry_routes() {
        assert_eq!(ApiRoute::parse(&Method::POST, "/containers/create"), ApiRoute::ContainerCreate);
        assert_eq!(ApiRoute::parse(&Method::POST, "/v1.41/images/create"), ApiRoute::ImageCreate);
        assert_eq!(
            ApiRoute::parse(&Method::POST, "/images/registry.example.com:5000/team/app/push"),
            ApiRoute::ImagePush("registry.example.com:5000/team/app".into())
        );
        assert_eq!(ApiRoute::parse(&Method::POST, "/auth"), ApiRoute::RegistryAuth);
    }

    #[test]
    fn test_target_and_rewrite() {
        let route = get("/containers/abc/json");
        assert_eq!(route.target(), Some((ApiResource::Container, "abc")));
        assert!(route.rewrites_response());
        assert!(get("/containers/json").target().is_none());
        assert!(!ApiRoute::parse(&Method::POST, "/containers/abc/stop").rewrites_response());
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("/v1.41/containers/json"), "containers/json");
        assert_eq!(strip_version("/volumes"), "volumes");
        assert_eq!(strip_version("/vendor/thing"), "vendor/thing");
    }
}
