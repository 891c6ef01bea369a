//! Response rewriting for list and inspect routes
//!
//! Rules applied to every element:
//! - the effective control is the element's own, else the one of its owning
//!   service, else the one of its stack;
//! - elements the caller cannot access are removed (lists) or the whole
//!   response is refused (inspect);
//! - containers carrying a black-listed label are removed for every caller;
//! - administrators get the effective control under `Portainer.ResourceControl`,
//!   other callers never see a `Portainer` field.
//!
//! Every rule depends only on upstream fields, so rewriting twice yields the
//! same document as rewriting once.

use crate::access::AccessContext;
use crate::error::{ProxyError, Result};
use crate::route::ApiResource;
use gateway_core::{CoreError, ResourceControl, ResourceControlType, Settings};
use serde_json::{Map, Value};

pub const OWNERSHIP_KEY: &str = "Portainer";
const SERVICE_ID_LABEL: &str = "com.docker.swarm.service.id";
const STACK_LABELS: &[&str] = &["com.docker.stack.namespace", "com.docker.compose.project"];

/// Inputs shared by every element of one response
pub struct FilterContext<'a> {
    pub access: &'a AccessContext,
    pub controls: &'a [ResourceControl],
    pub settings: &'a Settings,
}

/// Filter a list document in place, returning how many elements were removed
pub fn filter_list(resource: ApiResource, document: &mut Value, ctx: &FilterContext<'_>) -> Result<usize> {
    let elements = match resource {
        ApiResource::Volume => match document.get_mut("Volumes") {
            Some(Value::Null) | None => return Ok(0),
            Some(volumes) => volumes,
        },
        _ => document,
    };

    let Value::Array(items) = elements else {
        return Err(ProxyError::UpstreamProtocol(format!(
            "expected a {} list in upstream response",
            resource
        )));
    };

    let before = items.len();
    items.retain(|item| is_visible(resource, item, ctx));
    let removed = before - items.len();

    for item in items.iter_mut() {
        decorate(resource, item, ctx)?;
    }
    Ok(removed)
}

/// Check an inspect document, refusing it when the caller cannot see the resource
pub fn filter_inspect(resource: ApiResource, document: &mut Value, ctx: &FilterContext<'_>) -> Result<()> {
    if !document.is_object() {
        return Err(ProxyError::UpstreamProtocol(format!(
            "expected a {} object in upstream response",
            resource
        )));
    }

    if !ctx.access.can_access(effective_control(resource, document, ctx.controls)) {
        let id = resource_id(resource, document).unwrap_or("unknown");
        return Err(ProxyError::Authorization(format!("{} {}", resource, id)));
    }

    decorate(resource, document, ctx)
}

fn is_visible(resource: ApiResource, item: &Value, ctx: &FilterContext<'_>) -> bool {
    if resource == ApiResource::Container && is_black_listed(item, ctx.settings) {
        return false;
    }
    ctx.access.can_access(effective_control(resource, item, ctx.controls))
}

fn decorate(resource: ApiResource, item: &mut Value, ctx: &FilterContext<'_>) -> Result<()> {
    let control = if ctx.access.is_admin() {
        effective_control(resource, item, ctx.controls).cloned()
    } else {
        None
    };

    let Some(object) = item.as_object_mut() else {
        return Ok(());
    };

    match control {
        Some(control) => {
            let control = serde_json::to_value(control).map_err(CoreError::from)?;
            let mut ownership = Map::new();
            ownership.insert("ResourceControl".to_string(), control);
            object.insert(OWNERSHIP_KEY.to_string(), Value::Object(ownership));
        }
        None => {
            object.remove(OWNERSHIP_KEY);
        }
    }
    Ok(())
}

/// Resolve the control governing an element, following service and stack ownership
pub fn effective_control<'c>(
    resource: ApiResource,
    item: &Value,
    controls: &'c [ResourceControl],
) -> Option<&'c ResourceControl> {
    if let Some(control) = resource_id(resource, item).and_then(|id| control_for(id, controls)) {
        return Some(control);
    }

    if let Some(control) = owning_service(resource, item).and_then(|id| control_for(id, controls)) {
        return Some(control);
    }

    let labels = labels(resource, item)?;
    STACK_LABELS
        .iter()
        .filter_map(|key| labels.get(*key).and_then(Value::as_str))
        .find_map(|stack| {
            controls
                .iter()
                .find(|c| c.resource_type == ResourceControlType::Stack && c.resource_id == stack)
        })
}

fn control_for<'c>(id: &str, controls: &'c [ResourceControl]) -> Option<&'c ResourceControl> {
    controls
        .iter()
        .find(|c| c.resource_id == id)
        .or_else(|| controls.iter().find(|c| c.covers(id)))
}

fn resource_id(resource: ApiResource, item: &Value) -> Option<&str> {
    let key = match resource {
        ApiResource::Container | ApiResource::Network => "Id",
        ApiResource::Volume => "Name",
        ApiResource::Service | ApiResource::Task | ApiResource::Secret | ApiResource::Config => "ID",
    };
    item.get(key).and_then(Value::as_str)
}

fn owning_service(resource: ApiResource, item: &Value) -> Option<&str> {
    match resource {
        ApiResource::Container => labels(resource, item)?.get(SERVICE_ID_LABEL)?.as_str(),
        ApiResource::Task => item.get("ServiceID")?.as_str(),
        _ => None,
    }
}

fn labels(resource: ApiResource, item: &Value) -> Option<&Map<String, Value>> {
    let paths: &[&[&str]] = match resource {
        // List entries carry `Labels`, inspect documents `Config.Labels`
        ApiResource::Container => &[&["Labels"], &["Config", "Labels"]],
        ApiResource::Volume | ApiResource::Network => &[&["Labels"]],
        ApiResource::Service | ApiResource::Secret | ApiResource::Config => &[&["Spec", "Labels"]],
        ApiResource::Task => &[&["Spec", "ContainerSpec", "Labels"]],
    };

    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(item, |value, key| value.get(*key))
            .and_then(Value::as_object)
    })
}

fn is_black_listed(item: &Value, settings: &Settings) -> bool {
    if settings.black_listed_labels.is_empty() {
        return false;
    }
    let Some(labels) = labels(ApiResource::Container, item) else {
        return false;
    };
    settings.black_listed_labels.iter().any(|pair| {
        labels
            .get(&pair.name)
            .and_then(Value::as_str)
            .is_some_and(|value| value == pair.value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{LabelPair, Principal, TeamId, UserId, UserRole};
    use serde_json::json;

    fn control(id: u32, resource_id: &str, kind: ResourceControlType, users: &[u32], teams: &[u32]) -> ResourceControl {
        ResourceControl {
            id,
            resource_id: resource_id.to_string(),
            sub_resource_ids: vec![],
            resource_type: kind,
            public: false,
            user_accesses: users.iter().map(|u| UserId(*u)).collect(),
            team_accesses: teams.iter().map(|t| TeamId(*t)).collect(),
        }
    }

    fn standard(id: u32, teams: &[u32]) -> AccessContext {
        AccessContext::new(
            Principal::new(UserId(id), format!("user{}", id), UserRole::Standard),
            teams.iter().map(|t| TeamId(*t)),
        )
    }

    fn admin() -> AccessContext {
        AccessContext::new(Principal::new(UserId(1), "admin", UserRole::Administrator), [])
    }

    fn containers() -> Value {
        json!([
            {"Id": "c1", "Names": ["/public"], "Labels": {}},
            {"Id": "c2", "Names": ["/mine"], "Labels": {}},
            {"Id": "c3", "Names": ["/team"], "Labels": {}},
            {"Id": "c4", "Names": ["/other"], "Labels": {}},
            {"Id": "c5", "Names": ["/svc.1"], "Labels": {"com.docker.swarm.service.id": "svc1"}},
            {"Id": "c6", "Names": ["/stack_web"], "Labels": {"com.docker.stack.namespace": "shop"}},
            {"Id": "c7", "Names": ["/agent"], "Labels": {"io.portainer.agent": "true"}}
        ])
    }

    fn controls() -> Vec<ResourceControl> {
        vec![
            control(1, "c2", ResourceControlType::Container, &[2], &[]),
            control(2, "c3", ResourceControlType::Container, &[], &[10]),
            control(3, "c4", ResourceControlType::Container, &[9], &[]),
            control(4, "svc1", ResourceControlType::Service, &[9], &[]),
            control(5, "shop", ResourceControlType::Stack, &[2], &[]),
        ]
    }

    fn ids(document: &Value) -> Vec<String> {
        document
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["Id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_standard_user_sees_public_owned_and_team_resources_in_order() {
        let access = standard(2, &[10]);
        let controls = controls();
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = containers();
        let removed = filter_list(ApiResource::Container, &mut document, &ctx).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(ids(&document), vec!["c1", "c2", "c3", "c6", "c7"]);
    }

    #[test]
    fn test_public_resources_visible_without_teams() {
        let controls = controls();
        let settings = Settings::default();
        for user in [3, 4, 5] {
            let access = standard(user, &[]);
            let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };
            let mut document = containers();
            filter_list(ApiResource::Container, &mut document, &ctx).unwrap();
            assert!(ids(&document).contains(&"c1".to_string()));
            assert!(ids(&document).contains(&"c7".to_string()));
        }
    }

    #[test]
    fn test_filter_is_idempotent_for_every_principal() {
        let controls = controls();
        let settings = Settings {
            black_listed_labels: vec![LabelPair {
                name: "io.portainer.agent".to_string(),
                value: "true".to_string(),
            }],
            ..Settings::default()
        };

        for access in [admin(), standard(2, &[]), standard(3, &[10]), standard(9, &[])] {
            let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };
            let mut once = containers();
            filter_list(ApiResource::Container, &mut once, &ctx).unwrap();
            let mut twice = once.clone();
            let removed = filter_list(ApiResource::Container, &mut twice, &ctx).unwrap();
            assert_eq!(once, twice);
            assert_eq!(removed, 0);
        }
    }

    #[test]
    fn test_admin_sees_everything_with_ownership_metadata() {
        let access = admin();
        let controls = controls();
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = containers();
        filter_list(ApiResource::Container, &mut document, &ctx).unwrap();

        assert_eq!(document.as_array().unwrap().len(), 7);
        assert_eq!(document[1][OWNERSHIP_KEY]["ResourceControl"]["ResourceId"], "c2");
        assert_eq!(document[4][OWNERSHIP_KEY]["ResourceControl"]["ResourceId"], "svc1");
        assert_eq!(document[5][OWNERSHIP_KEY]["ResourceControl"]["ResourceId"], "shop");
        assert!(document[0].get(OWNERSHIP_KEY).is_none());
    }

    #[test]
    fn test_ownership_metadata_stripped_for_standard_users() {
        let access = standard(2, &[]);
        let controls = controls();
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = json!([{"Id": "c2", "Labels": {}, "Portainer": {"ResourceControl": {"Id": 1}}}]);
        filter_list(ApiResource::Container, &mut document, &ctx).unwrap();
        assert!(document[0].get(OWNERSHIP_KEY).is_none());
    }

    #[test]
    fn test_black_listed_containers_hidden_from_admins() {
        let access = admin();
        let controls = vec![];
        let settings = Settings {
            black_listed_labels: vec![LabelPair {
                name: "io.portainer.agent".to_string(),
                value: "true".to_string(),
            }],
            ..Settings::default()
        };
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = containers();
        filter_list(ApiResource::Container, &mut document, &ctx).unwrap();
        assert!(!ids(&document).contains(&"c7".to_string()));
    }

    #[test]
    fn test_volume_list_keeps_document_shape() {
        let access = standard(2, &[]);
        let controls = vec![control(1, "secret-data", ResourceControlType::Volume, &[9], &[])];
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = json!({
            "Volumes": [{"Name": "secret-data"}, {"Name": "shared"}],
            "Warnings": null
        });
        let removed = filter_list(ApiResource::Volume, &mut document, &ctx).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(document["Volumes"], json!([{"Name": "shared"}]));
        assert!(document.get("Warnings").is_some());

        let mut empty = json!({"Volumes": null, "Warnings": null});
        assert_eq!(filter_list(ApiResource::Volume, &mut empty, &ctx).unwrap(), 0);
    }

    #[test]
    fn test_task_inherits_service_control() {
        let access = standard(2, &[]);
        let controls = vec![control(1, "svc1", ResourceControlType::Service, &[9], &[])];
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = json!([
            {"ID": "t1", "ServiceID": "svc1"},
            {"ID": "t2", "ServiceID": "svc2"}
        ]);
        filter_list(ApiResource::Task, &mut document, &ctx).unwrap();
        assert_eq!(document, json!([{"ID": "t2", "ServiceID": "svc2"}]));
    }

    #[test]
    fn test_inspect_refused_through_inherited_control() {
        let access = standard(2, &[]);
        let controls = vec![control(1, "svc1", ResourceControlType::Service, &[9], &[])];
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = json!({
            "Id": "c5",
            "Config": {"Labels": {"com.docker.swarm.service.id": "svc1"}}
        });
        let result = filter_inspect(ApiResource::Container, &mut document, &ctx);
        assert!(matches!(result, Err(ProxyError::Authorization(_))));
    }

    #[test]
    fn test_inspect_allowed_and_redacted() {
        let access = standard(2, &[]);
        let controls = vec![control(1, "net1", ResourceControlType::Network, &[2], &[])];
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut document = json!({"Id": "net1", "Name": "backend", "Portainer": {}});
        filter_inspect(ApiResource::Network, &mut document, &ctx).unwrap();
        assert_eq!(document, json!({"Id": "net1", "Name": "backend"}));
    }

    #[test]
    fn test_unexpected_shapes_are_protocol_errors() {
        let access = admin();
        let controls = vec![];
        let settings = Settings::default();
        let ctx = FilterContext { access: &access, controls: &controls, settings: &settings };

        let mut not_a_list = json!({"message": "oops"});
        assert!(matches!(
            filter_list(ApiResource::Container, &mut not_a_list, &ctx),
            Err(ProxyError::UpstreamProtocol(_))
        ));

        let mut not_an_object = json!([1, 2]);
        assert!(matches!(
            filter_inspect(ApiResource::Service, &mut not_an_object, &ctx),
            Err(ProxyError::UpstreamProtocol(_))
        ));
    }
}
