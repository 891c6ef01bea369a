//! Settings-driven restrictions on container creation for non-administrators

use crate::error::{ProxyError, Result};
use gateway_core::Settings;
use serde_json::Value;

/// Whether `POST /containers/create` bodies need to be inspected at all
pub fn restricts_container_create(settings: &Settings) -> bool {
    !settings.allow_bind_mounts_for_regular_users || !settings.allow_privileged_mode_for_regular_users
}

/// Reject a container configuration that the settings forbid for regular users.
///
/// Bodies that cannot be read as a container configuration are refused, since
/// their host options cannot be verified. Field names match the way the
/// runtime decodes them: without regard to case. When a body carries several
/// spellings of one field, every spelling is checked.
pub fn check_container_create(body: &[u8], settings: &Settings) -> Result<()> {
    let config: Value = serde_json::from_slice(body)
        .map_err(|_| ProxyError::Authorization("unreadable container configuration".to_string()))?;

    for host_config in fields(&config, "HostConfig") {
        if !settings.allow_privileged_mode_for_regular_users && is_privileged(host_config) {
            return Err(ProxyError::Authorization(
                "privileged mode is disabled for non-administrators".to_string(),
            ));
        }

        if !settings.allow_bind_mounts_for_regular_users && uses_bind_mounts(host_config) {
            return Err(ProxyError::Authorization(
                "bind mounts are disabled for non-administrators".to_string(),
            ));
        }
    }

    Ok(())
}

fn is_privileged(host_config: &Value) -> bool {
    fields(host_config, "Privileged").any(|v| v.as_bool() == Some(true))
}

fn uses_bind_mounts(host_config: &Value) -> bool {
    let binds = fields(host_config, "Binds")
        .filter_map(Value::as_array)
        .any(|binds| !binds.is_empty());

    let bind_mounts = fields(host_config, "Mounts")
        .filter_map(Value::as_array)
        .flatten()
        .flat_map(|mount| fields(mount, "Type"))
        .filter_map(Value::as_str)
        .any(|kind| kind.eq_ignore_ascii_case("bind"));

    binds || bind_mounts
}

/// Every member of `value` whose key names `field`
fn fields<'v>(value: &'v Value, field: &'static str) -> impl Iterator<Item = &'v Value> {
    value
        .as_object()
        .into_iter()
        .flatten()
        .filter(move |(key, _)| key_matches(key, field))
        .map(|(_, v)| v)
}

/// Case-insensitive key comparison, including the two non-ASCII letters
/// (long s and the Kelvin sign) that fold onto ASCII `s` and `k`
fn key_matches(key: &str, field: &str) -> bool {
    let mut key = key.chars().map(|c| match c {
        '\u{017F}' => 's',
        '\u{212A}' => 'k',
        c => c.to_ascii_lowercase(),
    });
    let mut field = field.chars().map(|c| c.to_ascii_lowercase());
    loop {
        match (key.next(), field.next()) {
            (None, None) => return true,
            (Some(a), Some(b)) if a == b => continue,
            _ => return false,
        }
    }
}
