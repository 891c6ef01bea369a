//! Ownership records and credentials owned by the console's stores
use crate::{TeamId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of backend resource a control applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceControlType {
    Container,
    Service,
    Volume,
    Network,
    Secret,
    Config,
    Stack,
}

impl ResourceControlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceControlType::Container => "container",
            ResourceControlType::Service => "service",
            ResourceControlType::Volume => "volume",
            ResourceControlType::Network => "network",
            ResourceControlType::Secret => "secret",
            ResourceControlType::Config => "config",
            ResourceControlType::Stack => "stack",
        }
    }
}

impl fmt::Display for ResourceControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership and visibility policy of one resource.
///
/// `sub_resource_ids` covers resources created together with the controlled
/// one (the containers of a service, the volumes of a stack, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceControl {
    pub id: u32,
    pub resource_id: String,
    #[serde(default)]
    pub sub_resource_ids: Vec<String>,
    #[serde(rename = "Type")]
    pub resource_type: ResourceControlType,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub user_accesses: Vec<UserId>,
    #[serde(default)]
    pub team_accesses: Vec<TeamId>,
}

impl ResourceControl {
    /// Whether this control covers the given identifier
    pub fn covers(&self, resource_id: &str) -> bool {
        self.resource_id == resource_id || self.sub_resource_ids.iter().any(|id| id == resource_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Leader,
    Member,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub role: MembershipRole,
}

/// Credentials for a private image registry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub id: u32,
    pub name: String,
    /// Registry address, with or without scheme (`registry.example.com:5000`)
    pub url: String,
    #[serde(default)]
    pub authentication: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("authentication", &self.authentication)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Credentials for the default public registry
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerHub {
    #[serde(default)]
    pub authentication: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for DockerHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerHub")
            .field("authentication", &self.authentication)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPair {
    pub name: String,
    pub value: String,
}

/// Console-wide settings the gateway enforces
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Containers carrying any of these labels are hidden from every caller
    #[serde(default)]
    pub black_listed_labels: Vec<LabelPair>,
    #[serde(default = "default_true")]
    pub allow_bind_mounts_for_regular_users: bool,
    #[serde(default = "default_true")]
    pub allow_privileged_mode_for_regular_users: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            black_listed_labels: Vec::new(),
            allow_bind_mounts_for_regular_users: true,
            allow_privileged_mode_for_regular_users: true,
        }
    }
}
