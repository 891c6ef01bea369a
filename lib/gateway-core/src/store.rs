//! In-memory store backing every read interface

use crate::services::{
    DockerHubService, RegistryService, ResourceControlService, SettingsService, TeamMembershipService,
};
use crate::{DockerHub, Registry, ResourceControl, Result, Settings, TeamMembership, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// MemoryStore keeps ownership records, memberships and credentials in memory
pub struct MemoryStore {
    // Map of control id to control
    resource_controls: Arc<RwLock<HashMap<u32, ResourceControl>>>,
    team_memberships: Arc<RwLock<Vec<TeamMembership>>>,
    registries: Arc<RwLock<HashMap<u32, Registry>>>,
    dockerhub: Arc<RwLock<DockerHub>>,
    settings: Arc<RwLock<Settings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            resource_controls: Arc::new(RwLock::new(HashMap::new())),
            team_memberships: Arc::new(RwLock::new(Vec::new())),
            registries: Arc::new(RwLock::new(HashMap::new())),
            dockerhub: Arc::new(RwLock::new(DockerHub::default())),
            settings: Arc::new(RwLock::new(Settings::default())),
        }
    }

    /// Register or replace a resource control
    pub async fn put_resource_control(&self, control: ResourceControl) {
        let mut controls = self.resource_controls.write().await;
        debug!("Stored resource control {} for {}", control.id, control.resource_id);
        controls.insert(control.id, control);
    }

    /// Remove a resource control
    pub async fn delete_resource_control(&self, id: u32) {
        let mut controls = self.resource_controls.write().await;
        controls.remove(&id);
        debug!("Deleted resource control {}", id);
    }

    /// Add a team membership, ignoring exact duplicates
    pub async fn add_team_membership(&self, membership: TeamMembership) {
        let mut memberships = self.team_memberships.write().await;
        if !memberships
            .iter()
            .any(|m| m.user_id == membership.user_id && m.team_id == membership.team_id)
        {
            memberships.push(membership);
        }
    }

    /// Register or replace a registry
    pub async fn put_registry(&self, registry: Registry) {
        let mut registries = self.registries.write().await;
        debug!("Stored registry {} ({})", registry.id, registry.url);
        registries.insert(registry.id, registry);
    }

    pub async fn set_dockerhub(&self, dockerhub: DockerHub) {
        *self.dockerhub.write().await = dockerhub;
    }

    pub async fn set_settings(&self, settings: Settings) {
        *self.settings.write().await = settings;
    }

    /// Get count of stored resource controls
    pub async fn resource_control_count(&self) -> usize {
        self.resource_controls.read().await.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceControlService for MemoryStore {
    async fn resource_control_by_resource_id(&self, resource_id: &str) -> Result<Option<ResourceControl>> {
        let controls = self.resource_controls.read().await;
        // Prefer a direct match over a sub-resource match
        let direct = controls.values().find(|c| c.resource_id == resource_id);
        let found = direct.or_else(|| controls.values().find(|c| c.covers(resource_id)));
        Ok(found.cloned())
    }

    async fn resource_controls(&self) -> Result<Vec<ResourceControl>> {
        let controls = self.resource_controls.read().await;
        let mut all: Vec<_> = controls.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }
}

#[async_trait]
impl TeamMembershipService for MemoryStore {
    async fn team_memberships_by_user_id(&self, user_id: UserId) -> Result<Vec<TeamMembership>> {
        let memberships = self.team_memberships.read().await;
        Ok(memberships.iter().filter(|m| m.user_id == user_id).cloned().collect())
    }
}

#[async_trait]
impl RegistryService for MemoryStore {
    async fn registries(&self) -> Result<Vec<Registry>> {
        let registries = self.registries.read().await;
        let mut all: Vec<_> = registries.values().cloned().collect();
        all.sort_by_key(|r| r.id);
        Ok(all)
    }
}

#[async_trait]
impl DockerHubService for MemoryStore {
    async fn dockerhub(&self) -> Result<DockerHub> {
        Ok(self.dockerhub.read().await.clone())
    }
}

#[async_trait]
impl SettingsService for MemoryStore {
    async fn settings(&self) -> Result<Settings> {
        Ok(self.settings.read().await.clone())
    }
}
