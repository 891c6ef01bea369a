//! Read interfaces the gateway consumes from the console's stores
//!
//! Implementations must be safe to call concurrently from every request task.

use crate::{DockerHub, Registry, ResourceControl, Result, Settings, TeamMembership, UserId};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ResourceControlService: Send + Sync {
    /// Find the control covering `resource_id`, directly or as a sub-resource
    async fn resource_control_by_resource_id(&self, resource_id: &str) -> Result<Option<ResourceControl>>;

    /// All known controls
    async fn resource_controls(&self) -> Result<Vec<ResourceControl>>;
}

#[async_trait]
pub trait TeamMembershipService: Send + Sync {
    async fn team_memberships_by_user_id(&self, user_id: UserId) -> Result<Vec<TeamMembership>>;
}

#[async_trait]
pub trait RegistryService: Send + Sync {
    async fn registries(&self) -> Result<Vec<Registry>>;
}

#[async_trait]
pub trait DockerHubService: Send + Sync {
    async fn dockerhub(&self) -> Result<DockerHub>;
}

#[async_trait]
pub trait SettingsService: Send + Sync {
    async fn settings(&self) -> Result<Settings>;
}

/// Key material proving the gateway's own identity to downstream agents
pub trait SignatureService: Send + Sync {
    /// Sign `message`, returning the base64 encoded signature
    fn sign(&self, message: &[u8]) -> Result<String>;

    /// Base64 encoded public key matching [`SignatureService::sign`]
    fn public_key(&self) -> String;
}

/// Bundle of store handles shared by every transport a factory builds
#[derive(Clone)]
pub struct DataServices {
    pub resource_controls: Arc<dyn ResourceControlService>,
    pub team_memberships: Arc<dyn TeamMembershipService>,
    pub registries: Arc<dyn RegistryService>,
    pub dockerhub: Arc<dyn DockerHubService>,
    pub settings: Arc<dyn SettingsService>,
}

impl DataServices {
    /// Use a single store for every interface
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ResourceControlService
            + TeamMembershipService
            + RegistryService
            + DockerHubService
            + SettingsService
            + 'static,
    {
        Self {
            resource_controls: store.clone(),
            team_memberships: store.clone(),
            registries: store.clone(),
            dockerhub: store.clone(),
            settings: store,
        }
    }
}
