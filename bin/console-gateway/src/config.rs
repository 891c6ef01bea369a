//! Gateway configuration loaded from YAML

use anyhow::{Context, Result};
use gateway_core::{DockerHub, EndpointConfig, MemoryStore, Registry, ResourceControl, Settings, TeamMembership};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const CONFIG_ENV: &str = "GATEWAY_CONFIG";
pub const LISTEN_ENV: &str = "GATEWAY_LISTEN";
pub const DEFAULT_CONFIG_PATH: &str = "gateway.yaml";

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// File holding the hex-encoded 32-byte signing seed
    #[serde(default)]
    pub signature_key_path: Option<PathBuf>,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub seed: SeedData,
}

/// Records loaded into the in-memory stores at startup
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub resource_controls: Vec<ResourceControl>,
    #[serde(default)]
    pub team_memberships: Vec<TeamMembership>,
    #[serde(default)]
    pub registries: Vec<Registry>,
    #[serde(default)]
    pub dockerhub: DockerHub,
    #[serde(default)]
    pub settings: Settings,
}

fn default_listen() -> SocketAddr {
    ([0, 0, 0, 0], 9000).into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout_secs: default_request_timeout_secs(),
            signature_key_path: None,
            endpoints: Vec::new(),
            seed: SeedData::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from `GATEWAY_CONFIG` (or `gateway.yaml`), applying `GATEWAY_LISTEN`.
    /// A missing default file yields the default configuration.
    pub fn from_env() -> Result<Self> {
        let explicit = std::env::var(CONFIG_ENV).ok();
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

        let mut config = if explicit.is_none() && !path.exists() {
            info!("No {} found, using default configuration", DEFAULT_CONFIG_PATH);
            Self::default()
        } else {
            Self::from_file(&path)?
        };

        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            config.listen = listen
                .parse()
                .with_context(|| format!("invalid {} value {:?}", LISTEN_ENV, listen))?;
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("failed to parse configuration in {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Read the signing seed, if a key file is configured
    pub fn signature_seed(&self) -> Result<Option<String>> {
        match &self.signature_key_path {
            Some(path) => {
                let seed = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read signature key from {}", path.display()))?;
                Ok(Some(seed))
            }
            None => Ok(None),
        }
    }
}

impl SeedData {
    pub async fn load_into(&self, store: &MemoryStore) {
        for control in &self.resource_controls {
            store.put_resource_control(control.clone()).await;
        }
        for membership in &self.team_memberships {
            store.add_team_membership(membership.clone()).await;
        }
        for registry in &self.registries {
            store.put_registry(registry.clone()).await;
        }
        store.set_dockerhub(self.dockerhub.clone()).await;
        store.set_settings(self.settings.clone()).await;
    }
}
