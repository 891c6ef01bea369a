//! Core domain model for the console gateway
//!
//! This library provides:
//! - Endpoint transport descriptions consumed by the proxy factory
//! - Principals, resource controls, team memberships and registry credentials
//! - The read interfaces the gateway consumes from the console's stores
//! - An in-memory store implementing every read interface

pub mod endpoint;
pub mod error;
pub mod principal;
pub mod resource;
pub mod services;
pub mod store;

pub use endpoint::{AzureCredentials, EndpointConfig, EndpointId, EndpointKind, EndpointTransport, TlsConfiguration};
pub use error::{CoreError, Result};
pub use principal::{Principal, TeamId, UserId, UserRole};
pub use resource::{
    DockerHub, LabelPair, MembershipRole, Registry, ResourceControl, ResourceControlType, Settings,
    TeamMembership,
};
pub use services::{
    DataServices, DockerHubService, RegistryService, ResourceControlService, SettingsService,
    SignatureService, TeamMembershipService,
};
pub use store::MemoryStore;
