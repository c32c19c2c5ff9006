//! Agent directory for Agency
//!
//! This crate lets independently deployed agent processes announce
//! themselves, be looked up by name or address, be health-checked on
//! demand and be removed. It also carries the client side used by an
//! agent process to register itself with a remote directory.

pub mod descriptor;
pub mod health;
pub mod lifecycle;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use descriptor::{AgentDescriptor, DescriptorFetcher, HttpDescriptorFetcher};
pub use health::{HealthProber, HealthStatus};
pub use lifecycle::{RegistrationHook, RegistrationState};
pub use service::{AgentView, RegistrationOutcome, RegistryHealth, RegistryService};
pub use store::{AgentRecord, RegistryStore, SurrealRegistryStore, UpsertOutcome};
