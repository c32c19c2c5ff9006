//! Agency Common - Shared utilities and types
//!
//! This crate provides the common error type, configuration structs,
//! and utility functions used across all Agency components.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use error::{AgencyError, ErrorKind, Result};
pub use config::{
    AgentServerConfig, Credentials, QueueMode, RegistrationConfig, RegistryConfig, StorageBackend,
    StorageConfig,
};
pub use constants::*;
pub use types::{Page, StatusResponse};
pub use utils::*;
