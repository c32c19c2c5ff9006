//! Agency Framework - Unified framework re-exporting all Agency components
//!
//! This meta-crate provides a single dependency for binaries that need
//! both the agent directory and the task execution bridge.

// Re-export all functionality from Agency crates
pub use agency_common as common;
pub use agency_registry as registry;
pub use agency_tasks as tasks;

// Re-export top-level types for convenience
pub use agency_common::{AgencyError, ErrorKind, Result};
pub use agency_registry::{AgentDescriptor, RegistrationHook, RegistryService};
pub use agency_tasks::{AgentExecutor, EventQueue, StreamingAgent, StreamingExecutor};

/// Convenience prelude module for common imports
pub mod prelude {
    // Common types, errors and configuration
    pub use agency_common::{
        AgencyError, AgentServerConfig, Credentials, ErrorKind, Page, QueueMode,
        RegistrationConfig, RegistryConfig, Result, StatusResponse, StorageBackend,
        StorageConfig,
    };

    // Agent directory
    pub use agency_registry::{
        AgentDescriptor, AgentRecord, AgentView, DescriptorFetcher, HealthProber, HealthStatus,
        HttpDescriptorFetcher, RegistrationHook, RegistrationOutcome, RegistrationState,
        RegistryHealth, RegistryService, RegistryStore, SurrealRegistryStore, UpsertOutcome,
    };

    // Task execution
    pub use agency_tasks::{
        AgentExecutor, AgentUpdate, Artifact, EventQueue, EventReceiver, InMemoryTaskStore,
        Message, Part, RequestContext, Resumption, Role, StreamingAgent, StreamingExecutor, Task,
        TaskArtifactUpdate, TaskClaim, TaskEvent, TaskState, TaskStatusUpdate, TaskUpdater,
        TokenCounts,
    };
}
