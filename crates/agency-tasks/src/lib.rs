//! Task execution bridge for Agency
//!
//! Adapts an arbitrary streaming agent to the task protocol: a request
//! becomes a task, each upstream update becomes a protocol event on a
//! per-task queue, and the task moves through its lifecycle exactly once.

pub mod executor;
pub mod queue;
pub mod store;
pub mod types;
pub mod updater;

// Re-export key types for convenience
pub use executor::{AgentExecutor, AgentUpdate, RequestContext, StreamingAgent, StreamingExecutor};
pub use queue::{EventQueue, EventReceiver};
pub use store::{InMemoryTaskStore, Resumption, TaskClaim};
pub use types::{
    Artifact, Message, Part, Role, Task, TaskArtifactUpdate, TaskEvent, TaskState,
    TaskStatusUpdate, TokenCounts,
};
pub use updater::TaskUpdater;
