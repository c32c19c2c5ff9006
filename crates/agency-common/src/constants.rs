//! Common constants used across Agency

/// Well-known relative path of an agent's capability descriptor
pub const DESCRIPTOR_PATH: &str = "/.well-known/agent.json";

/// Default port of the registry service
pub const DEFAULT_REGISTRY_PORT: u16 = 6000;

/// Default port of an agent process
pub const DEFAULT_AGENT_PORT: u16 = 10010;

/// Default registry location an agent registers with
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:6000";

/// Registry endpoint paths, shared by the server and the registration client
pub mod routes {
    pub const REGISTER: &str = "/register_agent/";
    pub const LIST: &str = "/agents/";
    pub const BY_NAME: &str = "/agents/by-name/:name";
    pub const BY_URL: &str = "/agents/by-url";
    pub const DEREGISTER_BY_NAME: &str = "/deregister_agent/by-name/:name";
    pub const DEREGISTER_BY_URL: &str = "/deregister_agent/by-url";
    pub const HEALTH: &str = "/health";
}

/// Agent server endpoint paths
pub mod agent_routes {
    pub const SEND_MESSAGE: &str = "/tasks";
    pub const CANCEL: &str = "/tasks/cancel";
    pub const GET_TASK: &str = "/tasks/:id";
}

/// Pagination bounds of the list endpoint
pub mod paging {
    pub const DEFAULT_SKIP: u64 = 0;
    pub const DEFAULT_LIMIT: u64 = 10;
    pub const MIN_LIMIT: u64 = 1;
    pub const MAX_LIMIT: u64 = 100;
}

/// Default timeout values in seconds
pub mod timeouts {
    pub const DEFAULT_FETCH_TIMEOUT: u64 = 10;
    pub const DEFAULT_PROBE_TIMEOUT: u64 = 5;
    pub const DEFAULT_REGISTRATION_TIMEOUT: u64 = 10;
}

/// Task protocol constants
pub mod tasks {
    /// Status text used when an upstream update carries no content
    pub const PROCESSING_PLACEHOLDER: &str = "Processing...";
    /// Name of the artifact that carries a completed task's answer
    pub const RESPONSE_ARTIFACT: &str = "response";
    /// Message metadata key holding the caller's user id
    pub const USER_ID_KEY: &str = "user_id";
}
