//! Configuration types and utilities for Agency

use crate::constants::{self, timeouts};
use crate::error::{AgencyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration of the registry service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub storage: StorageConfig,
    /// Relative path under which agents publish their descriptor
    pub descriptor_path: String,
    /// Timeout for a registration-time descriptor fetch, in seconds
    pub fetch_timeout_seconds: u64,
    /// Hard timeout for a single health probe, in seconds
    pub probe_timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: constants::DEFAULT_REGISTRY_PORT,
            log_level: "info".to_string(),
            storage: StorageConfig::default(),
            descriptor_path: constants::DESCRIPTOR_PATH.to_string(),
            fetch_timeout_seconds: timeouts::DEFAULT_FETCH_TIMEOUT,
            probe_timeout_seconds: timeouts::DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl RegistryConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Storage path for file-based backends
    pub path: Option<PathBuf>,
    /// Namespace for multi-tenant storage
    pub namespace: String,
    /// Database name
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    /// SurrealDB file-based storage
    SurrealFile,
    /// SurrealDB in-memory storage
    SurrealMemory,
}

impl std::str::FromStr for StorageBackend {
    type Err = AgencyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" | "surreal-file" => Ok(StorageBackend::SurrealFile),
            "memory" | "mem" | "surreal-memory" => Ok(StorageBackend::SurrealMemory),
            other => Err(AgencyError::Config(format!(
                "Unknown storage backend '{}', expected 'file' or 'memory'",
                other
            ))),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::SurrealFile,
            path: Some(PathBuf::from("./data/registry.db")),
            namespace: "agency".to_string(),
            database: "registry".to_string(),
        }
    }
}

impl StorageConfig {
    /// In-memory storage, used by tests and throwaway deployments
    pub fn memory(namespace: &str, database: &str) -> Self {
        Self {
            backend: StorageBackend::SurrealMemory,
            path: None,
            namespace: namespace.to_string(),
            database: database.to_string(),
        }
    }
}

/// How the per-task event queue handles a slow consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueueMode {
    /// No limit; a slow consumer never throttles the producer
    #[default]
    Unbounded,
    /// At most `capacity` pending events; a full queue blocks the producer
    Bounded { capacity: usize },
}

/// Timing of the startup registration with a remote registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Delay before the first attempt, giving the listener time to come up
    pub initial_delay_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            request_timeout_ms: timeouts::DEFAULT_REGISTRATION_TIMEOUT * 1000,
        }
    }
}

impl RegistrationConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Username -> secret table used by the agent's authentication layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// username -> API key
    pub api_keys: HashMap<String, String>,
    /// username -> password
    pub users: HashMap<String, String>,
}

impl Credentials {
    /// Parse a `user:secret,user2:secret2` list. Blank input yields an empty map.
    pub fn parse_pairs(raw: &str) -> Result<HashMap<String, String>> {
        let mut pairs = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (user, secret) = entry.split_once(':').ok_or_else(|| {
                AgencyError::Config(format!("Expected 'user:secret', got '{}'", entry))
            })?;
            if user.is_empty() || secret.is_empty() {
                return Err(AgencyError::Config(format!(
                    "Empty user or secret in '{}'",
                    entry
                )));
            }
            pairs.insert(user.to_string(), secret.to_string());
        }
        Ok(pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.api_keys.is_empty() && self.users.is_empty()
    }
}

/// Configuration of an agent process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentServerConfig {
    pub host: String,
    pub port: u16,
    /// Public address of this agent; derived from host and port when unset
    pub url: Option<String>,
    pub registry_url: String,
    pub agent_name: String,
    pub description: String,
    pub secure_agent: bool,
    pub credentials: Credentials,
    /// Paths that bypass authentication
    pub public_paths: HashSet<String>,
    pub queue_mode: QueueMode,
    pub registration: RegistrationConfig,
}

impl Default for AgentServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: constants::DEFAULT_AGENT_PORT,
            url: None,
            registry_url: constants::DEFAULT_REGISTRY_URL.to_string(),
            agent_name: "echo_agent".to_string(),
            description: "Echoes messages back in small increments.".to_string(),
            secure_agent: false,
            credentials: Credentials::default(),
            public_paths: HashSet::from([constants::DESCRIPTOR_PATH.to_string()]),
            queue_mode: QueueMode::default(),
            registration: RegistrationConfig::default(),
        }
    }
}

impl AgentServerConfig {
    /// The address other processes should use to reach this agent
    pub fn effective_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    /// Whether requests must be authenticated
    pub fn auth_enabled(&self) -> bool {
        self.secure_agent || !self.credentials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credential_pairs() {
        let pairs = Credentials::parse_pairs("alice:k1, bob:k2,").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["alice"], "k1");
        assert_eq!(pairs["bob"], "k2");

        assert!(Credentials::parse_pairs("").unwrap().is_empty());
        assert!(Credentials::parse_pairs("nocolon").is_err());
        assert!(Credentials::parse_pairs("alice:").is_err());
    }

    #[test]
    fn test_effective_url() {
        let mut config = AgentServerConfig::default();
        assert_eq!(config.effective_url(), "http://localhost:10010");

        config.url = Some("https://agent.example.com".to_string());
        assert_eq!(config.effective_url(), "https://agent.example.com");
    }

    #[test]
    fn test_auth_enabled_by_credentials() {
        let mut config = AgentServerConfig::default();
        assert!(!config.auth_enabled());
        config.credentials.api_keys.insert("ci".into(), "secret".into());
        assert!(config.auth_enabled());
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::SurrealMemory);
        assert_eq!("FILE".parse::<StorageBackend>().unwrap(), StorageBackend::SurrealFile);
        assert!("redis".parse::<StorageBackend>().is_err());
    }
}
