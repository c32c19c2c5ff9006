//! Agent capability descriptors and how they are fetched
//!
//! Every agent publishes a JSON document at a well-known relative path of
//! its address. The registry only interprets `name`, `description`, `url`
//! and `skills`; every other field is carried through untouched.

use agency_common::{AgencyError, DESCRIPTOR_PATH, Result, join_url};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Capability document published by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub description: String,
    /// Address the agent declares for itself, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Everything else (version, capabilities, skills, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: None,
            extra: Map::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach an arbitrary pass-through field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Parse and validate a descriptor from raw JSON
    pub fn from_value(value: Value) -> Result<Self> {
        let descriptor: AgentDescriptor = serde_json::from_value(value).map_err(|e| {
            AgencyError::InvalidInput(format!("Malformed agent descriptor: {}", e))
        })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// A descriptor needs a non-blank name and description
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgencyError::InvalidInput(
                "Agent descriptor has an empty name".to_string(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(AgencyError::InvalidInput(
                "Agent descriptor has an empty description".to_string(),
            ));
        }
        Ok(())
    }

    /// The self-declared address, ignoring blank values
    pub fn declared_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Names of the skills listed in the descriptor
    pub fn skill_names(&self) -> Vec<String> {
        self.extra
            .get("skills")
            .and_then(Value::as_array)
            .map(|skills| {
                skills
                    .iter()
                    .filter_map(|skill| skill.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The descriptor as a JSON object
    pub fn to_json_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Retrieves the descriptor published at an agent address
#[async_trait]
pub trait DescriptorFetcher: Send + Sync {
    async fn fetch(&self, address: &str) -> Result<AgentDescriptor>;
}

/// Fetches descriptors over HTTP from `{address}{descriptor_path}`
#[derive(Debug, Clone)]
pub struct HttpDescriptorFetcher {
    client: reqwest::Client,
    descriptor_path: String,
    timeout: Duration,
}

impl HttpDescriptorFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), DESCRIPTOR_PATH, timeout)
    }

    pub fn with_client(client: reqwest::Client, descriptor_path: &str, timeout: Duration) -> Self {
        Self {
            client,
            descriptor_path: descriptor_path.to_string(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn unreachable(address: &str, reason: impl std::fmt::Display) -> AgencyError {
        AgencyError::UpstreamUnreachable(format!(
            "Could not fetch a valid agent descriptor from {}: {}",
            address, reason
        ))
    }
}

#[async_trait]
impl DescriptorFetcher for HttpDescriptorFetcher {
    async fn fetch(&self, address: &str) -> Result<AgentDescriptor> {
        let url = join_url(address, &self.descriptor_path);
        info!("Fetching agent descriptor from {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::unreachable(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unreachable(address, format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::unreachable(address, e))?;

        let descriptor =
            AgentDescriptor::from_value(body).map_err(|e| Self::unreachable(address, e.detail()))?;
        debug!(
            "Fetched descriptor '{}' with skills {:?}",
            descriptor.name,
            descriptor.skill_names()
        );
        Ok(descriptor)
    }
}
