//! Self-registration of an agent process with a remote registry
//!
//! Registration runs in the background after a short delay so the agent's
//! own server is accepting requests by the time the registry fetches its
//! descriptor. Deregistration happens once, on shutdown, and only if
//! registration had succeeded.

use agency_common::{
    AgencyError, RegistrationConfig, Result, StatusResponse, join_url, routes,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shared flag recording whether this process is currently registered
#[derive(Debug, Clone, Default)]
pub struct RegistrationState {
    registered: Arc<AtomicBool>,
}

impl RegistrationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn mark_registered(&self) {
        self.registered.store(true, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether it was set
    fn take(&self) -> bool {
        self.registered.swap(false, Ordering::SeqCst)
    }
}

/// Registers `agent_url` with the registry at `registry_url`
#[derive(Debug, Clone)]
pub struct RegistrationHook {
    agent_url: String,
    registry_url: String,
    config: RegistrationConfig,
    client: reqwest::Client,
    state: RegistrationState,
}

impl RegistrationHook {
    pub fn new(agent_url: &str, registry_url: &str, config: RegistrationConfig) -> Self {
        Self {
            agent_url: agent_url.to_string(),
            registry_url: registry_url.to_string(),
            config,
            client: reqwest::Client::new(),
            state: RegistrationState::new(),
        }
    }

    pub fn state(&self) -> &RegistrationState {
        &self.state
    }

    pub fn agent_url(&self) -> &str {
        &self.agent_url
    }

    /// Start registration in the background; startup never waits on it
    pub fn spawn_registration(&self) -> JoinHandle<()> {
        let hook = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(hook.config.initial_delay()).await;
            if let Err(e) = hook.register_with_retry().await {
                error!("{}", e);
            }
        })
    }

    /// Try to register up to `max_attempts` times with a fixed delay between attempts
    pub async fn register_with_retry(&self) -> Result<StatusResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!(
                "Registering {} with registry at {} (attempt {}/{})",
                self.agent_url, self.registry_url, attempt, max_attempts
            );
            match self.register_once().await {
                Ok(status) => {
                    self.state.mark_registered();
                    info!("Registration successful: {}", status.message);
                    return Ok(status);
                }
                Err(e) => {
                    warn!("Registration attempt {} failed: {}", attempt, e);
                    last_error = e.detail();
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        Err(AgencyError::UpstreamUnreachable(format!(
            "Failed to register {} with registry at {} after {} attempts: {}",
            self.agent_url, self.registry_url, max_attempts, last_error
        )))
    }

    async fn register_once(&self) -> Result<StatusResponse> {
        let response = self
            .client
            .post(join_url(&self.registry_url, routes::REGISTER))
            .timeout(self.config.request_timeout())
            .json(&json!({ "agent_service_url": self.agent_url }))
            .send()
            .await
            .map_err(|e| AgencyError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgencyError::UpstreamUnreachable(format!(
                "registry answered HTTP {}: {}",
                status, body
            )));
        }

        Ok(response
            .json::<StatusResponse>()
            .await
            .unwrap_or_else(|_| StatusResponse::success("registered")))
    }

    /// Remove this agent from the registry if, and only if, it was registered.
    ///
    /// Returns whether a deregistration request succeeded. Failures are
    /// logged and never propagated.
    pub async fn deregister(&self) -> bool {
        if !self.state.take() {
            info!("Not registered with a registry, skipping deregistration");
            return false;
        }

        let url = join_url(&self.registry_url, routes::DEREGISTER_BY_URL);
        info!("Deregistering {} from {}", self.agent_url, self.registry_url);

        let result = self
            .client
            .delete(url)
            .query(&[("url", self.agent_url.as_str())])
            .timeout(self.config.request_timeout())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Deregistration successful");
                true
            }
            Ok(response) => {
                warn!("Deregistration rejected with HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Deregistration request failed: {}", e);
                false
            }
        }
    }
}
