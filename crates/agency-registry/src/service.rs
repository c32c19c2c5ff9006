//! Registry operations: registration, lookup, listing and removal

use crate::descriptor::DescriptorFetcher;
use crate::health::{HealthProber, HealthStatus};
use crate::store::{AgentRecord, RegistryStore};
use agency_common::{AgencyError, Page, Result, StatusResponse, validate_http_address};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// A stored agent together with a fresh health probe
#[derive(Debug, Clone, PartialEq)]
pub struct AgentView {
    pub record: AgentRecord,
    pub health: HealthStatus,
}

impl AgentView {
    /// Flattened record and descriptor fields plus a `health` object
    pub fn to_json(&self) -> Value {
        let mut map = self.record.to_flat_json();
        map.insert(
            "health".to_string(),
            serde_json::to_value(&self.health).unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}

/// Self-report of the registry service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryHealth {
    /// `healthy` or `degraded`
    pub status: String,
    pub store_connected: bool,
    pub http_client_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl RegistryHealth {
    pub fn is_healthy(&self) -> bool {
        self.store_connected && self.http_client_available
    }
}

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub record: AgentRecord,
    pub created: bool,
    pub message: String,
}

impl RegistrationOutcome {
    pub fn status(&self) -> StatusResponse {
        StatusResponse::success(self.message.clone())
    }
}

/// Directory of agents backed by a [`RegistryStore`]
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn RegistryStore>,
    fetcher: Arc<dyn DescriptorFetcher>,
    prober: HealthProber,
}

impl RegistryService {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        fetcher: Arc<dyn DescriptorFetcher>,
        prober: HealthProber,
    ) -> Self {
        Self {
            store,
            fetcher,
            prober,
        }
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// Register or refresh the agent published at `address`.
    ///
    /// The record is keyed by the address the descriptor declares, falling
    /// back to `address` when it declares none.
    pub async fn register(&self, address: &str) -> Result<RegistrationOutcome> {
        let address = address.trim();
        validate_http_address(address)?;

        let descriptor = self.fetcher.fetch(address).await?;

        let key = match descriptor.declared_url() {
            Some(declared) if validate_http_address(declared).is_ok() => declared.to_string(),
            Some(declared) => {
                warn!(
                    "Agent '{}' declares an unusable url '{}', keying by {}",
                    descriptor.name, declared, address
                );
                address.to_string()
            }
            None => address.to_string(),
        };

        if let Some(existing) = self.store.find_by_name(&descriptor.name).await? {
            if existing.address != key {
                return Err(AgencyError::Conflict(format!(
                    "Agent name '{}' is already registered by another URL ({}).",
                    descriptor.name, existing.address
                )));
            }
        }

        let outcome = self.store.upsert_by_address(&key, &descriptor).await?;
        let created = outcome.is_created();
        let verb = if created { "registered" } else { "updated" };
        let record = outcome.into_record();
        let message = format!(
            "Agent '{}' {} successfully using card from {}.",
            record.name, verb, key
        );
        info!("{}", message);

        Ok(RegistrationOutcome {
            record,
            created,
            message,
        })
    }

    pub async fn get_by_name(&self, name: &str) -> Result<AgentView> {
        let record = self.store.find_by_name(name).await?.ok_or_else(|| {
            AgencyError::NotFound(format!("Agent with name '{}' not found.", name))
        })?;
        Ok(self.with_health(record).await)
    }

    pub async fn get_by_address(&self, address: &str) -> Result<AgentView> {
        let record = self.store.find_by_address(address).await?.ok_or_else(|| {
            AgencyError::NotFound(format!("Agent with URL '{}' not found.", address))
        })?;
        Ok(self.with_health(record).await)
    }

    /// A page of stored agents; listing never contacts the agents themselves
    pub async fn list(&self, skip: u64, limit: u64) -> Result<Page<AgentRecord>> {
        let (records, total) = self.store.list(skip, limit).await?;
        Ok(Page::new(records, total))
    }

    pub async fn deregister_by_name(&self, name: &str) -> Result<StatusResponse> {
        if !self.store.delete_by_name(name).await? {
            return Err(AgencyError::NotFound(format!(
                "Agent with name '{}' not found.",
                name
            )));
        }
        info!("Deregistered agent '{}'", name);
        Ok(StatusResponse::success(format!(
            "Agent '{}' deregistered successfully.",
            name
        )))
    }

    pub async fn deregister_by_address(&self, address: &str) -> Result<StatusResponse> {
        if !self.store.delete_by_address(address).await? {
            return Err(AgencyError::NotFound(format!(
                "Agent with URL '{}' not found.",
                address
            )));
        }
        info!("Deregistered agent at {}", address);
        Ok(StatusResponse::success(format!(
            "Agent with URL '{}' deregistered successfully.",
            address
        )))
    }

    /// Liveness of the registry itself and its store. Never fails.
    pub async fn health(&self) -> RegistryHealth {
        let store = match self.store.ping().await {
            Ok(()) => self.store.count().await,
            Err(e) => Err(e),
        };

        match store {
            Ok(agents) => RegistryHealth {
                status: "healthy".to_string(),
                store_connected: true,
                http_client_available: true,
                agents: Some(agents),
                details: None,
            },
            Err(e) => {
                warn!("Registry health check failed: {}", e);
                RegistryHealth {
                    status: "degraded".to_string(),
                    store_connected: false,
                    http_client_available: true,
                    agents: None,
                    details: Some(e.detail()),
                }
            }
        }
    }

    async fn with_health(&self, record: AgentRecord) -> AgentView {
        let health = self.prober.probe(&record.address).await;
        AgentView { record, health }
    }
}

impl std::fmt::Debug for RegistryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::AgentDescriptor;
    use crate::store::SurrealRegistryStore;
    use crate::testing::StubFetcher;
    use agency_common::{ErrorKind, StorageConfig};
    use std::time::Duration;

    async fn service_with(fetcher: Arc<StubFetcher>) -> RegistryService {
        let store = SurrealRegistryStore::new(&StorageConfig::memory("test", "service"))
            .await
            .unwrap();
        let prober = HealthProber::new(fetcher.clone(), Duration::from_secs(5));
        RegistryService::new(Arc::new(store), fetcher, prober)
    }

    fn card(name: &str) -> AgentDescriptor {
        AgentDescriptor::new(name, "test agent")
    }

    #[tokio::test]
    async fn test_register_then_lookup() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.publish("http://a:1", card("alpha"));
        let service = service_with(fetcher).await;

        let outcome = service.register("http://a:1").await.unwrap();
        assert!(outcome.created);
        assert!(outcome.message.contains("registered successfully"));

        let by_name = service.get_by_name("ALPHA").await.unwrap();
        assert_eq!(by_name.record.address, "http://a:1");
        assert!(by_name.health.is_online);

        let by_address = service.get_by_address("http://a:1").await.unwrap();
        assert_eq!(by_address.record.id, by_name.record.id);
    }

    #[tokio::test]
    async fn test_reregistration_is_idempotent() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.publish("http://a:1", card("alpha"));
        let service = service_with(fetcher).await;

        service.register("http://a:1").await.unwrap();
        let again = service.register("http://a:1").await.unwrap();
        assert!(!again.created);
        assert!(again.message.contains("updated successfully"));
        assert_eq!(service.list(0, 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_name_conflict_from_other_address() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.publish("http://a:1", card("alpha"));
        fetcher.publish("http://b:1", card("alpha"));
        let service = service_with(fetcher).await;

        service.register("http://a:1").await.unwrap();
        let err = service.register("http://b:1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let page = service.list(0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].address, "http://a:1");
    }

    #[tokio::test]
    async fn test_declared_url_becomes_the_key() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.publish(
            "http://10.0.0.5:10010",
            card("alpha").with_url("http://alpha.internal:10010"),
        );
        let service = service_with(fetcher).await;

        let outcome = service.register("http://10.0.0.5:10010").await.unwrap();
        assert_eq!(outcome.record.address, "http://alpha.internal:10010");
        assert!(service.get_by_address("http://10.0.0.5:10010").await.is_err());
        assert!(service.get_by_address("http://alpha.internal:10010").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected_before_fetching() {
        let fetcher = Arc::new(StubFetcher::new());
        let service = service_with(fetcher.clone()).await;

        let err = service.register("ftp://a:1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_agent_leaves_store_untouched() {
        let fetcher = Arc::new(StubFetcher::new());
        let service = service_with(fetcher).await;

        let err = service.register("http://nowhere:1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnreachable);
        assert_eq!(service.list(0, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_list_pagination_reads_only_the_store() {
        let fetcher = Arc::new(StubFetcher::new());
        for i in 0..3 {
            fetcher.publish(&format!("http://a{}:1", i), card(&format!("agent{}", i)));
        }
        let service = service_with(fetcher.clone()).await;
        for i in 0..3 {
            service.register(&format!("http://a{}:1", i)).await.unwrap();
        }

        let fetched = fetcher.calls();

        let page = service.list(1, 1).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "agent1");

        let json = Value::Object(page.items[0].to_flat_json());
        assert_eq!(json["name"], "agent1");
        assert!(json.get("health").is_none());
        assert_eq!(fetcher.calls(), fetched);

        let empty = service.list(10, 5).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.total, 3);
    }

    #[tokio::test]
    async fn test_lookup_of_offline_agent_still_returns_record() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.publish("http://a:1", card("alpha"));
        let service = service_with(fetcher).await;
        service.register("http://a:1").await.unwrap();

        // Re-create the service with a fetcher that knows nobody
        let offline = Arc::new(StubFetcher::new());
        let prober = HealthProber::new(offline.clone(), Duration::from_secs(5));
        let service = RegistryService::new(service.store().clone(), offline, prober);

        let view = service.get_by_name("alpha").await.unwrap();
        assert!(!view.health.is_online);
        assert!(view.health.last_checked.is_some());
    }

    #[tokio::test]
    async fn test_deregister() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.publish("http://a:1", card("alpha"));
        fetcher.publish("http://b:1", card("beta"));
        let service = service_with(fetcher).await;
        service.register("http://a:1").await.unwrap();
        service.register("http://b:1").await.unwrap();

        let status = service.deregister_by_name("Alpha").await.unwrap();
        assert!(status.is_success());
        let err = service.deregister_by_name("alpha").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        service.deregister_by_address("http://b:1").await.unwrap();
        let err = service.get_by_address("http://b:1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(service.list(0, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_health() {
        let service = service_with(Arc::new(StubFetcher::new())).await;
        let health = service.health().await;
        assert!(health.is_healthy());
        assert_eq!(health.status, "healthy");
        assert_eq!(health.agents, Some(0));
    }
}
