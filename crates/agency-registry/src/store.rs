//! Persistence of agent records using SurrealDB
//!
//! Records are keyed by address. Address and name are both unique; the
//! name index is kept on a lowercased copy of the name so that lookups
//! and uniqueness agree on case-insensitivity.

use crate::descriptor::AgentDescriptor;
use agency_common::{
    AgencyError, Result, StorageBackend, StorageConfig, generate_id, parse_rfc3339_or_now,
    to_rfc3339,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use surrealdb::{
    Surreal,
    engine::local::{Db, Mem, SurrealKv},
};
use tracing::{debug, info};

const TABLE: &str = "agents";
const ADDRESS_INDEX: &str = "agents_address";
const NAME_INDEX: &str = "agents_name";
const FIELDS: &str = "agent_id, address, name, is_freelancer, descriptor, created_at, updated_at";

/// A registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    /// Canonical address; the unique key of the record
    pub address: String,
    pub name: String,
    pub is_freelancer: bool,
    pub descriptor: AgentDescriptor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// The record's fields flattened over its descriptor's fields
    pub fn to_flat_json(&self) -> Map<String, Value> {
        let mut map = self.descriptor.to_json_map();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("url".to_string(), Value::String(self.address.clone()));
        map.insert("name".to_string(), Value::String(self.name.clone()));
        map.insert("is_freelancer".to_string(), Value::Bool(self.is_freelancer));
        map.insert(
            "created_at".to_string(),
            Value::String(to_rfc3339(&self.created_at)),
        );
        map.insert(
            "updated_at".to_string(),
            Value::String(to_rfc3339(&self.updated_at)),
        );
        map
    }
}

/// Whether an upsert inserted a new record or replaced an existing one
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(AgentRecord),
    Updated(AgentRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &AgentRecord {
        match self {
            UpsertOutcome::Created(record) | UpsertOutcome::Updated(record) => record,
        }
    }

    pub fn into_record(self) -> AgentRecord {
        match self {
            UpsertOutcome::Created(record) | UpsertOutcome::Updated(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Durable keyed storage of agent records
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert or replace the record stored under `address`.
    /// Fails with `Conflict` if another address already holds the name.
    async fn upsert_by_address(
        &self,
        address: &str,
        descriptor: &AgentDescriptor,
    ) -> Result<UpsertOutcome>;

    async fn find_by_address(&self, address: &str) -> Result<Option<AgentRecord>>;

    /// Case-insensitive lookup by name
    async fn find_by_name(&self, name: &str) -> Result<Option<AgentRecord>>;

    async fn delete_by_address(&self, address: &str) -> Result<bool>;

    async fn delete_by_name(&self, name: &str) -> Result<bool>;

    /// Records ordered by creation time, plus the total record count
    async fn list(&self, offset: u64, limit: u64) -> Result<(Vec<AgentRecord>, u64)>;

    async fn count(&self) -> Result<u64>;

    /// Cheap round trip used by the health endpoint
    async fn ping(&self) -> Result<()>;
}

/// Row layout in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAgent {
    agent_id: String,
    address: String,
    name: String,
    is_freelancer: bool,
    /// Descriptor serialized as a JSON string
    descriptor: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<StoredAgent> for AgentRecord {
    type Error = AgencyError;

    fn try_from(stored: StoredAgent) -> Result<Self> {
        let descriptor: AgentDescriptor = serde_json::from_str(&stored.descriptor)?;
        Ok(AgentRecord {
            id: stored.agent_id,
            address: stored.address,
            name: stored.name,
            is_freelancer: stored.is_freelancer,
            descriptor,
            created_at: parse_rfc3339_or_now(&stored.created_at),
            updated_at: parse_rfc3339_or_now(&stored.updated_at),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Unique-index violations surface as conflicts, everything else as storage errors
fn write_error(context: &str, err: surrealdb::Error) -> AgencyError {
    let message = err.to_string();
    if message.contains("already contains") {
        let field = if message.contains(NAME_INDEX) {
            "name"
        } else if message.contains(ADDRESS_INDEX) {
            "address"
        } else {
            "key"
        };
        return AgencyError::Conflict(format!(
            "An agent with this {} is already registered",
            field
        ));
    }
    AgencyError::Storage(format!("{}: {}", context, message))
}

fn read_error(context: &str, err: surrealdb::Error) -> AgencyError {
    AgencyError::Storage(format!("{}: {}", context, err))
}

/// SurrealDB registry store
#[derive(Clone)]
pub struct SurrealRegistryStore {
    db: Surreal<Db>,
}

impl SurrealRegistryStore {
    /// Open the store and make sure the schema exists
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let db: Surreal<Db> = match config.backend {
            StorageBackend::SurrealFile => {
                let path = config.path.clone().ok_or_else(|| {
                    AgencyError::Config("File storage backend requires a path".to_string())
                })?;
                debug!("Initializing SurrealDB in file mode at: {:?}", path);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Surreal::new::<SurrealKv>(path).await.map_err(|e| {
                    AgencyError::Storage(format!(
                        "Failed to create SurrealDB file connection: {}",
                        e
                    ))
                })?
            }
            StorageBackend::SurrealMemory => {
                debug!("Initializing SurrealDB in memory mode");
                Surreal::new::<Mem>(()).await.map_err(|e| {
                    AgencyError::Storage(format!("Failed to create SurrealDB connection: {}", e))
                })?
            }
        };

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                AgencyError::Storage(format!("Failed to set namespace/database: {}", e))
            })?;

        let store = Self { db };
        store.initialize_schema().await?;
        info!(
            "Registry store ready ({:?}, ns={}, db={})",
            config.backend, config.namespace, config.database
        );
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let schema = format!(
            "DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;
             DEFINE INDEX IF NOT EXISTS {address_index} ON {table} FIELDS address UNIQUE;
             DEFINE INDEX IF NOT EXISTS {name_index} ON {table} FIELDS name_key UNIQUE;",
            table = TABLE,
            address_index = ADDRESS_INDEX,
            name_index = NAME_INDEX,
        );

        self.db
            .query(schema)
            .await
            .and_then(|response| response.check())
            .map_err(|e| read_error("Failed to initialize registry schema", e))?;

        debug!("Registry schema initialized");
        Ok(())
    }

    async fn select_one(&self, field: &str, value: String) -> Result<Option<AgentRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $value LIMIT 1",
            FIELDS, TABLE, field
        );
        let mut response = self
            .db
            .query(sql)
            .bind(("value", value))
            .await
            .map_err(|e| read_error("Failed to query agent", e))?;

        let rows: Vec<StoredAgent> = response
            .take(0)
            .map_err(|e| read_error("Failed to read agent", e))?;

        rows.into_iter().next().map(AgentRecord::try_from).transpose()
    }

    async fn delete_record(&self, record: &AgentRecord) -> Result<()> {
        self.db
            .query("DELETE type::thing($table, $agent_id) RETURN NONE")
            .bind(("table", TABLE))
            .bind(("agent_id", record.id.clone()))
            .await
            .and_then(|response| response.check())
            .map_err(|e| write_error("Failed to delete agent", e))?;

        debug!("Deleted agent '{}' at {}", record.name, record.address);
        Ok(())
    }

    /// Name the current holder when a write lost a race for `name`
    async fn name_conflict(&self, address: &str, name: &str, err: AgencyError) -> AgencyError {
        if !matches!(err, AgencyError::Conflict(_)) {
            return err;
        }
        match self.find_by_name(name).await {
            Ok(Some(holder)) if holder.address != address => AgencyError::Conflict(format!(
                "Agent name '{}' is already registered by another URL ({}).",
                name, holder.address
            )),
            _ => err,
        }
    }
}

#[async_trait]
impl RegistryStore for SurrealRegistryStore {
    async fn upsert_by_address(
        &self,
        address: &str,
        descriptor: &AgentDescriptor,
    ) -> Result<UpsertOutcome> {
        let now = Utc::now();
        let descriptor_json = serde_json::to_string(descriptor)?;

        if let Some(existing) = self.find_by_address(address).await? {
            let written = self
                .db
                .query(
                    "UPDATE type::thing($table, $agent_id) SET
                        name = $name,
                        name_key = $name_key,
                        descriptor = $descriptor,
                        updated_at = $updated_at
                     RETURN NONE",
                )
                .bind(("table", TABLE))
                .bind(("agent_id", existing.id.clone()))
                .bind(("name", descriptor.name.clone()))
                .bind(("name_key", name_key(&descriptor.name)))
                .bind(("descriptor", descriptor_json))
                .bind(("updated_at", to_rfc3339(&now)))
                .await
                .and_then(|response| response.check());
            if let Err(e) = written {
                let err = write_error("Failed to update agent", e);
                return Err(self.name_conflict(address, &descriptor.name, err).await);
            }

            debug!("Updated agent '{}' at {}", descriptor.name, address);
            return Ok(UpsertOutcome::Updated(AgentRecord {
                name: descriptor.name.clone(),
                descriptor: descriptor.clone(),
                updated_at: now,
                ..existing
            }));
        }

        let record = AgentRecord {
            id: generate_id(),
            address: address.to_string(),
            name: descriptor.name.clone(),
            is_freelancer: true,
            descriptor: descriptor.clone(),
            created_at: now,
            updated_at: now,
        };

        let written = self
            .db
            .query(
                "CREATE type::thing($table, $agent_id) SET
                    agent_id = $agent_id,
                    address = $address,
                    name = $name,
                    name_key = $name_key,
                    is_freelancer = $is_freelancer,
                    descriptor = $descriptor,
                    created_at = $created_at,
                    updated_at = $updated_at
                 RETURN NONE",
            )
            .bind(("table", TABLE))
            .bind(("agent_id", record.id.clone()))
            .bind(("address", record.address.clone()))
            .bind(("name", record.name.clone()))
            .bind(("name_key", name_key(&record.name)))
            .bind(("is_freelancer", record.is_freelancer))
            .bind(("descriptor", descriptor_json))
            .bind(("created_at", to_rfc3339(&now)))
            .bind(("updated_at", to_rfc3339(&now)))
            .await
            .and_then(|response| response.check());
        if let Err(e) = written {
            let err = write_error("Failed to create agent", e);
            return Err(self.name_conflict(address, &record.name, err).await);
        }

        debug!("Created agent '{}' at {}", record.name, address);
        Ok(UpsertOutcome::Created(record))
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<AgentRecord>> {
        self.select_one("address", address.to_string()).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<AgentRecord>> {
        self.select_one("name_key", name_key(name)).await
    }

    async fn delete_by_address(&self, address: &str) -> Result<bool> {
        match self.find_by_address(address).await? {
            Some(record) => {
                self.delete_record(&record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_name(&self, name: &str) -> Result<bool> {
        match self.find_by_name(name).await? {
            Some(record) => {
                self.delete_record(&record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<(Vec<AgentRecord>, u64)> {
        // Page and total come from one transaction so they always agree
        let sql = format!(
            "BEGIN TRANSACTION;
             SELECT {fields} FROM {table} ORDER BY created_at ASC, agent_id ASC LIMIT {limit} START {offset};
             SELECT count() AS total FROM {table} GROUP ALL;
             COMMIT TRANSACTION;",
            fields = FIELDS,
            table = TABLE,
        );
        let mut response = self
            .db
            .query(sql)
            .await
            .map_err(|e| read_error("Failed to list agents", e))?;

        let rows: Vec<StoredAgent> = response
            .take(0)
            .map_err(|e| read_error("Failed to read agent list", e))?;
        let counts: Vec<CountRow> = response
            .take(1)
            .map_err(|e| read_error("Failed to read agent count", e))?;

        let records = rows
            .into_iter()
            .map(AgentRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        let total = counts.first().map(|row| row.total).unwrap_or(0);

        Ok((records, total))
    }

    async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT count() AS total FROM {} GROUP ALL", TABLE);
        let mut response = self
            .db
            .query(sql)
            .await
            .map_err(|e| read_error("Failed to count agents", e))?;

        let rows: Vec<CountRow> = response
            .take(0)
            .map_err(|e| read_error("Failed to read agent count", e))?;

        Ok(rows.first().map(|row| row.total).unwrap_or(0))
    }

    async fn ping(&self) -> Result<()> {
        self.db
            .query("RETURN true")
            .await
            .and_then(|response| response.check())
            .map_err(|e| read_error("Registry store is not responding", e))?;
        Ok(())
    }
}
