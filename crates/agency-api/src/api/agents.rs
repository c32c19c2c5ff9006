//! Agent registry endpoints
//!
//! Registration, lookup by name or address, paginated listing and
//! deregistration. Single-agent reads probe the agent's health on the way out.

use super::error::ApiError;
use agency_framework::common::{paging, routes};
use agency_framework::prelude::{AgentRecord, RegistryService};
use axum::{
    Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared state for registry endpoints
pub struct RegistryApiState {
    pub service: RegistryService,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub agent_service_url: String,
}

/// Pagination parameters, signed so negative values can be rejected explicitly
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl ListQuery {
    /// Resolve defaults and check bounds
    pub fn window(&self) -> Result<(u64, u64), ApiError> {
        let skip = self.skip.unwrap_or(paging::DEFAULT_SKIP as i64);
        let limit = self.limit.unwrap_or(paging::DEFAULT_LIMIT as i64);

        if skip < 0 {
            return Err(ApiError::invalid_input(format!(
                "skip must be >= 0, got {}",
                skip
            )));
        }
        if limit < paging::MIN_LIMIT as i64 || limit > paging::MAX_LIMIT as i64 {
            return Err(ApiError::invalid_input(format!(
                "limit must be between {} and {}, got {}",
                paging::MIN_LIMIT,
                paging::MAX_LIMIT,
                limit
            )));
        }
        Ok((skip as u64, limit as u64))
    }
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub agents: Vec<Value>,
}

/// Register or refresh an agent from its published descriptor
pub async fn register_agent(
    State(state): State<Arc<RegistryApiState>>,
    request: Result<Json<RegisterAgentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    info!("Registration request for {}", request.agent_service_url);

    let outcome = state.service.register(&request.agent_service_url).await?;
    Ok(Json(outcome.status()))
}

/// List stored agents with pagination
pub async fn list_agents(
    State(state): State<Arc<RegistryApiState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let (skip, limit) = query.window()?;
    debug!("Listing agents (skip={}, limit={})", skip, limit);

    let page = state.service.list(skip, limit).await?;
    Ok(Json(AgentListResponse {
        total: page.total,
        skip,
        limit,
        agents: page
            .items
            .iter()
            .map(AgentRecord::to_flat_json)
            .map(Value::Object)
            .collect(),
    }))
}

/// Get a specific agent by name (case-insensitive)
pub async fn get_agent_by_name(
    State(state): State<Arc<RegistryApiState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    debug!("Looking up agent by name: {}", name);
    let view = state.service.get_by_name(&name).await?;
    Ok(Json(view.to_json()))
}

/// Get a specific agent by its address
pub async fn get_agent_by_url(
    State(state): State<Arc<RegistryApiState>>,
    query: Result<Query<UrlQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    debug!("Looking up agent by url: {}", query.url);
    let view = state.service.get_by_address(&query.url).await?;
    Ok(Json(view.to_json()))
}

pub async fn deregister_agent_by_name(
    State(state): State<Arc<RegistryApiState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Deregistration request for agent '{}'", name);
    let status = state.service.deregister_by_name(&name).await?;
    Ok(Json(status))
}

pub async fn deregister_agent_by_url(
    State(state): State<Arc<RegistryApiState>>,
    query: Result<Query<UrlQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    info!("Deregistration request for {}", query.url);
    let status = state.service.deregister_by_address(&query.url).await?;
    Ok(Json(status))
}

/// Registry self-report; degraded when the store does not answer
pub async fn health(State(state): State<Arc<RegistryApiState>>) -> impl IntoResponse {
    let report = state.service.health().await;
    let body = serde_json::to_value(&report).unwrap_or_else(|_| json!({"status": "degraded"}));
    Json(body)
}

/// Create router for registry endpoints
pub fn registry_routes(state: RegistryApiState) -> Router {
    Router::new()
        .route(routes::REGISTER, post(register_agent))
        .route(routes::LIST, get(list_agents))
        .route(routes::BY_NAME, get(get_agent_by_name))
        .route(routes::BY_URL, get(get_agent_by_url))
        .route(routes::DEREGISTER_BY_NAME, delete(deregister_agent_by_name))
        .route(routes::DEREGISTER_BY_URL, delete(deregister_agent_by_url))
        .route(routes::HEALTH, get(health))
        .with_state(Arc::new(state))
}
