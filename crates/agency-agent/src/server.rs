//! HTTP surface of the agent
//!
//! Serves the descriptor at the well-known path and runs task requests
//! through the configured [`AgentExecutor`], streaming every task event
//! back to the caller as a server-sent event.

use std::sync::Arc;

use agency_framework::common::{DESCRIPTOR_PATH, agent_routes, generate_id, tasks::USER_ID_KEY};
use agency_framework::prelude::{
    AgencyError, AgentDescriptor, AgentExecutor, EventQueue, InMemoryTaskStore, Message,
    QueueMode, RequestContext, Resumption, Task, TaskClaim, TaskEvent,
};
use axum::{
    Extension, Router,
    extract::{Path, State, rejection::JsonRejection},
    middleware,
    response::{
        IntoResponse, Json,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::{StreamExt, future, stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthenticatedUser, Authenticator, require_auth};
use crate::error::ApiError;

pub struct AgentAppState {
    pub descriptor: AgentDescriptor,
    pub executor: Arc<dyn AgentExecutor>,
    pub tasks: InMemoryTaskStore,
    pub queue_mode: QueueMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: Message,
    #[serde(default)]
    pub context_id: Option<String>,
    /// Task to continue; a finished task is continued by a fresh task in its context
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelTaskRequest {
    pub task_id: String,
}

async fn get_descriptor(State(state): State<Arc<AgentAppState>>) -> Json<AgentDescriptor> {
    Json(state.descriptor.clone())
}

/// Build the request context and claim the task it will run
///
/// A message naming an idle task continues it; one naming a finished task
/// starts a new task in the same context.
async fn resolve_context(
    tasks: &InMemoryTaskStore,
    mut message: Message,
) -> Result<(RequestContext, TaskClaim), AgencyError> {
    if let Some(task_id) = message.task_id.clone() {
        match tasks.resume(&task_id, &message).await {
            Resumption::Resumed(task, claim) => {
                return Ok((RequestContext::new(message).with_task(task), claim));
            }
            Resumption::Finished(task) => {
                debug!(
                    "Task {} is {}; starting a new task in context {}",
                    task.id, task.state, task.context_id
                );
                message.context_id = Some(task.context_id);
            }
            Resumption::Busy => {
                return Err(AgencyError::Conflict(format!(
                    "Task '{}' is still executing",
                    task_id
                )));
            }
            Resumption::Missing => {
                return Err(AgencyError::NotFound(format!(
                    "Task '{}' not found",
                    task_id
                )));
            }
        }
    }

    let task_id = generate_id();
    let claim = tasks.claim(&task_id).ok_or_else(|| {
        AgencyError::Conflict(format!("Task '{}' is still executing", task_id))
    })?;
    message.task_id = Some(task_id);
    Ok((RequestContext::new(message), claim))
}

fn sse_event(event: &TaskEvent) -> Result<Event, axum::Error> {
    let name = match event {
        TaskEvent::Task(_) => "task",
        TaskEvent::StatusUpdate(_) => "status-update",
        TaskEvent::ArtifactUpdate(_) => "artifact-update",
    };
    Event::default().event(name).json_data(event)
}

fn error_event(err: &AgencyError) -> Result<Event, axum::Error> {
    Event::default()
        .event("error")
        .json_data(json!({ "detail": err.detail(), "kind": err.kind().as_str() }))
}

async fn send_message(
    State(state): State<Arc<AgentAppState>>,
    user: Option<Extension<AuthenticatedUser>>,
    request: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = request.map_err(|e| AgencyError::InvalidInput(e.body_text()))?;

    let mut message = request.message;
    if message.context_id.is_none() {
        message.context_id = request.context_id;
    }
    if message.task_id.is_none() {
        message.task_id = request.task_id;
    }
    if let Some(Extension(AuthenticatedUser(user))) = user {
        if message.user_id().is_none() {
            message.metadata.insert(USER_ID_KEY.to_string(), json!(user));
        }
    }

    let (context, claim) = resolve_context(&state.tasks, message).await?;
    info!("Accepted message for task {}", claim.task_id());

    let (queue, receiver) = EventQueue::new(state.queue_mode);
    let executor = state.executor.clone();
    let execution = tokio::spawn(async move { executor.execute(context, queue).await });

    let tasks = state.tasks.clone();
    let events = receiver.into_stream().then(move |event| {
        let tasks = tasks.clone();
        async move {
            tasks.apply(&event).await;
            sse_event(&event)
        }
    });

    // Surface an execution failure once the event stream has drained; the
    // claim is held until then so the final event is stored before release
    let outcome = stream::once(async move {
        let _claim = claim;
        match execution.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                warn!("Task execution failed: {}", e);
                Some(error_event(&e))
            }
            Err(e) => {
                error!("Task execution aborted: {}", e);
                Some(error_event(&AgencyError::Generic(
                    "Task execution aborted".to_string(),
                )))
            }
        }
    })
    .filter_map(future::ready);

    Ok(Sse::new(events.chain(outcome).boxed()).keep_alive(KeepAlive::default()))
}

async fn cancel_task(
    State(state): State<Arc<AgentAppState>>,
    request: Result<Json<CancelTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(request) = request.map_err(|e| AgencyError::InvalidInput(e.body_text()))?;

    let mut context = RequestContext {
        context_id: None,
        task_id: Some(request.task_id.clone()),
        message: None,
        current_task: None,
    };
    if let Some(task) = state.tasks.get(&request.task_id).await {
        context = context.with_task(task);
    }

    let (queue, mut receiver) = EventQueue::new(state.queue_mode);
    state.executor.cancel(&context, queue).await?;
    for event in receiver.drain() {
        state.tasks.apply(&event).await;
    }

    state
        .tasks
        .get(&request.task_id)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError(AgencyError::NotFound(format!(
                "Task '{}' not found",
                request.task_id
            )))
        })
}

async fn get_task(
    State(state): State<Arc<AgentAppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    state.tasks.get(&task_id).await.map(Json).ok_or_else(|| {
        ApiError(AgencyError::NotFound(format!("Task '{}' not found", task_id)))
    })
}

/// All agent routes behind the authentication middleware
pub fn agent_router(state: AgentAppState, auth: Authenticator) -> Router {
    Router::new()
        .route(DESCRIPTOR_PATH, get(get_descriptor))
        .route(agent_routes::SEND_MESSAGE, post(send_message))
        .route(agent_routes::CANCEL, post(cancel_task))
        .route(agent_routes::GET_TASK, get(get_task))
        .layer(middleware::from_fn_with_state(Arc::new(auth), require_auth))
        .with_state(Arc::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::build_descriptor;
    use crate::echo::EchoAgent;
    use agency_framework::prelude::{
        AgentServerConfig, Credentials, Part, StreamingExecutor, TaskState,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(config: &AgentServerConfig) -> (Router, InMemoryTaskStore) {
        let tasks = InMemoryTaskStore::new();
        let agent = EchoAgent::new(&config.agent_name).with_delay(Duration::ZERO);
        let state = AgentAppState {
            descriptor: build_descriptor(config),
            executor: Arc::new(StreamingExecutor::new(agent)),
            tasks: tasks.clone(),
            queue_mode: config.queue_mode,
        };
        (
            agent_router(state, Authenticator::from_config(config)),
            tasks,
        )
    }

    fn app() -> (Router, InMemoryTaskStore) {
        app_with(&AgentServerConfig::default())
    }

    fn send_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Collect the SSE body and decode each `data:` line
    async fn read_events(response: axum::response::Response) -> (Vec<TaskEvent>, Vec<Value>) {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let mut events = Vec::new();
        let mut errors = Vec::new();
        let mut current = "";
        for line in text.lines() {
            if let Some(name) = line.strip_prefix("event: ") {
                current = name;
            } else if let Some(data) = line.strip_prefix("data: ") {
                if current == "error" {
                    errors.push(serde_json::from_str(data).unwrap());
                } else {
                    events.push(serde_json::from_str(data).unwrap());
                }
            }
        }
        (events, errors)
    }

    fn response_text(events: &[TaskEvent]) -> Option<String> {
        events.iter().find_map(|event| match event {
            TaskEvent::ArtifactUpdate(update) => {
                update.artifact.parts.first().and_then(Part::as_text).map(str::to_string)
            }
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_descriptor_is_served() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(DESCRIPTOR_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["name"], "echo_agent");
    }

    #[tokio::test]
    async fn test_send_message_streams_task_to_completion() {
        let (app, tasks) = app();
        let message = Message::user_text("hello world");
        let response = app
            .oneshot(send_request(json!({ "message": message })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (events, errors) = read_events(response).await;
        assert!(errors.is_empty());
        assert!(matches!(events.first(), Some(TaskEvent::Task(_))));
        let last = events.last().unwrap();
        assert!(last.is_final());
        assert_eq!(last.state(), Some(TaskState::Completed));
        assert_eq!(response_text(&events).as_deref(), Some("hello world"));

        let stored = tasks.get(last.task_id()).await.unwrap();
        assert_eq!(stored.state, TaskState::Completed);
        assert_eq!(stored.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_stored_task_carries_token_counts() {
        let (app, tasks) = app();
        let response = app
            .oneshot(send_request(json!({ "message": Message::user_text("hello world") })))
            .await
            .unwrap();
        let (events, _) = read_events(response).await;
        let stored = tasks.get(events.last().unwrap().task_id()).await.unwrap();

        assert!(!stored.token_counts.is_empty());
        assert_eq!(stored.token_counts.get("input_tokens"), 2);
        assert_eq!(stored.token_counts.get("output_tokens"), 2);
        assert_eq!(stored.artifacts[0].metadata, stored.token_counts.to_metadata());
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (app, _) = app();
        let response = app
            .oneshot(send_request(json!({
                "message": Message::user_text("hi"),
                "task_id": "missing"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_finished_task_continues_in_same_context() {
        let (app, _) = app();
        let response = app
            .clone()
            .oneshot(send_request(json!({ "message": Message::user_text("first") })))
            .await
            .unwrap();
        let (first, _) = read_events(response).await;
        let finished = first.last().unwrap();
        let TaskEvent::StatusUpdate(update) = finished else {
            panic!("expected a status update");
        };

        let response = app
            .oneshot(send_request(json!({
                "message": Message::user_text("second"),
                "task_id": update.task_id
            })))
            .await
            .unwrap();
        let (second, _) = read_events(response).await;
        let Some(TaskEvent::Task(task)) = second.first() else {
            panic!("expected a new task");
        };
        assert_ne!(task.id, update.task_id);
        assert_eq!(task.context_id, update.context_id);
    }

    #[tokio::test]
    async fn test_concurrent_continuations_run_task_once() {
        let (app, tasks) = app();
        let mut task = Task::from_message(&Message::user_text("start"));
        task.state = TaskState::Working;
        let task_id = task.id.clone();
        tasks.save(task).await;

        let continuation = |text: &str| {
            send_request(json!({
                "message": Message::user_text(text),
                "task_id": task_id
            }))
        };
        let (first, second) = tokio::join!(
            app.clone().oneshot(continuation("one")),
            app.clone().oneshot(continuation("two"))
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        let mut statuses = [first.status(), second.status()];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

        let accepted = if first.status() == StatusCode::OK { first } else { second };
        let (events, errors) = read_events(accepted).await;
        assert!(errors.is_empty());
        let terminal = events
            .iter()
            .filter(|event| event.task_id() == task_id && event.is_final())
            .count();
        assert_eq!(terminal, 1);

        let stored = tasks.get(&task_id).await.unwrap();
        assert_eq!(stored.state, TaskState::Completed);
        assert_eq!(stored.artifacts.len(), 1);
        assert!(!tasks.is_running(&task_id));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_input() {
        let (app, _) = app();
        let response = app
            .oneshot(send_request(json!({ "message": "not a message" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_is_unsupported() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tasks/cancel")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "task_id": "t-1" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "unsupported-operation");
    }

    #[tokio::test]
    async fn test_secure_agent_requires_credentials_except_descriptor() {
        let config = AgentServerConfig {
            secure_agent: true,
            credentials: Credentials {
                api_keys: HashMap::from([("alice".to_string(), "key-123".to_string())]),
                users: HashMap::new(),
            },
            ..AgentServerConfig::default()
        };
        let (app, _) = app_with(&config);

        let response = app
            .clone()
            .oneshot(send_request(json!({ "message": Message::user_text("hi") })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(DESCRIPTOR_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut request = send_request(json!({ "message": Message::user_text("hi there") }));
        request.headers_mut().insert(
            header::AUTHORIZATION,
            "Bearer key-123".parse().unwrap(),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let (events, _) = read_events(response).await;
        assert_eq!(
            response_text(&events).as_deref(),
            Some("hi there (for alice)")
        );
    }
}
