//! Bridges a streaming agent to the task protocol

use crate::queue::EventQueue;
use crate::types::{Message, Part, Task, TokenCounts};
use crate::updater::TaskUpdater;
use agency_common::{
    AgencyError, Result,
    tasks::{PROCESSING_PLACEHOLDER, RESPONSE_ARTIFACT},
    truncate_string,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One item of an agent's response stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentUpdate {
    pub content: Option<String>,
    /// This is the last item the bridge will read
    pub is_final: bool,
    /// Only meaningful on a final item
    pub requires_input: bool,
    pub token_deltas: TokenCounts,
}

impl AgentUpdate {
    /// A progress update; the task stays in `working`
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// The final answer
    pub fn final_answer(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            is_final: true,
            ..Default::default()
        }
    }

    /// A final item asking the caller for more input
    pub fn needs_input(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            is_final: true,
            requires_input: true,
            ..Default::default()
        }
    }

    pub fn with_tokens(mut self, name: &str, count: u64) -> Self {
        self.token_deltas.add(name, count);
        self
    }

    fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// An agent that answers a query as an ordered stream of updates
pub trait StreamingAgent: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn stream_response(
        &self,
        query: String,
        context_id: String,
        user_id: String,
    ) -> BoxStream<'static, AgentUpdate>;
}

/// Everything the executor knows about an incoming request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub context_id: Option<String>,
    pub task_id: Option<String>,
    pub message: Option<Message>,
    /// The task being continued, if the request names one that exists
    pub current_task: Option<Task>,
}

impl RequestContext {
    pub fn new(message: Message) -> Self {
        Self {
            context_id: message.context_id.clone(),
            task_id: message.task_id.clone(),
            message: Some(message),
            current_task: None,
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task_id = Some(task.id.clone());
        self.context_id = Some(task.context_id.clone());
        self.current_task = Some(task);
        self
    }

    /// Text of the incoming message
    pub fn user_input(&self) -> String {
        self.message.as_ref().map(Message::text).unwrap_or_default()
    }

    /// Caller identity from message metadata, empty when absent
    pub fn user_id(&self) -> String {
        self.message
            .as_ref()
            .and_then(Message::user_id)
            .unwrap_or_default()
            .to_string()
    }
}

/// Runs requests against an agent and reports progress on the queue
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, context: RequestContext, queue: EventQueue) -> Result<()>;

    /// Cancellation is not supported unless an executor says otherwise
    async fn cancel(&self, context: &RequestContext, _queue: EventQueue) -> Result<()> {
        Err(AgencyError::UnsupportedOperation(format!(
            "Task cancellation is not supported (task {})",
            context.task_id.as_deref().unwrap_or("unknown")
        )))
    }
}

/// [`AgentExecutor`] for any [`StreamingAgent`]
pub struct StreamingExecutor<A: StreamingAgent> {
    agent: Arc<A>,
}

impl<A: StreamingAgent> StreamingExecutor<A> {
    pub fn new(agent: A) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }

    pub fn from_arc(agent: Arc<A>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }
}

#[async_trait]
impl<A: StreamingAgent> AgentExecutor for StreamingExecutor<A> {
    async fn execute(&self, context: RequestContext, queue: EventQueue) -> Result<()> {
        let query = context.user_input();
        let user_id = context.user_id();

        let mut updater = match context.current_task {
            Some(task) => TaskUpdater::new(queue, task),
            None => {
                let message = context.message.as_ref().ok_or_else(|| {
                    AgencyError::FatalPrecondition(
                        "Request has neither a current task nor a message".to_string(),
                    )
                })?;
                TaskUpdater::submit(queue, message).await?
            }
        };

        let task_id = updater.task().id.clone();
        let context_id = updater.task().context_id.clone();
        info!(
            "Agent '{}' handling task {} ({})",
            self.agent.name(),
            task_id,
            truncate_string(&query, 80)
        );

        let mut stream = self
            .agent
            .stream_response(query, context_id, user_id);

        while let Some(update) = stream.next().await {
            updater.record_tokens(&update.token_deltas);

            if !update.is_final {
                let text = update.text().unwrap_or(PROCESSING_PLACEHOLDER);
                let message = updater.new_agent_message(text);
                updater.start_work(message).await?;
                continue;
            }

            if update.requires_input {
                let text = update.text().unwrap_or(PROCESSING_PLACEHOLDER);
                let message = updater.new_agent_message(text);
                updater.requires_input(message).await?;
                info!("Task {} is waiting for input", task_id);
            } else {
                let content = update.text().unwrap_or_default().to_string();
                let metadata = updater.task().token_counts.to_metadata();
                updater
                    .add_artifact(RESPONSE_ARTIFACT, vec![Part::text(content)], metadata)
                    .await?;
                updater.complete(None).await?;
                info!("Task {} completed", task_id);
            }

            // Anything the agent would yield after a final item is dropped unread
            debug!("Dropping the response stream of task {}", task_id);
            return Ok(());
        }

        warn!(
            "Response stream of task {} ended without a final update; task stays {}",
            task_id,
            updater.state()
        );
        Ok(())
    }
}
