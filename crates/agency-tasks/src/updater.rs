//! Task state machine that publishes every change to the task's queue

use crate::queue::EventQueue;
use crate::types::{
    Artifact, Message, Part, Task, TaskArtifactUpdate, TaskEvent, TaskState, TaskStatusUpdate,
    TokenCounts,
};
use agency_common::{AgencyError, Result};
use serde_json::{Map, Value};
use tracing::debug;

/// Owns a task snapshot and emits an event for every change applied to it.
///
/// An event is only recorded in the snapshot once it has been enqueued, so
/// a closed queue leaves the snapshot untouched.
#[derive(Debug)]
pub struct TaskUpdater {
    queue: EventQueue,
    task: Task,
}

impl TaskUpdater {
    /// Continue an existing task
    pub fn new(queue: EventQueue, task: Task) -> Self {
        Self { queue, task }
    }

    /// Create a new task from `message` and announce it
    pub async fn submit(queue: EventQueue, message: &Message) -> Result<Self> {
        let task = Task::from_message(message);
        debug!("Submitting task {} in context {}", task.id, task.context_id);
        queue.enqueue(TaskEvent::Task(task.clone())).await?;
        Ok(Self { queue, task })
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn state(&self) -> TaskState {
        self.task.state
    }

    pub fn into_task(self) -> Task {
        self.task
    }

    /// An agent message addressed to this task
    pub fn new_agent_message(&self, text: impl Into<String>) -> Message {
        Message::agent_text(text, &self.task.context_id, &self.task.id)
    }

    pub fn record_tokens(&mut self, deltas: &TokenCounts) {
        self.task.token_counts.merge(deltas);
    }

    pub async fn start_work(&mut self, message: Message) -> Result<()> {
        self.transition(TaskState::Working, Some(message), false).await
    }

    pub async fn requires_input(&mut self, message: Message) -> Result<()> {
        self.transition(TaskState::InputRequired, Some(message), true)
            .await
    }

    pub async fn complete(&mut self, message: Option<Message>) -> Result<()> {
        self.transition(TaskState::Completed, message, true).await
    }

    pub async fn cancel(&mut self, message: Option<Message>) -> Result<()> {
        self.transition(TaskState::Canceled, message, true).await
    }

    /// Attach a named artifact. Only allowed while the task is still open.
    pub async fn add_artifact(
        &mut self,
        name: &str,
        parts: Vec<Part>,
        metadata: Map<String, Value>,
    ) -> Result<Artifact> {
        if self.task.state.is_terminal() {
            return Err(AgencyError::InvalidTransition(format!(
                "task {} is {} and accepts no artifacts",
                self.task.id, self.task.state
            )));
        }

        let artifact = Artifact::new(name, parts, metadata);
        let event = TaskEvent::ArtifactUpdate(TaskArtifactUpdate {
            task_id: self.task.id.clone(),
            context_id: self.task.context_id.clone(),
            artifact: artifact.clone(),
        });
        self.queue.enqueue(event.clone()).await?;
        self.task.apply(&event);
        Ok(artifact)
    }

    async fn transition(
        &mut self,
        next: TaskState,
        message: Option<Message>,
        is_final: bool,
    ) -> Result<()> {
        if !self.task.state.can_transition_to(next) {
            return Err(AgencyError::InvalidTransition(format!(
                "task {} cannot move from {} to {}",
                self.task.id, self.task.state, next
            )));
        }

        let event = TaskEvent::StatusUpdate(TaskStatusUpdate {
            task_id: self.task.id.clone(),
            context_id: self.task.context_id.clone(),
            state: next,
            message,
            is_final,
            token_counts: self.task.token_counts.clone(),
        });
        self.queue.enqueue(event.clone()).await?;
        self.task.apply(&event);
        debug!("Task {} is now {}", self.task.id, next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_happy_path_events() {
        let (queue, mut receiver) = EventQueue::unbounded();
        let mut updater = TaskUpdater::submit(queue, &Message::user_text("hi"))
            .await
            .unwrap();

        let working = updater.new_agent_message("thinking");
        updater.start_work(working).await.unwrap();
        updater
            .add_artifact("response", vec![Part::text("done")], Map::new())
            .await
            .unwrap();
        updater.complete(None).await.unwrap();

        let events = receiver.drain();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], TaskEvent::Task(_)));
        assert_eq!(events[1].state(), Some(TaskState::Working));
        assert!(matches!(events[2], TaskEvent::ArtifactUpdate(_)));
        assert_eq!(events[3].state(), Some(TaskState::Completed));
        assert!(events[3].is_final());

        assert_eq!(updater.state(), TaskState::Completed);
        assert_eq!(updater.task().artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_task_rejects_changes() {
        let (queue, mut receiver) = EventQueue::unbounded();
        let mut updater = TaskUpdater::submit(queue, &Message::user_text("hi"))
            .await
            .unwrap();
        let question = updater.new_agent_message("which one?");
        updater.requires_input(question).await.unwrap();

        let again = updater.new_agent_message("still working");
        let err = updater.start_work(again).await.unwrap_err();
        assert!(matches!(err, AgencyError::InvalidTransition(_)));
        assert!(updater.complete(None).await.is_err());
        assert!(
            updater
                .add_artifact("response", vec![], Map::new())
                .await
                .is_err()
        );

        // task + input-required, nothing after
        assert_eq!(receiver.drain().len(), 2);
        assert_eq!(updater.state(), TaskState::InputRequired);
    }

    #[tokio::test]
    async fn test_closed_queue_leaves_state_untouched() {
        let (queue, receiver) = EventQueue::unbounded();
        let mut updater = TaskUpdater::submit(queue, &Message::user_text("hi"))
            .await
            .unwrap();
        drop(receiver);

        let message = updater.new_agent_message("lost");
        let err = updater.start_work(message).await.unwrap_err();
        assert!(matches!(err, AgencyError::QueueClosed));
        assert_eq!(updater.state(), TaskState::Submitted);
    }

    #[tokio::test]
    async fn test_record_tokens_accumulates() {
        let (queue, _receiver) = EventQueue::unbounded();
        let mut updater = TaskUpdater::new(queue, Task::from_message(&Message::user_text("x")));
        updater.record_tokens(&TokenCounts::new().with("output_tokens", 2));
        updater.record_tokens(&TokenCounts::new().with("output_tokens", 3));
        assert_eq!(updater.task().token_counts.get("output_tokens"), 5);
    }
}
