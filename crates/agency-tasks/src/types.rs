//! Protocol types: tasks, messages, artifacts and the events that describe them

use agency_common::{generate_id, tasks::USER_ID_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
}

impl TaskState {
    /// Terminal states accept no further events
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::InputRequired | TaskState::Completed | TaskState::Canceled
        )
    }

    /// `submitted -> working* -> (input-required | completed | canceled)`
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match self {
            TaskState::Submitted | TaskState::Working => next != TaskState::Submitted,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named token counters, accumulated over a task's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCounts(BTreeMap<String, u64>);

impl TokenCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, count: u64) -> Self {
        self.add(name, count);
        self
    }

    pub fn add(&mut self, name: &str, count: u64) {
        *self.0.entry(name.to_string()).or_insert(0) += count;
    }

    /// Add every counter of `deltas` into `self`
    pub fn merge(&mut self, deltas: &TokenCounts) {
        for (name, count) in &deltas.0 {
            self.add(name, *count);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_metadata(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(name, count)| (name.clone(), Value::from(*count)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A piece of message or artifact content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::Data { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            message_id: generate_id(),
            role,
            parts: vec![Part::text(text)],
            context_id: None,
            task_id: None,
            metadata: Map::new(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// An agent message bound to a task and its context
    pub fn agent_text(text: impl Into<String>, context_id: &str, task_id: &str) -> Self {
        let mut message = Self::new(Role::Agent, text);
        message.context_id = Some(context_id.to_string());
        message.task_id = Some(task_id.to_string());
        message
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// All text parts joined by newlines
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Caller identity carried in metadata, if any
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get(USER_ID_KEY).and_then(Value::as_str)
    }
}

/// Named output produced by a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Artifact {
    pub fn new(name: &str, parts: Vec<Part>, metadata: Map<String, Value>) -> Self {
        Self {
            artifact_id: generate_id(),
            name: name.to_string(),
            parts,
            metadata,
        }
    }
}

/// Unit of work tracked by the protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub state: TaskState,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub token_counts: TokenCounts,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A new `submitted` task seeded from the initiating message
    pub fn from_message(message: &Message) -> Self {
        let id = message.task_id.clone().unwrap_or_else(generate_id);
        let context_id = message.context_id.clone().unwrap_or_else(generate_id);
        let mut seed = message.clone();
        seed.task_id = Some(id.clone());
        seed.context_id = Some(context_id.clone());

        Self {
            id,
            context_id,
            state: TaskState::Submitted,
            artifacts: Vec::new(),
            history: vec![seed],
            token_counts: TokenCounts::new(),
            updated_at: Utc::now(),
        }
    }

    /// Fold an event describing this task into the snapshot
    pub fn apply(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Task(task) if task.id == self.id => *self = task.clone(),
            TaskEvent::StatusUpdate(update) if update.task_id == self.id => {
                self.state = update.state;
                if let Some(message) = &update.message {
                    self.history.push(message.clone());
                }
                if !update.token_counts.is_empty() {
                    self.token_counts = update.token_counts.clone();
                }
                self.updated_at = Utc::now();
            }
            TaskEvent::ArtifactUpdate(update) if update.task_id == self.id => {
                self.artifacts.push(update.artifact.clone());
                self.updated_at = Utc::now();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    pub task_id: String,
    pub context_id: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// No further events follow for this task
    #[serde(rename = "final")]
    pub is_final: bool,
    /// Running totals for the task as of this update
    #[serde(default, skip_serializing_if = "TokenCounts::is_empty")]
    pub token_counts: TokenCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArtifactUpdate {
    pub task_id: String,
    pub context_id: String,
    pub artifact: Artifact,
}

/// Events a task emits, in order, on its queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskEvent {
    Task(Task),
    StatusUpdate(TaskStatusUpdate),
    ArtifactUpdate(TaskArtifactUpdate),
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Task(task) => &task.id,
            TaskEvent::StatusUpdate(update) => &update.task_id,
            TaskEvent::ArtifactUpdate(update) => &update.task_id,
        }
    }

    /// State carried by the event, if it carries one
    pub fn state(&self) -> Option<TaskState> {
        match self {
            TaskEvent::Task(task) => Some(task.state),
            TaskEvent::StatusUpdate(update) => Some(update.state),
            TaskEvent::ArtifactUpdate(_) => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, TaskEvent::StatusUpdate(update) if update.is_final)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transitions() {
        use TaskState::*;
        assert!(Submitted.can_transition_to(Working));
        assert!(Submitted.can_transition_to(Completed));
        assert!(Working.can_transition_to(Working));
        assert!(Working.can_transition_to(InputRequired));
        assert!(Working.can_transition_to(Canceled));
        assert!(!Working.can_transition_to(Submitted));
        for terminal in [InputRequired, Completed, Canceled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Working));
            assert!(!terminal.can_transition_to(Completed));
        }
        assert!(!Submitted.is_terminal());
        assert_eq!(InputRequired.to_string(), "input-required");
    }

    #[test]
    fn test_token_counts_merge() {
        let mut total = TokenCounts::new().with("input_tokens", 3);
        total.merge(&TokenCounts::new().with("input_tokens", 2).with("output_tokens", 7));
        assert_eq!(total.get("input_tokens"), 5);
        assert_eq!(total.get("output_tokens"), 7);
        assert_eq!(total.get("missing"), 0);
        assert_eq!(
            Value::Object(total.to_metadata()),
            json!({"input_tokens": 5, "output_tokens": 7})
        );
    }

    #[test]
    fn test_message_text_and_user_id() {
        let mut message = Message::user_text("hello").with_metadata(USER_ID_KEY, json!("u-1"));
        message.parts.push(Part::Data { data: json!({"x": 1}) });
        message.parts.push(Part::text("world"));
        assert_eq!(message.text(), "hello\nworld");
        assert_eq!(message.user_id(), Some("u-1"));
        assert_eq!(Message::user_text("x").user_id(), None);
    }

    #[test]
    fn test_task_from_message_keeps_context() {
        let message = Message::user_text("hi").with_context("ctx-1");
        let task = Task::from_message(&message);
        assert_eq!(task.context_id, "ctx-1");
        assert_eq!(task.state, TaskState::Submitted);
        assert_eq!(task.history[0].task_id.as_deref(), Some(task.id.as_str()));
    }

    #[test]
    fn test_event_wire_format() {
        let event = TaskEvent::StatusUpdate(TaskStatusUpdate {
            task_id: "t".into(),
            context_id: "c".into(),
            state: TaskState::InputRequired,
            message: None,
            is_final: true,
            token_counts: TokenCounts::new(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "status-update");
        assert_eq!(value["state"], "input-required");
        assert_eq!(value["final"], true);
    }

    #[test]
    fn test_apply_events() {
        let mut task = Task::from_message(&Message::user_text("hi"));
        task.apply(&TaskEvent::StatusUpdate(TaskStatusUpdate {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            state: TaskState::Working,
            message: Some(Message::agent_text("thinking", &task.context_id, &task.id)),
            is_final: false,
            token_counts: TokenCounts::new().with("output_tokens", 3),
        }));
        assert_eq!(task.state, TaskState::Working);
        assert_eq!(task.history.len(), 2);
        assert_eq!(task.token_counts.get("output_tokens"), 3);

        // An update without counts keeps the last totals
        task.apply(&TaskEvent::StatusUpdate(TaskStatusUpdate {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            state: TaskState::Working,
            message: None,
            is_final: false,
            token_counts: TokenCounts::new(),
        }));
        assert_eq!(task.token_counts.get("output_tokens"), 3);

        // Events for other tasks are ignored
        task.apply(&TaskEvent::ArtifactUpdate(TaskArtifactUpdate {
            task_id: "other".into(),
            context_id: task.context_id.clone(),
            artifact: Artifact::new("response", vec![], Map::new()),
        }));
        assert!(task.artifacts.is_empty());
    }
}
