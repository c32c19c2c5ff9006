//! In-memory task snapshots, kept current by folding in emitted events

use crate::types::{Message, Task, TaskEvent};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    running: Arc<Mutex<HashSet<String>>>,
}

/// Marks a task as executing until dropped
#[derive(Debug)]
pub struct TaskClaim {
    task_id: String,
    running: Arc<Mutex<HashSet<String>>>,
}

impl TaskClaim {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Drop for TaskClaim {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

/// What happened when a message asked to continue a stored task
#[derive(Debug)]
pub enum Resumption {
    /// The task was idle; it now carries the message and stays claimed until the claim drops
    Resumed(Task, TaskClaim),
    /// The task is terminal and takes no further messages
    Finished(Task),
    /// Another request is still executing the task
    Busy,
    Missing,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn save(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    /// Update the stored snapshot of the task an event belongs to
    pub async fn apply(&self, event: &TaskEvent) {
        let mut tasks = self.tasks.write().await;
        match event {
            TaskEvent::Task(task) => {
                tasks.insert(task.id.clone(), task.clone());
            }
            other => match tasks.get_mut(other.task_id()) {
                Some(task) => task.apply(other),
                None => debug!("Event for unknown task {} ignored", other.task_id()),
            },
        }
    }

    /// Claim a task id for one execution; `None` while another claim is alive
    pub fn claim(&self, task_id: &str) -> Option<TaskClaim> {
        let inserted = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_string());
        inserted.then(|| TaskClaim {
            task_id: task_id.to_string(),
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(task_id)
    }

    /// Append a message to an idle, non-terminal task and claim it in one step
    pub async fn resume(&self, task_id: &str, message: &Message) -> Resumption {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(task_id) else {
            return Resumption::Missing;
        };
        if task.state.is_terminal() {
            return Resumption::Finished(task.clone());
        }
        let Some(claim) = self.claim(task_id) else {
            return Resumption::Busy;
        };
        task.history.push(message.clone());
        Resumption::Resumed(task.clone(), claim)
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }
}
