//! Per-task event queues
//!
//! The executor writes events; the transport reads them in the same order.
//! An unbounded queue never throttles the producer; a bounded queue makes
//! `enqueue` wait while it is full.

use crate::types::TaskEvent;
use agency_common::{AgencyError, QueueMode, Result};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tracing::trace;

#[derive(Debug, Clone)]
enum Sender {
    Unbounded(mpsc::UnboundedSender<TaskEvent>),
    Bounded(mpsc::Sender<TaskEvent>),
}

#[derive(Debug)]
enum Receiver {
    Unbounded(mpsc::UnboundedReceiver<TaskEvent>),
    Bounded(mpsc::Receiver<TaskEvent>),
}

/// Producer half of a task's event queue
#[derive(Debug, Clone)]
pub struct EventQueue {
    sender: Sender,
}

/// Consumer half of a task's event queue
#[derive(Debug)]
pub struct EventReceiver {
    receiver: Receiver,
}

impl EventQueue {
    pub fn new(mode: QueueMode) -> (EventQueue, EventReceiver) {
        match mode {
            QueueMode::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    EventQueue {
                        sender: Sender::Unbounded(tx),
                    },
                    EventReceiver {
                        receiver: Receiver::Unbounded(rx),
                    },
                )
            }
            QueueMode::Bounded { capacity } => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (
                    EventQueue {
                        sender: Sender::Bounded(tx),
                    },
                    EventReceiver {
                        receiver: Receiver::Bounded(rx),
                    },
                )
            }
        }
    }

    pub fn unbounded() -> (EventQueue, EventReceiver) {
        Self::new(QueueMode::Unbounded)
    }

    /// Append an event. Fails with `QueueClosed` once the receiver is gone.
    pub async fn enqueue(&self, event: TaskEvent) -> Result<()> {
        trace!("Enqueueing event for task {}", event.task_id());
        match &self.sender {
            Sender::Unbounded(tx) => tx.send(event).map_err(|_| AgencyError::QueueClosed),
            Sender::Bounded(tx) => tx.send(event).await.map_err(|_| AgencyError::QueueClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.sender {
            Sender::Unbounded(tx) => tx.is_closed(),
            Sender::Bounded(tx) => tx.is_closed(),
        }
    }
}

impl EventReceiver {
    /// Next event, or `None` once every producer has been dropped and the queue is drained
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        match &mut self.receiver {
            Receiver::Unbounded(rx) => rx.recv().await,
            Receiver::Bounded(rx) => rx.recv().await,
        }
    }

    /// Events that are already waiting, without blocking
    pub fn drain(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        loop {
            let next = match &mut self.receiver {
                Receiver::Unbounded(rx) => rx.try_recv().ok(),
                Receiver::Bounded(rx) => rx.try_recv().ok(),
            };
            match next {
                Some(event) => events.push(event),
                None => return events,
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, TaskEvent> {
        match self.receiver {
            Receiver::Unbounded(rx) => UnboundedReceiverStream::new(rx).boxed(),
            Receiver::Bounded(rx) => ReceiverStream::new(rx).boxed(),
        }
    }
}
