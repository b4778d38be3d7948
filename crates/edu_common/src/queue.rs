//! Task queue interface and in-process implementations.
//!
//! Enqueue is the only operation the engines need. Durable delivery lives in
//! `store::outbox`.

use edu_shared::{EduError, EduResult, Task};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, name: &str, payload: Value) -> EduResult<()>;
}

impl<Q: TaskQueue + ?Sized> TaskQueue for Arc<Q> {
    fn enqueue(&self, name: &str, payload: Value) -> EduResult<()> {
        (**self).enqueue(name, payload)
    }
}

/// Records tasks in memory
#[derive(Debug, Default)]
pub struct MemoryQueue {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks enqueued so far, oldest first
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default()
    }
}

impl TaskQueue for MemoryQueue {
    fn enqueue(&self, name: &str, payload: Value) -> EduResult<()> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| EduError::Queue("memory queue lock poisoned".to_string()))?;
        tasks.push(Task::new(name, payload));
        Ok(())
    }
}

/// Forwards tasks to an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<Task>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TaskQueue for ChannelQueue {
    fn enqueue(&self, name: &str, payload: Value) -> EduResult<()> {
        self.tx
            .send(Task::new(name, payload))
            .map_err(|_| EduError::Queue("task consumer has shut down".to_string()))
    }
}
