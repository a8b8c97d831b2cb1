//! ActionDispatcher — executes closed actions against the sandbox.
//!
//! Every artifact gets its own FIFO queue drained by one worker task, so the
//! actions of an artifact run strictly one after another in close order while
//! unrelated artifacts proceed independently. A failed shell action halts the
//! rest of its artifact's queue; queued actions behind it are reported as
//! `Aborted`.
//!
//! Queues live from an artifact's open tag to its close tag. A closed queue
//! drains its backlog and its worker exits. When the same id is opened again
//! the new queue starts unhalted but waits for the previous worker first.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::sandbox::Sandbox;
use crate::models::ActionType;
use crate::parser::events::{ActionEvent, ArtifactEvent, ParserObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Known to the store, not yet executed.
    Pending,
    Running,
    Complete,
    Failed,
    /// Skipped because an earlier shell action of the same artifact failed.
    Aborted,
}

impl ActionStatus {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            ActionStatus::Complete | ActionStatus::Failed | ActionStatus::Aborted
        )
    }
}

/// Status report for one dispatched action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub message_id: String,
    pub artifact_id: String,
    pub action_id: usize,
    pub action_type: ActionType,
    pub status: ActionStatus,
    /// Command output for shell actions.
    pub output: Option<String>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl ActionOutcome {
    fn new(event: &ActionEvent, status: ActionStatus) -> Self {
        Self {
            message_id: event.message_id.clone(),
            artifact_id: event.artifact_id.clone(),
            action_id: event.action_id,
            action_type: event.action.action_type,
            status,
            output: None,
            error: None,
            at: Utc::now(),
        }
    }

    fn with_output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Receives every status change the dispatcher produces (`Running` and the
/// final status). Called from worker tasks; must not block.
pub trait OutcomeListener: Send + Sync {
    fn on_outcome(&self, outcome: &ActionOutcome);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueueKey {
    message_id: String,
    artifact_id: String,
}

impl QueueKey {
    fn new(message_id: &str, artifact_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            artifact_id: artifact_id.to_string(),
        }
    }
}

struct Job {
    event: ActionEvent,
    reply: oneshot::Sender<ActionOutcome>,
}

struct Queue {
    sender: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Queues {
    /// Accepting actions.
    open: HashMap<QueueKey, Queue>,
    /// Closed; the worker may still be working through its backlog.
    draining: HashMap<QueueKey, JoinHandle<()>>,
}

pub struct ActionDispatcher {
    sandbox: Arc<dyn Sandbox>,
    listeners: Vec<Arc<dyn OutcomeListener>>,
    queues: Mutex<Queues>,
    runtime: Handle,
}

impl ActionDispatcher {
    /// Must be called from within a Tokio runtime; worker tasks are spawned on it.
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox,
            listeners: Vec::new(),
            queues: Mutex::new(Queues::default()),
            runtime: Handle::current(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn OutcomeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Queues a closed action behind the earlier actions of its artifact.
    ///
    /// The returned receiver resolves with the final outcome; dropping it
    /// does not cancel execution.
    pub fn dispatch(&self, event: ActionEvent) -> oneshot::Receiver<ActionOutcome> {
        let (reply, receiver) = oneshot::channel();
        let key = QueueKey::new(&event.message_id, &event.artifact_id);
        debug!(
            "Queueing action {} ({}) for artifact '{}'",
            event.action_id, event.action.action_type, event.artifact_id
        );

        let mut queues = self.queues.lock();
        let job = Job { event, reply };
        let job = match queues.open.get(&key) {
            Some(queue) => match queue.sender.send(job) {
                Ok(()) => return receiver,
                Err(mpsc::error::SendError(job)) => {
                    warn!(
                        "Queue worker for artifact '{}' is gone, starting a new one",
                        key.artifact_id
                    );
                    job
                }
            },
            None => job,
        };

        let predecessor = queues.draining.remove(&key);
        let queue = self.spawn_queue(&key, predecessor);
        // The receiver was just created, so this cannot fail.
        let _ = queue.sender.send(job);
        queues.open.insert(key, queue);

        receiver
    }

    /// Forgets all queues. Workers finish what is already queued, then exit.
    pub fn clear(&self) {
        let mut queues = self.queues.lock();
        debug!(
            "Releasing {} open and {} draining dispatch queues",
            queues.open.len(),
            queues.draining.len()
        );
        queues.open.clear();
        queues.draining.clear();
    }

    /// Number of queues still accepting actions.
    pub fn queue_count(&self) -> usize {
        self.queues.lock().open.len()
    }

    /// Stops accepting actions for `key`. The worker exits once its backlog
    /// is done; a later queue for the same key runs after it.
    fn retire(&self, key: QueueKey) {
        let mut queues = self.queues.lock();
        queues.draining.retain(|_, worker| !worker.is_finished());
        if let Some(Queue { sender, worker }) = queues.open.remove(&key) {
            drop(sender);
            debug!("Dispatch queue for artifact '{}' closed", key.artifact_id);
            queues.draining.insert(key, worker);
        }
    }

    fn spawn_queue(&self, key: &QueueKey, predecessor: Option<JoinHandle<()>>) -> Queue {
        let (sender, jobs) = mpsc::unbounded_channel();
        let worker = QueueWorker {
            key: key.clone(),
            sandbox: Arc::clone(&self.sandbox),
            listeners: self.listeners.clone(),
            halted: false,
        };
        Queue {
            sender,
            worker: self.runtime.spawn(worker.run(jobs, predecessor)),
        }
    }
}

impl ParserObserver for ActionDispatcher {
    fn on_artifact_open(&self, event: &ArtifactEvent) {
        // Each opening starts unhalted, even when the id was used before.
        self.retire(QueueKey::new(&event.message_id, &event.artifact.id));
    }

    fn on_artifact_close(&self, event: &ArtifactEvent) {
        self.retire(QueueKey::new(&event.message_id, &event.artifact.id));
    }

    fn on_action_close(&self, event: &ActionEvent) {
        // Results reach the UI through the listeners.
        drop(self.dispatch(event.clone()));
    }
}

struct QueueWorker {
    key: QueueKey,
    sandbox: Arc<dyn Sandbox>,
    listeners: Vec<Arc<dyn OutcomeListener>>,
    halted: bool,
}

impl QueueWorker {
    async fn run(
        mut self,
        mut jobs: mpsc::UnboundedReceiver<Job>,
        predecessor: Option<JoinHandle<()>>,
    ) {
        if let Some(previous) = predecessor {
            let _ = previous.await;
        }
        debug!(
            "Dispatch queue started for artifact '{}' (message {})",
            self.key.artifact_id, self.key.message_id
        );

        while let Some(Job { event, reply }) = jobs.recv().await {
            let outcome = if self.halted {
                ActionOutcome::new(&event, ActionStatus::Aborted)
                    .with_error("an earlier shell action in this artifact failed")
            } else {
                self.publish(&ActionOutcome::new(&event, ActionStatus::Running));
                self.execute(&event).await
            };

            if outcome.status == ActionStatus::Failed
                && event.action.action_type == ActionType::Shell
            {
                warn!(
                    "Shell action {} failed; halting artifact '{}'",
                    event.action_id, self.key.artifact_id
                );
                self.halted = true;
            }

            self.publish(&outcome);
            let _ = reply.send(outcome);
        }

        debug!("Dispatch queue for artifact '{}' drained", self.key.artifact_id);
    }

    async fn execute(&self, event: &ActionEvent) -> ActionOutcome {
        let action = &event.action;
        match action.action_type {
            ActionType::File => {
                let path = action.file_path.as_deref().unwrap_or_default();
                match self.sandbox.write_file(path, &action.content).await {
                    Ok(()) => {
                        info!("Wrote {path} for artifact '{}'", event.artifact_id);
                        ActionOutcome::new(event, ActionStatus::Complete)
                    }
                    Err(e) => {
                        warn!("Writing {path} failed: {e}");
                        ActionOutcome::new(event, ActionStatus::Failed).with_error(e.to_string())
                    }
                }
            }
            ActionType::Shell => match self.sandbox.run_command(&action.content).await {
                Ok(result) if result.success() => {
                    info!(
                        "Shell action {} for artifact '{}' completed",
                        event.action_id, event.artifact_id
                    );
                    ActionOutcome::new(event, ActionStatus::Complete).with_output(result.output)
                }
                Ok(result) => ActionOutcome::new(event, ActionStatus::Failed)
                    .with_error(format!("exited with status {}", result.exit_code))
                    .with_output(result.output),
                Err(e) => ActionOutcome::new(event, ActionStatus::Failed).with_error(e.to_string()),
            },
        }
    }

    fn publish(&self, outcome: &ActionOutcome) {
        for listener in &self.listeners {
            listener.on_outcome(outcome);
        }
    }
}
