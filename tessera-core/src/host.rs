//! Engine host: runs an [`Engine`] on its own task and serializes access
//! to it.
//!
//! Callers talk to the host through an [`EngineHost`] handle. Each action
//! is a command sent over a channel; the engine task processes commands one
//! at a time, so a microcycle always runs to completion before the next
//! action starts. After each action the host publishes a fresh
//! [`StateSnapshot`], which readers can fetch without going through the
//! engine task at all.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::action::{ActionReport, ActionRequest};
use crate::engine::Engine;
use crate::error::HostError;
use crate::snapshot::StateSnapshot;

const COMMAND_BUFFER: usize = 64;

enum HostCommand {
    Perform {
        request: ActionRequest,
        respond_to: oneshot::Sender<Result<ActionReport, HostError>>,
    },
    Shutdown {
        respond_to: oneshot::Sender<Engine>,
    },
}

/// Handle to an engine running on a tokio task.
#[derive(Clone)]
pub struct EngineHost {
    sender: mpsc::Sender<HostCommand>,
    latest: Arc<RwLock<Arc<StateSnapshot>>>,
    updates: watch::Receiver<u64>,
}

impl EngineHost {
    /// Move `engine` onto a new task. Must be called from within a tokio
    /// runtime.
    pub fn spawn(mut engine: Engine) -> (Self, JoinHandle<()>) {
        let initial = Arc::new(engine.read_all_state_variables());
        let latest = Arc::new(RwLock::new(initial));
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (notify, updates) = watch::channel(engine.cycle());

        let task = tokio::spawn(run(engine, receiver, Arc::clone(&latest), notify));
        let host = Self {
            sender,
            latest,
            updates,
        };
        (host, task)
    }

    /// Perform one action and wait for its microcycle to finish.
    pub async fn perform_action(&self, request: ActionRequest) -> Result<ActionReport, HostError> {
        let (respond_to, receiver) = oneshot::channel();
        self.sender
            .send(HostCommand::Perform {
                request,
                respond_to,
            })
            .await
            .map_err(|_| HostError::Closed)?;
        receiver.await.map_err(|_| HostError::Closed)?
    }

    /// Perform an action given as a JSON request.
    pub async fn perform_json(&self, json: &str) -> Result<ActionReport, HostError> {
        let request: ActionRequest = serde_json::from_str(json)?;
        self.perform_action(request).await
    }

    /// The state after the most recent microcycle.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        Arc::clone(&self.latest.read())
    }

    /// Receives the cycle number each time a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.clone()
    }

    /// Stop the engine task and take the engine back.
    pub async fn shutdown(self) -> Result<Engine, HostError> {
        let (respond_to, receiver) = oneshot::channel();
        self.sender
            .send(HostCommand::Shutdown { respond_to })
            .await
            .map_err(|_| HostError::Closed)?;
        receiver.await.map_err(|_| HostError::Closed)
    }
}

async fn run(
    mut engine: Engine,
    mut receiver: mpsc::Receiver<HostCommand>,
    latest: Arc<RwLock<Arc<StateSnapshot>>>,
    notify: watch::Sender<u64>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            HostCommand::Perform {
                request,
                respond_to,
            } => {
                let result = engine.perform(&request).map_err(HostError::from);
                if result.is_ok() {
                    let snapshot = Arc::new(engine.read_all_state_variables());
                    *latest.write() = snapshot;
                    // No subscribers is fine
                    let _ = notify.send(engine.cycle());
                }
                if respond_to.send(result).is_err() {
                    tracing::debug!(
                        component = %request.component,
                        action = %request.action,
                        "action caller went away before the reply"
                    );
                }
            }
            HostCommand::Shutdown { respond_to } => {
                tracing::debug!(cycle = engine.cycle(), "engine host shutting down");
                let _ = respond_to.send(engine);
                return;
            }
        }
    }
    tracing::debug!("all engine host handles dropped");
}
