//! UploadOrchestrator owns the upload queue and drives each task through
//! its state machine, one transfer at a time.
//!
//! Observers read [`UploadOrchestrator::snapshot`] or subscribe to
//! [`UploadNotice`]s; they never touch tasks directly.

use crate::{
    models::upload::{UploadEvent, UploadSource, UploadState, UploadTask},
    services::{
        gateway::{GatewayError, GatewayResult, ObjectStoreGateway},
        path::{LogicalPath, PathNavigator},
    },
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

const NOTICE_CAPACITY: usize = 256;

/// Change notifications for observers such as a UI or a CLI progress log.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum UploadNotice {
    Enqueued { id: String, key: String },
    Started { id: String },
    Progress { id: String, percent: f32 },
    Completed { id: String },
    Failed { id: String, error: String },
    Removed { id: String },
}

/// Outcome of one dispatch run.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    gateway: ObjectStoreGateway,
    navigator: PathNavigator,
    tasks: Arc<Mutex<Vec<UploadTask>>>,
    dispatching: Arc<tokio::sync::Mutex<()>>,
    notices: broadcast::Sender<UploadNotice>,
}

impl UploadOrchestrator {
    pub fn new(gateway: ObjectStoreGateway) -> Self {
        let navigator = PathNavigator::new(gateway.delimiter());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            gateway,
            navigator,
            tasks: Arc::new(Mutex::new(Vec::new())),
            dispatching: Arc::new(tokio::sync::Mutex::new(())),
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadNotice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: UploadNotice) {
        // no subscribers is fine
        let _ = self.notices.send(notice);
    }

    /// Queue `source` for upload to `key`. Returns the new task id.
    pub fn enqueue(&self, source: UploadSource, key: impl Into<String>) -> GatewayResult<String> {
        let key = key.into();
        if key.is_empty() {
            return Err(GatewayError::Validation("file key is required".into()));
        }
        if key.ends_with(self.navigator.delimiter()) {
            return Err(GatewayError::Validation(format!(
                "`{}` names a folder, not a file",
                key
            )));
        }

        let id = Uuid::new_v4().to_string();
        let task = UploadTask::new(id.clone(), source, key.clone());
        debug!(id = %id, key = %key, file = %task.file_name, "enqueued upload");
        self.tasks.lock().push(task);
        self.notify(UploadNotice::Enqueued {
            id: id.clone(),
            key,
        });
        Ok(id)
    }

    /// Queue `source` into the folder `path`, keyed by its file name.
    pub fn enqueue_into(&self, source: UploadSource, path: &LogicalPath) -> GatewayResult<String> {
        let key = self.navigator.object_key(path, &source.file_name());
        self.enqueue(source, key)
    }

    /// Drop a task in any state. An in-flight transfer is not cancelled;
    /// its outcome is simply discarded.
    pub fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut tasks = self.tasks.lock();
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            tasks.len() != before
        };
        if removed {
            self.notify(UploadNotice::Removed { id: id.to_string() });
        }
        removed
    }

    /// Drop every completed task; returns how many were dropped.
    pub fn clear_finished(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|t| t.state != UploadState::Completed);
        before - tasks.len()
    }

    pub fn snapshot(&self) -> Vec<UploadTask> {
        self.tasks.lock().clone()
    }

    pub fn task(&self, id: &str) -> Option<UploadTask> {
        self.tasks.lock().iter().find(|t| t.id == id).cloned()
    }

    /// Move one failed task back to pending. `false` if it is not failed.
    pub fn requeue(&self, id: &str) -> bool {
        self.advance(id, UploadEvent::Retry).is_some()
    }

    /// Move every failed task back to pending; returns how many moved.
    pub fn requeue_failed(&self) -> usize {
        let failed: Vec<String> = self
            .tasks
            .lock()
            .iter()
            .filter(|t| t.state == UploadState::Failed)
            .map(|t| t.id.clone())
            .collect();
        failed.iter().filter(|id| self.requeue(id)).count()
    }

    pub async fn retry(&self, id: &str) -> DispatchReport {
        self.requeue(id);
        self.dispatch().await
    }

    pub async fn retry_all(&self) -> DispatchReport {
        let requeued = self.requeue_failed();
        info!(requeued, "retrying failed uploads");
        self.dispatch().await
    }

    /// Upload every pending task, strictly one after another, until none is
    /// left. A failed task does not stop the run.
    ///
    /// If another dispatch is already running this returns an empty report
    /// at once; the running loop picks up anything newly pending.
    pub async fn dispatch(&self) -> DispatchReport {
        let Ok(_running) = self.dispatching.try_lock() else {
            debug!("dispatch already in progress");
            return DispatchReport::default();
        };

        let mut report = DispatchReport::default();
        while let Some(task) = self.start_next() {
            match self.transfer(&task).await {
                Ok(()) => {
                    report.completed += 1;
                    info!(id = %task.id, key = %task.target_key, "upload completed");
                    if self.advance(&task.id, UploadEvent::Succeeded).is_some() {
                        self.notify(UploadNotice::Completed { id: task.id.clone() });
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    let message = err.to_string();
                    warn!(id = %task.id, key = %task.target_key, error = %message, "upload failed");
                    if self
                        .advance(&task.id, UploadEvent::Failed(message.clone()))
                        .is_some()
                    {
                        self.notify(UploadNotice::Failed {
                            id: task.id.clone(),
                            error: message,
                        });
                    }
                }
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            "dispatch finished"
        );
        report
    }

    /// Mark the oldest pending task as uploading and hand back a copy.
    fn start_next(&self) -> Option<UploadTask> {
        let started = {
            let mut tasks = self.tasks.lock();
            let task = tasks
                .iter_mut()
                .find(|t| t.state == UploadState::Pending)?;
            if let Err(err) = task.apply(UploadEvent::Dispatch) {
                warn!(error = %err, "could not start upload");
                return None;
            }
            task.clone()
        };
        self.notify(UploadNotice::Started {
            id: started.id.clone(),
        });
        Some(started)
    }

    async fn transfer(&self, task: &UploadTask) -> GatewayResult<()> {
        let content = task.source.read().await.map_err(|err| {
            GatewayError::Validation(format!("cannot read `{}`: {}", task.file_name, err))
        })?;
        let content_type = task.source.content_type();

        let on_progress = |percent: f32| {
            if let Some(updated) = self.advance(&task.id, UploadEvent::Progress(percent)) {
                self.notify(UploadNotice::Progress {
                    id: task.id.clone(),
                    percent: updated.progress,
                });
            }
        };

        self.gateway
            .put(&task.target_key, content, &content_type, &on_progress)
            .await
    }

    /// Apply `event` to the task with `id`. `None` when the task is gone or
    /// the transition is not allowed.
    fn advance(&self, id: &str, event: UploadEvent) -> Option<UploadTask> {
        let mut tasks = self.tasks.lock();
        let task = tasks.iter_mut().find(|t| t.id == id)?;
        match task.apply(event) {
            Ok(()) => Some(task.clone()),
            Err(err) => {
                debug!(error = %err, "ignored upload event");
                None
            }
        }
    }
}
