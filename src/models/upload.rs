//! Upload tasks and the state machine that drives them.
//!
//! ```text
//! Pending --dispatch--> Uploading --succeeded--> Completed
//!    ^                      |
//!    |                      +--------failed----> Failed
//!    +-----------------retry--------------------+
//! ```

use bytes::Bytes;
use serde::Serialize;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Lifecycle state of one upload task.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

/// Discrete events that advance an [`UploadTask`].
#[derive(Clone, Debug, PartialEq)]
pub enum UploadEvent {
    Dispatch,
    Progress(f32),
    Succeeded,
    Failed(String),
    Retry,
}

impl UploadEvent {
    fn label(&self) -> &'static str {
        match self {
            UploadEvent::Dispatch => "dispatch",
            UploadEvent::Progress(_) => "progress",
            UploadEvent::Succeeded => "succeeded",
            UploadEvent::Failed(_) => "failed",
            UploadEvent::Retry => "retry",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot apply `{event}` to task `{task_id}` in state {state:?}")]
pub struct TransitionError {
    pub task_id: String,
    pub state: UploadState,
    pub event: &'static str,
}

/// Where the bytes of an upload come from.
#[derive(Clone, Debug)]
pub enum UploadSource {
    /// A file on the local filesystem, read when the task is dispatched.
    File(PathBuf),
    /// Content already held in memory, e.g. from a multipart form.
    Memory { name: String, data: Bytes },
}

impl UploadSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        UploadSource::File(path.into())
    }

    pub fn memory(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        UploadSource::Memory {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Final path component, used to derive target keys and content types.
    pub fn file_name(&self) -> String {
        match self {
            UploadSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            UploadSource::Memory { name, .. } => name.clone(),
        }
    }

    pub fn content_type(&self) -> String {
        mime_guess::from_path(Path::new(&self.file_name()))
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub async fn read(&self) -> io::Result<Bytes> {
        match self {
            UploadSource::File(path) => tokio::fs::read(path).await.map(Bytes::from),
            UploadSource::Memory { data, .. } => Ok(data.clone()),
        }
    }
}

/// A single queued upload, owned by the orchestrator.
///
/// Callers only ever see clones of this value.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub id: String,

    #[serde(skip)]
    pub source: UploadSource,

    pub file_name: String,

    pub target_key: String,

    /// Percent transferred, always within `[0, 100]`.
    pub progress: f32,

    pub state: UploadState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadTask {
    pub fn new(id: impl Into<String>, source: UploadSource, target_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: source.file_name(),
            source,
            target_key: target_key.into(),
            progress: 0.0,
            state: UploadState::Pending,
            error: None,
        }
    }

    /// Advance the task by one event, rejecting transitions the lifecycle
    /// does not allow. A rejected event leaves the task untouched.
    pub fn apply(&mut self, event: UploadEvent) -> Result<(), TransitionError> {
        match (self.state, &event) {
            (UploadState::Pending, UploadEvent::Dispatch) => {
                self.state = UploadState::Uploading;
            }
            (UploadState::Uploading, UploadEvent::Progress(percent)) => {
                let percent = if percent.is_nan() {
                    self.progress
                } else {
                    percent.clamp(0.0, 100.0)
                };
                // progress never moves backwards
                self.progress = self.progress.max(percent);
            }
            (UploadState::Uploading, UploadEvent::Succeeded) => {
                self.state = UploadState::Completed;
                self.progress = 100.0;
                self.error = None;
            }
            (UploadState::Uploading, UploadEvent::Failed(message)) => {
                self.state = UploadState::Failed;
                self.error = Some(message.clone());
            }
            (UploadState::Failed, UploadEvent::Retry) => {
                self.state = UploadState::Pending;
                self.progress = 0.0;
                self.error = None;
            }
            (state, event) => {
                return Err(TransitionError {
                    task_id: self.id.clone(),
                    state,
                    event: event.label(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> UploadTask {
        UploadTask::new("t1", UploadSource::memory("a.txt", "hello"), "docs/a.txt")
    }

    #[test]
    fn happy_path_forces_full_progress() {
        let mut t = task();
        t.apply(UploadEvent::Dispatch).unwrap();
        t.apply(UploadEvent::Progress(40.0)).unwrap();
        t.apply(UploadEvent::Succeeded).unwrap();
        assert_eq!(t.state, UploadState::Completed);
        assert_eq!(t.progress, 100.0);
        assert!(t.error.is_none());
    }

    #[test]
    fn failure_freezes_progress_and_records_error() {
        let mut t = task();
        t.apply(UploadEvent::Dispatch).unwrap();
        t.apply(UploadEvent::Progress(55.0)).unwrap();
        t.apply(UploadEvent::Failed("connection reset".into())).unwrap();
        assert_eq!(t.state, UploadState::Failed);
        assert_eq!(t.progress, 55.0);
        assert_eq!(t.error.as_deref(), Some("connection reset"));

        assert!(t.apply(UploadEvent::Progress(80.0)).is_err());
        assert_eq!(t.progress, 55.0);
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let mut t = task();
        t.apply(UploadEvent::Dispatch).unwrap();
        t.apply(UploadEvent::Progress(60.0)).unwrap();
        t.apply(UploadEvent::Progress(30.0)).unwrap();
        assert_eq!(t.progress, 60.0);
        t.apply(UploadEvent::Progress(250.0)).unwrap();
        assert_eq!(t.progress, 100.0);
    }

    #[test]
    fn retry_only_from_failed() {
        let mut t = task();
        let err = t.apply(UploadEvent::Retry).unwrap_err();
        assert_eq!(err.state, UploadState::Pending);
        assert_eq!(err.event, "retry");

        t.apply(UploadEvent::Dispatch).unwrap();
        t.apply(UploadEvent::Failed("boom".into())).unwrap();
        t.apply(UploadEvent::Retry).unwrap();
        assert_eq!(t.state, UploadState::Pending);
        assert_eq!(t.progress, 0.0);
        assert!(t.error.is_none());
    }

    #[test]
    fn completed_is_terminal() {
        let mut t = task();
        t.apply(UploadEvent::Dispatch).unwrap();
        t.apply(UploadEvent::Succeeded).unwrap();
        assert!(t.apply(UploadEvent::Dispatch).is_err());
        assert!(t.apply(UploadEvent::Retry).is_err());
        assert!(t.state.is_terminal());
    }

    #[test]
    fn content_type_is_guessed_from_name() {
        assert_eq!(UploadSource::memory("report.pdf", "x").content_type(), "application/pdf");
        assert_eq!(
            UploadSource::memory("blob.unknownext", "x").content_type(),
            "application/octet-stream"
        );
        assert_eq!(UploadSource::file("/tmp/dir/notes.txt").file_name(), "notes.txt");
    }
}
