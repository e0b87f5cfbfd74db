//! Per-session data: download tasks, the session itself and its lifecycle states.

pub mod journal;
pub mod report;

use crate::fs::digest::HashAlgorithm;
use crate::manifest::RemoteFileEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub use journal::SessionJournal;
pub use report::SessionReport;

/// Terminal status of a download task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Downloaded,
    Failed,
}

/// One file that must be fetched and written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub name: String,
    pub source_url: String,
    pub destination_path: PathBuf,
    pub relative_path: String,
    /// Expected digest of the downloaded bytes
    pub content_hash: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    /// Destination is the running executable or the updater binary
    pub is_self: bool,
    #[serde(default)]
    status: TaskStatus,
}

impl DownloadTask {
    pub fn new(entry: &RemoteFileEntry, destination_path: PathBuf, is_self: bool) -> Self {
        Self {
            name: entry.name.clone(),
            source_url: entry.download_url.clone(),
            destination_path,
            relative_path: entry.relative_path.clone(),
            content_hash: entry.content_hash.clone(),
            timestamp: entry.timestamp,
            size_bytes: entry.size_bytes,
            is_self,
            status: TaskStatus::Pending,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Record the terminal status. A task leaves `Pending` at most once.
    pub(crate) fn finish(&mut self, status: TaskStatus) {
        if self.status == TaskStatus::Pending {
            self.status = status;
        }
    }
}

/// Orchestrator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    ManifestFetched,
    DiffComputed,
    AwaitingConfirmation,
    Downloading,
    Completed,
    Cancelled,
    Failed,
    RolledBack,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::ManifestFetched => "manifest fetched",
            SessionState::DiffComputed => "diff computed",
            SessionState::AwaitingConfirmation => "awaiting confirmation",
            SessionState::Downloading => "downloading",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
            SessionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// The ordered tasks of one update run. Owned by the orchestrator for one cycle.
#[derive(Debug, Clone)]
pub struct UpdateSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub algorithm: HashAlgorithm,
    pub tasks: Vec<DownloadTask>,
    pub needs_restart: bool,
    /// Destinations whose new content waits under the deferred-rename marker
    pub deferred: Vec<PathBuf>,
}

impl UpdateSession {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            algorithm,
            tasks: Vec::new(),
            needs_restart: false,
            deferred: Vec::new(),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.tasks.iter().map(|t| t.size_bytes).sum()
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status() == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> DownloadTask {
        let entry = RemoteFileEntry {
            name: "app.dll".to_string(),
            relative_path: "app.dll".to_string(),
            download_url: "https://example.com/app.dll".to_string(),
            content_hash: "00".repeat(32),
            size_bytes: 10,
            timestamp: None,
        };
        DownloadTask::new(&entry, PathBuf::from("/opt/demo/app.dll"), false)
    }

    #[test]
    fn test_task_status_is_terminal_once_set() {
        let mut task = task();
        assert_eq!(task.status(), TaskStatus::Pending);

        task.finish(TaskStatus::Failed);
        task.finish(TaskStatus::Downloaded);
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_session_counts() {
        let mut session = UpdateSession::new(HashAlgorithm::Sha256);
        session.tasks = vec![task(), task()];
        session.tasks[0].finish(TaskStatus::Downloaded);

        assert_eq!(session.total_bytes(), 20);
        assert_eq!(session.count(TaskStatus::Downloaded), 1);
        assert_eq!(session.count(TaskStatus::Pending), 1);
    }
}
