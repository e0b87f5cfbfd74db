//! Persisted record of the last applied session.
//!
//! Rollback and deferred-replacement finalization can run in a later process
//! (after the host has exited), so the task list outlives the orchestrator.

use super::{DownloadTask, UpdateSession};
use crate::utils::errors::{Result, UpdateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionJournal {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub tasks: Vec<DownloadTask>,
    #[serde(default)]
    pub deferred: Vec<PathBuf>,
    #[serde(default)]
    pub needs_restart: bool,
}

impl SessionJournal {
    pub fn from_session(session: &UpdateSession) -> Self {
        Self {
            session_id: session.id,
            started_at: session.started_at,
            tasks: session.tasks.clone(),
            deferred: session.deferred.clone(),
            needs_restart: session.needs_restart,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpdateError::Journal(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| UpdateError::Journal(format!("cannot parse {}: {e}", path.display())))
    }

    /// Write via a temp file and rename so a crash never leaves a torn journal.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| UpdateError::Journal(e.to_string()))?;

        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}
