//! What a finished session hands back to its caller.

use super::{DownloadTask, SessionState, TaskStatus};
use crate::transfer::progress::format_bytes;
use crate::utils::errors::{ApplyError, RollbackError, UpdateError};
use std::fmt::Write as _;
use uuid::Uuid;

#[derive(Debug)]
pub struct SessionReport {
    pub session_id: Uuid,
    /// Every state entered, starting with `Idle`
    pub transitions: Vec<SessionState>,
    pub final_state: SessionState,
    pub tasks: Vec<DownloadTask>,
    pub needs_restart: bool,
    /// Whether the restart collaborator was invoked
    pub restarted: bool,
    pub apply_errors: Vec<ApplyError>,
    pub rollback_errors: Vec<RollbackError>,
    /// The fatal error that ended the session, if any
    pub failure: Option<UpdateError>,
}

impl SessionReport {
    pub(crate) fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            transitions: vec![SessionState::Idle],
            final_state: SessionState::Idle,
            tasks: Vec::new(),
            needs_restart: false,
            restarted: false,
            apply_errors: Vec::new(),
            rollback_errors: Vec::new(),
            failure: None,
        }
    }

    pub(crate) fn enter(&mut self, state: SessionState) {
        self.transitions.push(state);
        self.final_state = state;
    }

    pub fn was_cancelled(&self) -> bool {
        self.transitions.contains(&SessionState::Cancelled)
    }

    /// Completed without planning a single download.
    pub fn is_up_to_date(&self) -> bool {
        self.final_state == SessionState::Completed && self.tasks.is_empty()
    }

    pub fn downloaded(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Downloaded)
            .count()
    }

    /// Human-readable account of the session, one fact per line.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Session {}: {}", self.session_id, self.final_state);

        if self.is_up_to_date() {
            let _ = writeln!(out, "Already up to date");
        } else if !self.tasks.is_empty() {
            let total: u64 = self.tasks.iter().map(|t| t.size_bytes).sum();
            let _ = writeln!(
                out,
                "Files: {} planned ({}), {} downloaded",
                self.tasks.len(),
                format_bytes(total),
                self.downloaded()
            );
        }

        if self.was_cancelled() {
            let _ = writeln!(out, "Cancelled before completion");
        }
        if let Some(failure) = &self.failure {
            let _ = writeln!(out, "Failure: {failure}");
        }
        for error in &self.apply_errors {
            let _ = writeln!(out, "  apply failed: {error}");
        }
        for error in &self.rollback_errors {
            let _ = writeln!(out, "  rollback failed: {error}");
        }
        if self.needs_restart {
            let restart = if self.restarted { "restart requested" } else { "restart pending" };
            let _ = writeln!(out, "Restart: {restart}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::ApplyCause;

    #[test]
    fn test_up_to_date_report() {
        let mut report = SessionReport::new(Uuid::new_v4());
        report.enter(SessionState::ManifestFetched);
        report.enter(SessionState::DiffComputed);
        report.enter(SessionState::Completed);

        assert!(report.is_up_to_date());
        assert!(!report.was_cancelled());
        assert!(report.summary().contains("Already up to date"));
    }

    #[test]
    fn test_summary_lists_failures() {
        let mut report = SessionReport::new(Uuid::new_v4());
        report.enter(SessionState::Cancelled);
        report.enter(SessionState::RolledBack);
        report
            .apply_errors
            .push(ApplyError::new("bin/app.dll", ApplyCause::Cancelled));

        let summary = report.summary();
        assert!(report.was_cancelled());
        assert_eq!(report.final_state, SessionState::RolledBack);
        assert!(summary.contains("rolled back"));
        assert!(summary.contains("bin/app.dll"));
    }
}
