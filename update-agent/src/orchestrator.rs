//! Update orchestrator - drives one session through its lifecycle.
//!
//! ```text
//! Idle -> ManifestFetched -> DiffComputed -> AwaitingConfirmation -> Downloading -> Completed
//!                                  |                  |                   |
//!                                  +-> Completed      +-> Cancelled       +-> Cancelled / Failed
//!                                      (empty diff)        -> RolledBack        -> RolledBack
//! ```
//!
//! Only one session runs at a time; a concurrent `run` is rejected with
//! `UpdateError::SessionActive`.

use crate::apply::{replace, Applier};
use crate::collaborators::{Confirmation, Decision, ProgressSink, Restarter};
use crate::config::Config;
use crate::diff::DiffEngine;
use crate::fs::digest::HashAlgorithm;
use crate::manifest::{ManifestFetcher, ManifestIndex};
use crate::rollback::{RollbackManager, RollbackReport};
use crate::session::{
    DownloadTask, SessionJournal, SessionReport, SessionState, TaskStatus, UpdateSession,
};
use crate::transfer::client::build_http_client;
use crate::transfer::progress::format_bytes;
use crate::utils::errors::{Result, UpdateError};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The external collaborators a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub confirmation: Arc<dyn Confirmation>,
    pub progress: Arc<dyn ProgressSink>,
    pub restarter: Arc<dyn Restarter>,
}

pub struct UpdateOrchestrator {
    config: Config,
    fetcher: ManifestFetcher,
    diff: DiffEngine,
    applier: Applier,
    rollback: RollbackManager,
    collaborators: Collaborators,
    state: RwLock<SessionState>,
    cancel: RwLock<CancellationToken>,
    active: Mutex<()>,
}

impl UpdateOrchestrator {
    /// Build an orchestrator from configuration read once up front.
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let client = build_http_client(&config.download)?;
        let identity = config.updater.self_identity()?;
        let install_root = config.updater.install_root.clone();

        let applier = Applier::new(
            client.clone(),
            config.download.staging_root(&install_root),
            config.download.max_concurrent,
            config.restart.clone(),
            identity.clone(),
        );

        Ok(Self {
            fetcher: ManifestFetcher::new(client),
            diff: DiffEngine::new(install_root, identity),
            applier,
            rollback: RollbackManager::new(config.updater.system_bin_root()),
            collaborators,
            state: RwLock::new(SessionState::Idle),
            cancel: RwLock::new(CancellationToken::new()),
            active: Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// State of the current or most recent session.
    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Token of the current or next session; cancelling it abandons pending downloads.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn cancel(&self) {
        self.cancel_token().cancel();
    }

    pub fn journal_path(&self) -> PathBuf {
        self.config.updater.journal_path()
    }

    /// Fetch the manifest and compute the download plan without changing anything.
    pub async fn plan(&self) -> Result<(ManifestIndex, Vec<DownloadTask>)> {
        let index = self.fetcher.fetch(&self.config.updater.manifest_url).await?;
        let diff = self.diff.clone();
        let (index, tasks) = tokio::task::spawn_blocking(move || {
            let tasks = diff.compute(&index);
            (index, tasks)
        })
        .await
        .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?;
        Ok((index, tasks))
    }

    /// Run one complete update session.
    ///
    /// Returns `Err` only when another session is already active; every other
    /// outcome, including fatal failures, is described by the report.
    pub async fn run(&self) -> Result<SessionReport> {
        let _guard = self
            .active
            .try_lock()
            .map_err(|_| UpdateError::SessionActive)?;

        // A token spent by an earlier session is replaced; a live one is kept so
        // callers can hold it before the session starts
        let cancel = {
            let mut current = self.cancel.write().unwrap_or_else(|e| e.into_inner());
            if current.is_cancelled() {
                *current = CancellationToken::new();
            }
            current.clone()
        };

        let mut session = UpdateSession::new(HashAlgorithm::default());
        let mut report = SessionReport::new(session.id);
        self.set_state(SessionState::Idle);

        if !self.config.updater.enabled {
            info!("Updater disabled for {}, nothing to do", self.config.updater.app_name);
            return Ok(report);
        }

        info!(session = %session.id, "Checking {} for updates", self.config.updater.app_name);

        let (index, tasks) = match self.plan().await {
            Ok(planned) => planned,
            Err(e) => {
                self.fail(&session, &mut report, e).await;
                return Ok(report);
            }
        };
        self.enter(&mut report, SessionState::ManifestFetched);
        session.algorithm = index.algorithm();
        self.enter(&mut report, SessionState::DiffComputed);

        if tasks.is_empty() {
            info!("{} is up to date", self.config.updater.app_name);
            self.enter(&mut report, SessionState::Completed);
            return Ok(report);
        }
        session.tasks = tasks;

        self.enter(&mut report, SessionState::AwaitingConfirmation);
        let decision = self
            .collaborators
            .confirmation
            .confirm(&session.tasks)
            .await;
        if decision == Decision::Cancel {
            info!("Update declined");
            self.enter(&mut report, SessionState::Cancelled);
            self.roll_back(&session, &mut report).await;
            return Ok(report);
        }

        self.enter(&mut report, SessionState::Downloading);
        info!(
            "Installing {} file(s), {}",
            session.tasks.len(),
            format_bytes(session.total_bytes())
        );
        let applied = self
            .applier
            .apply(
                &session.tasks,
                session.algorithm,
                Arc::clone(&self.collaborators.progress),
                &cancel,
            )
            .await;

        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(&session, &mut report, e).await;
                return Ok(report);
            }
        };

        for (task, status) in session.tasks.iter_mut().zip(&outcome.statuses) {
            task.finish(*status);
        }
        info!(
            "{} file(s) updated, {} failed, {} not started",
            session.count(TaskStatus::Downloaded),
            session.count(TaskStatus::Failed),
            session.count(TaskStatus::Pending)
        );
        session.needs_restart = outcome.needs_restart;
        session.deferred = outcome.deferred;
        report.apply_errors = outcome.errors;
        self.save_journal(&session);

        if outcome.cancelled {
            info!("Update cancelled during download");
            self.enter(&mut report, SessionState::Cancelled);
            self.roll_back(&session, &mut report).await;
            return Ok(report);
        }

        self.enter(&mut report, SessionState::Completed);
        report.tasks = session.tasks.clone();
        report.needs_restart = session.needs_restart;

        if session.needs_restart {
            report.restarted = true;
            if let Err(e) = self.collaborators.restarter.restart().await {
                warn!("Restart failed: {:#}", e);
            }
        }

        info!("{}", report.summary().trim_end());
        Ok(report)
    }

    /// Restore backups for the tasks recorded in the last session journal.
    pub async fn rollback_last(&self) -> Result<RollbackReport> {
        let _guard = self
            .active
            .try_lock()
            .map_err(|_| UpdateError::SessionActive)?;

        let journal = SessionJournal::load(&self.journal_path())?;
        let tasks = written_tasks(&journal.tasks);
        info!(session = %journal.session_id, "Rolling back {} file(s)", tasks.len());

        let rollback = self.rollback.clone();
        tokio::task::spawn_blocking(move || rollback.rollback(&tasks))
            .await
            .map_err(|e| UpdateError::Io(std::io::Error::other(e)))
    }

    /// Promote the deferred replacements recorded in the last session journal.
    pub async fn finalize_last(&self) -> Result<replace::DeferredOutcome> {
        let journal = SessionJournal::load(&self.journal_path())?;
        tokio::task::spawn_blocking(move || replace::finalize_deferred(&journal.deferred))
            .await
            .map_err(|e| UpdateError::Io(std::io::Error::other(e)))
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn enter(&self, report: &mut SessionReport, state: SessionState) {
        debug!("Session state: {}", state);
        self.set_state(state);
        report.enter(state);
    }

    /// Record a fatal error; roll back when the session had planned tasks.
    async fn fail(&self, session: &UpdateSession, report: &mut SessionReport, e: UpdateError) {
        error!(session = %session.id, "Update failed: {}", e);
        report.failure = Some(e);
        self.enter(report, SessionState::Failed);
        if !session.tasks.is_empty() {
            self.roll_back(session, report).await;
        }
    }

    /// Restore the files this session wrote. Untouched targets keep whatever
    /// an earlier session installed, even if an older `.old` sits beside them.
    async fn roll_back(&self, session: &UpdateSession, report: &mut SessionReport) {
        let rollback = self.rollback.clone();
        let tasks = written_tasks(&session.tasks);
        if tasks.is_empty() {
            debug!("No files were written, nothing to restore");
        }
        match tokio::task::spawn_blocking(move || rollback.rollback(&tasks)).await {
            Ok(result) => report.rollback_errors = result.errors,
            Err(e) => warn!("Rollback worker failed: {}", e),
        }
        report.tasks = session.tasks.clone();
        self.enter(report, SessionState::RolledBack);
    }

    fn save_journal(&self, session: &UpdateSession) {
        let path = self.journal_path();
        match SessionJournal::from_session(session).save(&path) {
            Ok(()) => debug!("Session journal written to {}", path.display()),
            Err(e) => warn!("Cannot write session journal: {}", e),
        }
    }
}

/// Tasks whose destination was replaced or deferred by their session.
fn written_tasks(tasks: &[DownloadTask]) -> Vec<DownloadTask> {
    tasks
        .iter()
        .filter(|t| t.status() == TaskStatus::Downloaded)
        .cloned()
        .collect()
}
