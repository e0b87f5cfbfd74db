//! Download applier - fetches each planned file and swaps it into place.
//!
//! Tasks are independent: one failure never stops the others. Downloads run
//! on a bounded worker pool and every destination path is unique within a
//! session, so no two workers ever write the same file.

pub mod download;
pub mod replace;

use crate::collaborators::{Decision, ProgressSink};
use crate::config::RestartConfig;
use crate::diff::SelfIdentity;
use crate::fs::digest::HashAlgorithm;
use crate::session::{DownloadTask, TaskStatus};
use crate::transfer::progress::ProgressEvent;
use crate::utils::errors::{ApplyCause, ApplyError, Result, UpdateError};
use replace::{replace_file, ReplaceOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of applying one session's tasks.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Terminal status per task, index-aligned with the input
    pub statuses: Vec<TaskStatus>,
    pub errors: Vec<ApplyError>,
    pub needs_restart: bool,
    pub cancelled: bool,
    /// Destinations whose new content waits under the deferred-rename marker
    pub deferred: Vec<PathBuf>,
}

impl ApplyOutcome {
    pub fn applied(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| **s == TaskStatus::Downloaded)
            .count()
    }
}

enum TaskResult {
    Applied { deferred: bool },
    Abandoned,
    Failed(ApplyError),
}

pub struct Applier {
    client: reqwest::Client,
    staging_root: PathBuf,
    max_concurrent: usize,
    restart: RestartConfig,
    identity: SelfIdentity,
}

impl Applier {
    pub fn new(
        client: reqwest::Client,
        staging_root: PathBuf,
        max_concurrent: usize,
        restart: RestartConfig,
        identity: SelfIdentity,
    ) -> Self {
        Self {
            client,
            staging_root,
            max_concurrent: max_concurrent.max(1),
            restart,
            identity,
        }
    }

    /// Refuse any task that would overwrite the running executable or the updater.
    pub fn validate(&self, tasks: &[DownloadTask]) -> Result<()> {
        match tasks
            .iter()
            .find(|t| t.is_self || self.identity.matches(&t.destination_path))
        {
            Some(task) => Err(UpdateError::SelfReplacement(task.destination_path.clone())),
            None => Ok(()),
        }
    }

    /// Apply every task, best effort per file.
    ///
    /// Fails only when validation does, before anything is downloaded.
    pub async fn apply(
        &self,
        tasks: &[DownloadTask],
        algorithm: HashAlgorithm,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome> {
        self.validate(tasks)?;

        info!(
            "Applying {} file(s) with up to {} concurrent downloads",
            tasks.len(),
            self.max_concurrent
        );

        progress.on_session_start(tasks.iter().map(|t| t.size_bytes).sum(), tasks.len());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks.iter().cloned() {
            let sem = Arc::clone(&semaphore);
            let client = self.client.clone();
            let staged = self.staging_root.join(&task.relative_path);
            let progress = Arc::clone(&progress);
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return TaskResult::Abandoned,
                    permit = sem.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return TaskResult::Abandoned;
                };
                if cancel.is_cancelled() {
                    return TaskResult::Abandoned;
                }

                run_task(&client, &task, &staged, algorithm, progress.as_ref(), &cancel).await
            }));
        }

        let mut outcome = ApplyOutcome::default();
        for (task, handle) in tasks.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => TaskResult::Failed(ApplyError::new(
                    task.relative_path.clone(),
                    std::io::Error::other(format!("download worker failed: {e}")),
                )),
            };

            match result {
                TaskResult::Applied { deferred } => {
                    if deferred {
                        outcome.deferred.push(task.destination_path.clone());
                        outcome.needs_restart = true;
                    } else if self.restart.requires_restart(&task.relative_path) {
                        outcome.needs_restart = true;
                    }
                    outcome.statuses.push(TaskStatus::Downloaded);
                }
                TaskResult::Abandoned => outcome.statuses.push(TaskStatus::Pending),
                TaskResult::Failed(error) => {
                    warn!(relative_path = %error.relative_path, "Apply failed: {}", error.cause);
                    outcome.statuses.push(TaskStatus::Failed);
                    outcome.errors.push(error);
                }
            }
        }
        outcome.cancelled = cancel.is_cancelled();

        self.remove_staging().await;

        info!(
            "Applied {}/{} file(s), {} failed, {} deferred{}",
            outcome.applied(),
            tasks.len(),
            outcome.errors.len(),
            outcome.deferred.len(),
            if outcome.cancelled { ", cancelled" } else { "" }
        );
        Ok(outcome)
    }

    /// Delete the staging folder and anything left in it.
    pub async fn remove_staging(&self) {
        match tokio::fs::remove_dir_all(&self.staging_root).await {
            Ok(()) => debug!("Removed staging folder {}", self.staging_root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Cannot remove staging folder {}: {}",
                self.staging_root.display(),
                e
            ),
        }
    }
}

async fn run_task(
    client: &reqwest::Client,
    task: &DownloadTask,
    staged: &std::path::Path,
    algorithm: HashAlgorithm,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> TaskResult {
    let notify = |event: ProgressEvent| {
        if progress.on_event(&event) == Decision::Cancel && !cancel.is_cancelled() {
            info!("Download cancelled by progress collaborator");
            cancel.cancel();
        }
    };

    notify(ProgressEvent::Started {
        relative_path: task.relative_path.clone(),
        size_bytes: task.size_bytes,
    });

    let fetched = download::fetch_to_staging(
        client,
        &task.source_url,
        staged,
        algorithm,
        &task.content_hash,
        cancel,
        |bytes| {
            notify(ProgressEvent::Advanced {
                relative_path: task.relative_path.clone(),
                bytes,
                total: task.size_bytes,
            })
        },
    )
    .await;

    let result = match fetched {
        Ok(_) if cancel.is_cancelled() => {
            let _ = tokio::fs::remove_file(staged).await;
            Err(ApplyCause::Cancelled)
        }
        Ok(_) => {
            let staged = staged.to_path_buf();
            let destination = task.destination_path.clone();
            tokio::task::spawn_blocking(move || replace_file(&staged, &destination))
                .await
                .map_err(|e| ApplyCause::Io(std::io::Error::other(e)))
                .and_then(|replaced| replaced.map_err(ApplyCause::Io))
        }
        Err(cause) => Err(cause),
    };

    match result {
        Ok(replaced) => {
            let deferred = matches!(replaced, ReplaceOutcome::Deferred(_));
            notify(ProgressEvent::Succeeded {
                relative_path: task.relative_path.clone(),
                deferred,
            });
            TaskResult::Applied { deferred }
        }
        Err(ApplyCause::Cancelled) => TaskResult::Abandoned,
        Err(cause) => {
            notify(ProgressEvent::Failed {
                relative_path: task.relative_path.clone(),
                error: cause.to_string(),
            });
            TaskResult::Failed(ApplyError::new(task.relative_path.clone(), cause))
        }
    }
}
