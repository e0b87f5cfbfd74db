//! External collaborators the orchestrator talks to: confirmation, progress
//! reporting and application restart.
//!
//! The orchestrator only sees the traits. The CLI wires terminal and logging
//! implementations; embedders supply their own dialogs.

use crate::session::DownloadTask;
use crate::transfer::progress::{
    format_bytes, format_duration, format_speed, ProgressEvent, ProgressTracker,
};
use async_trait::async_trait;
use std::io::{BufRead, Write};
use std::sync::Mutex;
use tracing::{info, warn};

/// Answer returned by the confirmation and progress collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Cancel,
}

/// Presents the download plan and decides whether to proceed.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, tasks: &[DownloadTask]) -> Decision;
}

/// Receives per-task progress; answering `Cancel` cancels the session.
///
/// Called from download workers, so implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    /// Called once before the first download of a session.
    fn on_session_start(&self, _total_bytes: u64, _total_files: usize) {}

    fn on_event(&self, event: &ProgressEvent) -> Decision;
}

/// Relaunches the host application after a completed session.
#[async_trait]
pub trait Restarter: Send + Sync {
    async fn restart(&self) -> anyhow::Result<()>;
}

/// Accepts every plan without asking.
pub struct AutoConfirm;

#[async_trait]
impl Confirmation for AutoConfirm {
    async fn confirm(&self, tasks: &[DownloadTask]) -> Decision {
        info!("Auto-confirming {} file(s)", tasks.len());
        Decision::Accept
    }
}

/// Asks on the terminal.
pub struct PromptConfirm {
    pub app_name: String,
}

#[async_trait]
impl Confirmation for PromptConfirm {
    async fn confirm(&self, tasks: &[DownloadTask]) -> Decision {
        let mut prompt = format!("An update for {} is available:\n", self.app_name);
        for task in tasks {
            prompt.push_str(&format!(
                "  {} ({})\n",
                task.relative_path,
                format_bytes(task.size_bytes)
            ));
        }
        prompt.push_str("Install now? [y/N] ");

        let answer = tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(prompt.as_bytes());
            let _ = stdout.flush();

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes") => {
                Decision::Accept
            }
            Ok(Ok(_)) => Decision::Cancel,
            Ok(Err(e)) => {
                warn!("Cannot read confirmation: {}", e);
                Decision::Cancel
            }
            Err(e) => {
                warn!("Confirmation prompt failed: {}", e);
                Decision::Cancel
            }
        }
    }
}

/// Logs progress through `tracing` and never cancels.
pub struct LoggingProgress {
    tracker: Mutex<ProgressTracker>,
}

impl LoggingProgress {
    pub fn new() -> Self {
        Self {
            tracker: Mutex::new(ProgressTracker::new(0, 0)),
        }
    }
}

impl Default for LoggingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LoggingProgress {
    fn on_session_start(&self, total_bytes: u64, total_files: usize) {
        if let Ok(mut tracker) = self.tracker.lock() {
            *tracker = ProgressTracker::new(total_bytes, total_files);
        }
        info!("Downloading {} file(s), {}", total_files, format_bytes(total_bytes));
    }

    fn on_event(&self, event: &ProgressEvent) -> Decision {
        let Ok(mut tracker) = self.tracker.lock() else {
            return Decision::Accept;
        };
        let progress = tracker.record(event).clone();

        match event {
            ProgressEvent::Started {
                relative_path,
                size_bytes,
            } => info!("Downloading {} ({})", relative_path, format_bytes(*size_bytes)),
            ProgressEvent::Advanced { .. } => tracing::debug!(
                file = %event.relative_path(),
                "{:.1}% ({} of {}) at {}, ETA {}",
                progress.percent_complete,
                format_bytes(progress.transferred_bytes),
                format_bytes(progress.total_bytes),
                format_speed(progress.bytes_per_second),
                format_duration(progress.eta_seconds)
            ),
            ProgressEvent::Succeeded {
                relative_path,
                deferred,
            } => info!(
                "[{}/{}] Updated {}{}",
                progress.files_finished,
                progress.total_files,
                relative_path,
                if *deferred { " (pending restart)" } else { "" }
            ),
            ProgressEvent::Failed {
                relative_path,
                error,
            } => warn!(
                "[{}/{}] Failed {}: {}",
                progress.files_finished, progress.total_files, relative_path, error
            ),
        }

        if progress.total_files > 0 && progress.files_finished == progress.total_files {
            info!(
                "Transferred {} in {} (average {})",
                format_bytes(progress.transferred_bytes),
                format_duration(tracker.elapsed().as_secs()),
                format_speed(tracker.average_speed())
            );
        }
        Decision::Accept
    }
}

/// Relaunches the host by spawning a configured command.
pub struct CommandRestarter {
    pub command: String,
    pub args: Vec<String>,
}

#[async_trait]
impl Restarter for CommandRestarter {
    async fn restart(&self) -> anyhow::Result<()> {
        info!("Relaunching with: {} {}", self.command, self.args.join(" "));
        let child = std::process::Command::new(&self.command)
            .args(&self.args)
            .spawn()?;
        info!("Restart initiated (pid {})", child.id());
        Ok(())
    }
}

/// Used when no relaunch command is configured.
pub struct NoopRestarter;

#[async_trait]
impl Restarter for NoopRestarter {
    async fn restart(&self) -> anyhow::Result<()> {
        info!("Restart required; relaunch the application to finish the update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_confirm_accepts() {
        assert_eq!(AutoConfirm.confirm(&[]).await, Decision::Accept);
    }

    #[test]
    fn test_logging_progress_never_cancels() {
        let sink = LoggingProgress::new();
        sink.on_session_start(10, 1);
        let decision = sink.on_event(&ProgressEvent::Failed {
            relative_path: "a.dll".to_string(),
            error: "boom".to_string(),
        });
        assert_eq!(decision, Decision::Accept);
    }

    #[test]
    fn test_logging_progress_tracks_whole_session() {
        let sink = LoggingProgress::new();
        sink.on_session_start(10, 1);
        for event in [
            ProgressEvent::Started {
                relative_path: "a.dll".to_string(),
                size_bytes: 10,
            },
            ProgressEvent::Advanced {
                relative_path: "a.dll".to_string(),
                bytes: 10,
                total: 10,
            },
            ProgressEvent::Succeeded {
                relative_path: "a.dll".to_string(),
                deferred: false,
            },
        ] {
            assert_eq!(sink.on_event(&event), Decision::Accept);
        }

        let tracker = sink.tracker.lock().unwrap();
        assert_eq!(tracker.progress().transferred_bytes, 10);
        assert_eq!(tracker.progress().files_finished, 1);
        assert!((tracker.progress().percent_complete - 100.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_command_restarter_reports_spawn_failure() {
        let restarter = CommandRestarter {
            command: "/nonexistent/relaunch-binary".to_string(),
            args: Vec::new(),
        };
        assert!(restarter.restart().await.is_err());
    }
}
