//! Download progress: per-task events plus byte-level session tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Progress notification sent to the progress collaborator while downloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started {
        relative_path: String,
        size_bytes: u64,
    },
    /// Cumulative bytes received for one file
    Advanced {
        relative_path: String,
        bytes: u64,
        total: u64,
    },
    Succeeded {
        relative_path: String,
        /// New content is waiting under the deferred-rename marker
        deferred: bool,
    },
    Failed {
        relative_path: String,
        error: String,
    },
}

impl ProgressEvent {
    pub fn relative_path(&self) -> &str {
        match self {
            ProgressEvent::Started { relative_path, .. }
            | ProgressEvent::Advanced { relative_path, .. }
            | ProgressEvent::Succeeded { relative_path, .. }
            | ProgressEvent::Failed { relative_path, .. } => relative_path,
        }
    }
}

/// Snapshot of a download session's progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferProgress {
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    /// Bytes per second since the previous snapshot
    pub bytes_per_second: u64,
    pub eta_seconds: u64,
    /// 0-100
    pub percent_complete: f64,
    pub files_finished: usize,
    pub total_files: usize,
}

/// Folds progress events from concurrent downloads into session totals.
pub struct ProgressTracker {
    start_time: Instant,
    last_update_time: Instant,
    last_bytes: u64,
    per_file: HashMap<String, u64>,
    progress: TransferProgress,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, total_files: usize) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update_time: now,
            last_bytes: 0,
            per_file: HashMap::new(),
            progress: TransferProgress {
                total_bytes,
                total_files,
                ..TransferProgress::default()
            },
        }
    }

    pub fn record(&mut self, event: &ProgressEvent) -> &TransferProgress {
        match event {
            ProgressEvent::Started { relative_path, .. } => {
                self.per_file.insert(relative_path.clone(), 0);
            }
            ProgressEvent::Advanced {
                relative_path,
                bytes,
                ..
            } => {
                self.per_file.insert(relative_path.clone(), *bytes);
            }
            ProgressEvent::Succeeded { .. } | ProgressEvent::Failed { .. } => {
                self.progress.files_finished += 1;
            }
        }
        let transferred: u64 = self.per_file.values().sum();
        self.update(transferred)
    }

    fn update(&mut self, transferred_bytes: u64) -> &TransferProgress {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update_time).as_secs_f64();

        if elapsed > 0.0 {
            let bytes_diff = transferred_bytes.saturating_sub(self.last_bytes);
            self.progress.bytes_per_second = (bytes_diff as f64 / elapsed) as u64;
        }
        if self.progress.bytes_per_second > 0 {
            let remaining = self.progress.total_bytes.saturating_sub(transferred_bytes);
            self.progress.eta_seconds = remaining / self.progress.bytes_per_second;
        }

        self.progress.transferred_bytes = transferred_bytes;
        self.progress.percent_complete = if self.progress.total_bytes > 0 {
            (transferred_bytes as f64 / self.progress.total_bytes as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        self.last_update_time = now;
        self.last_bytes = transferred_bytes;

        &self.progress
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since the first event
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.progress.transferred_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
