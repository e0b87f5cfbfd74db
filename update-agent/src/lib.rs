//! Update Agent Library
//!
//! Client-side self-update engine: fetches a remote manifest, diffs it against
//! the local install, downloads changed files with verification and swaps them
//! into place, rolling back from `.old` backups when a session is abandoned.

pub mod apply;
pub mod collaborators;
pub mod config;
pub mod diff;
pub mod fs;
pub mod manifest;
pub mod orchestrator;
pub mod rollback;
pub mod session;
pub mod shutdown;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use collaborators::{Confirmation, Decision, ProgressSink, Restarter};
pub use config::Config;
pub use diff::{DiffEngine, SelfIdentity};
pub use manifest::{ManifestFetcher, ManifestIndex, RemoteFileEntry};
pub use orchestrator::{Collaborators, UpdateOrchestrator};
pub use rollback::{RollbackManager, RollbackReport};
pub use session::{DownloadTask, SessionReport, SessionState, TaskStatus};
pub use utils::errors::UpdateError;
pub type Result<T> = std::result::Result<T, UpdateError>;
