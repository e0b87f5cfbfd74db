//! Utility modules for the update agent.

pub mod errors;
pub mod logger;

pub use errors::{ApplyCause, ApplyError, FetchError, ManifestError, Result, RollbackError, UpdateError};
