pub mod client;
pub mod progress;

pub use client::build_http_client;
pub use progress::{ProgressEvent, ProgressTracker, TransferProgress};
