//! Filesystem helpers: content digests, permission carry-over and tree walking.

pub mod digest;
pub mod metadata;
pub mod walker;
