//! Unified error type for the tokenkeep workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across tokenkeep crates.
#[derive(Debug, Error)]
pub enum KeepError {
    /// The backing database could not be opened or created.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Table provisioning failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// An insert or upsert failed.
    #[error("write error: {0}")]
    Write(String),

    /// A query or result-set iteration failed.
    #[error("read error: {0}")]
    Read(String),

    /// No current token exists for the given email.
    #[error("no current token for {0}")]
    NotFound(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl KeepError {
    /// Returns `true` for a single-row lookup that had no match.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, KeepError>;
