//! Async traits shared across all tokenkeep crates.
//!
//! Higher layers depend only on `tokenkeep-types`, never on a concrete backend.

use crate::{HistoryEntry, TokenRecord};
use async_trait::async_trait;

pub use crate::error::Result;

/// Persistent storage for captured OAuth tokens.
///
/// Two views are maintained: an append-only history and a current-state
/// table holding the latest record per email.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Append one immutable history row, returning its surrogate id.
    async fn record_history(&self, record: &TokenRecord) -> Result<i64>;

    /// Insert or replace the current-state row keyed by `record.email`.
    async fn upsert_current(&self, record: &TokenRecord) -> Result<()>;

    /// Load the current-state row for `email`.
    ///
    /// Fails with [`KeepError::NotFound`](crate::KeepError::NotFound) if none exists.
    async fn get_current(&self, email: &str) -> Result<TokenRecord>;

    /// List every current-state row, ordered by email ascending.
    async fn list_current(&self) -> Result<Vec<TokenRecord>>;

    /// List every history row for `email`, oldest first.
    async fn list_history(&self, email: &str) -> Result<Vec<HistoryEntry>>;

    /// Log a capture event to both views.
    ///
    /// The two writes are independent: if the upsert fails, the history row
    /// stays written.
    async fn capture(&self, record: &TokenRecord) -> Result<i64> {
        let id = self.record_history(record).await?;
        self.upsert_current(record).await?;
        Ok(id)
    }
}
