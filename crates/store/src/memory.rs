//! In-memory token store backed by a `Vec` log and a `BTreeMap` behind a `Mutex`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokenkeep_types::{
    CaptureDatePolicy, HistoryEntry, KeepError, TokenRecord, TokenStore, traits::Result,
};

#[derive(Default)]
struct State {
    history: Vec<HistoryEntry>,
    /// Email-keyed current rows; `BTreeMap` keeps them in byte order.
    current: BTreeMap<String, TokenRecord>,
}

/// An in-memory [`TokenStore`] implementation for testing and ephemeral use.
#[derive(Default)]
pub struct InMemoryTokenStore {
    state: Mutex<State>,
    capture_date: CaptureDatePolicy,
}

impl InMemoryTokenStore {
    /// Creates a new empty in-memory token store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given `capture_date` upsert policy.
    #[must_use]
    pub fn with_capture_policy(capture_date: CaptureDatePolicy) -> Self {
        Self {
            state: Mutex::default(),
            capture_date,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn record_history(&self, record: &TokenRecord) -> Result<i64> {
        let mut state = self.lock();
        let id = i64::try_from(state.history.len())
            .map_err(|e| KeepError::Write(e.to_string()))?
            + 1;
        let mut logged = record.clone();
        logged.capture_date = logged.last_updated;
        state.history.push(HistoryEntry { id, record: logged });
        Ok(id)
    }

    async fn upsert_current(&self, record: &TokenRecord) -> Result<()> {
        let mut state = self.lock();
        let mut next = record.clone();
        if self.capture_date == CaptureDatePolicy::PreserveFirst
            && let Some(existing) = state.current.get(&record.email)
        {
            next.capture_date = existing.capture_date;
        }
        state.current.insert(next.email.clone(), next);
        Ok(())
    }

    async fn get_current(&self, email: &str) -> Result<TokenRecord> {
        self.lock()
            .current
            .get(email)
            .cloned()
            .ok_or_else(|| KeepError::NotFound(email.to_string()))
    }

    async fn list_current(&self) -> Result<Vec<TokenRecord>> {
        Ok(self.lock().current.values().cloned().collect())
    }

    async fn list_history(&self, email: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .lock()
            .history
            .iter()
            .filter(|h| h.record.email == email)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(email: &str, access: &str, hour: u32) -> TokenRecord {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap();
        TokenRecord::new(email, access).captured_at(at, at)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = InMemoryTokenStore::new();
        let r = record("u@example.com", "tok1", 1);
        store.upsert_current(&r).await.unwrap();
        assert_eq!(store.get_current("u@example.com").await.unwrap(), r);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryTokenStore::new();
        let err = store.get_current("nobody@example.com").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = InMemoryTokenStore::new();
        store
            .upsert_current(&record("u@example.com", "tok1", 1))
            .await
            .unwrap();
        store
            .upsert_current(&record("u@example.com", "tok2", 2))
            .await
            .unwrap();
        let all = store.list_current().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].access_token, "tok2");
        assert_eq!(all[0].capture_date.format("%H").to_string(), "02");
    }

    #[tokio::test]
    async fn test_preserve_first_capture_date() {
        let store = InMemoryTokenStore::with_capture_policy(CaptureDatePolicy::PreserveFirst);
        let first = record("u@example.com", "tok1", 1);
        store.upsert_current(&first).await.unwrap();
        store
            .upsert_current(&record("u@example.com", "tok2", 2))
            .await
            .unwrap();
        let cur = store.get_current("u@example.com").await.unwrap();
        assert_eq!(cur.access_token, "tok2");
        assert_eq!(cur.capture_date, first.capture_date);
    }

    #[tokio::test]
    async fn test_list_sorted_by_email() {
        let store = InMemoryTokenStore::new();
        for email in ["b@x.com", "a@x.com", "c@x.com"] {
            store.upsert_current(&record(email, "t", 1)).await.unwrap();
        }
        let emails: Vec<String> = store
            .list_current()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.email)
            .collect();
        assert_eq!(emails, ["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[tokio::test]
    async fn test_capture_logs_both_views() {
        let store = InMemoryTokenStore::new();
        let a = store.capture(&record("u@example.com", "tok1", 1)).await.unwrap();
        let b = store.capture(&record("u@example.com", "tok2", 2)).await.unwrap();
        assert_eq!((a, b), (1, 2));

        let history = store.list_history("u@example.com").await.unwrap();
        assert_eq!(history[0].record.access_token, "tok1");
        assert_eq!(history[1].record.access_token, "tok2");
        assert_eq!(
            store.get_current("u@example.com").await.unwrap().access_token,
            "tok2"
        );
    }
}
