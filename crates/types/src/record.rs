//! Captured OAuth token records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation of an OAuth token for an identity.
///
/// The same shape is written to the append-only history and to the
/// current-state table keyed by `email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Expiration reported by the token itself.
    pub expiry: DateTime<Utc>,
    pub token_type: String,
    pub user_ip: String,
    pub user_agent: String,
    /// When the identity was first captured.
    pub capture_date: DateTime<Utc>,
    /// When this record instance was written (logged as the history timestamp).
    pub last_updated: DateTime<Utc>,
}

impl TokenRecord {
    /// Create a `Bearer` record captured now, with empty client metadata.
    pub fn new(email: impl Into<String>, access_token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            access_token: access_token.into(),
            refresh_token: String::new(),
            expiry: now,
            token_type: "Bearer".to_string(),
            user_ip: String::new(),
            user_agent: String::new(),
            capture_date: now,
            last_updated: now,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    /// Set the token's own expiration.
    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = expiry;
        self
    }

    /// Record the client that presented the token.
    #[must_use]
    pub fn with_client(mut self, user_ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.user_ip = user_ip.into();
        self.user_agent = user_agent.into();
        self
    }

    /// Set both capture and write timestamps.
    #[must_use]
    pub fn captured_at(mut self, capture_date: DateTime<Utc>, last_updated: DateTime<Utc>) -> Self {
        self.capture_date = capture_date;
        self.last_updated = last_updated;
        self
    }
}

/// A row of the append-only token history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Surrogate id, assigned at insertion and never reused.
    pub id: i64,
    /// The logged record. History does not keep a separate capture date, so
    /// `capture_date` and `last_updated` both carry the logged timestamp.
    #[serde(flatten)]
    pub record: TokenRecord,
}

/// How an upsert treats `capture_date` when the email already has a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureDatePolicy {
    /// Take the incoming record's capture date on every upsert.
    #[default]
    Overwrite,
    /// Keep the capture date of the first stored row.
    PreserveFirst,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_new_defaults_to_bearer() {
        let r = TokenRecord::new("u@example.com", "tok1");
        assert_eq!(r.token_type, "Bearer");
        assert!(r.refresh_token.is_empty());
        assert_eq!(r.capture_date, r.last_updated);
    }

    #[test]
    fn test_builders() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let r = TokenRecord::new("u@example.com", "tok1")
            .with_refresh("ref")
            .with_expiry(at + Duration::hours(1))
            .with_client("10.0.0.1", "curl/8.0")
            .captured_at(at, at);
        assert_eq!(r.refresh_token, "ref");
        assert_eq!(r.user_ip, "10.0.0.1");
        assert_eq!(r.user_agent, "curl/8.0");
        assert_eq!(r.expiry - r.capture_date, Duration::hours(1));
    }

    #[test]
    fn test_history_entry_serializes_flat() {
        let entry = HistoryEntry {
            id: 7,
            record: TokenRecord::new("a@x.com", "t"),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["email"], "a@x.com");
    }

    #[test]
    fn test_capture_policy_serde() {
        let p: CaptureDatePolicy = serde_json::from_str("\"preserve_first\"").unwrap();
        assert_eq!(p, CaptureDatePolicy::PreserveFirst);
        assert_eq!(CaptureDatePolicy::default(), CaptureDatePolicy::Overwrite);
    }
}
