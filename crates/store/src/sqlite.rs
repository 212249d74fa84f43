//! SQLite-backed token store using sqlx.
//!
//! Schema:
//! - `token_history(id, email, access_token, refresh_token, expiry, token_type,
//!   user_ip, user_agent, timestamp)`, append-only with an autoincrement id.
//! - `current_tokens(email, access_token, refresh_token, expiry, token_type,
//!   user_ip, user_agent, capture_date, last_updated)` keyed by `email`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{Stream, TryStreamExt as _};
use sqlx::{
    FromRow, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use std::{path::Path, str::FromStr, time::Duration};
use tokenkeep_types::{
    CaptureDatePolicy, HistoryEntry, KeepError, TokenRecord, TokenStore, traits::Result,
};

const INSERT_HISTORY: &str = "INSERT INTO token_history
    (email, access_token, refresh_token, expiry, token_type, user_ip, user_agent, timestamp)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

const UPSERT_OVERWRITE: &str = "INSERT INTO current_tokens
    (email, access_token, refresh_token, expiry, token_type, user_ip, user_agent, capture_date, last_updated)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(email) DO UPDATE SET
        access_token = excluded.access_token,
        refresh_token = excluded.refresh_token,
        expiry = excluded.expiry,
        token_type = excluded.token_type,
        user_ip = excluded.user_ip,
        user_agent = excluded.user_agent,
        capture_date = excluded.capture_date,
        last_updated = excluded.last_updated";

const UPSERT_PRESERVE_FIRST: &str = "INSERT INTO current_tokens
    (email, access_token, refresh_token, expiry, token_type, user_ip, user_agent, capture_date, last_updated)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(email) DO UPDATE SET
        access_token = excluded.access_token,
        refresh_token = excluded.refresh_token,
        expiry = excluded.expiry,
        token_type = excluded.token_type,
        user_ip = excluded.user_ip,
        user_agent = excluded.user_agent,
        last_updated = excluded.last_updated";

const SELECT_CURRENT_ONE: &str = "SELECT email, access_token, refresh_token, expiry, token_type,
    user_ip, user_agent, capture_date, last_updated FROM current_tokens WHERE email = ?";

const SELECT_CURRENT_ALL: &str = "SELECT email, access_token, refresh_token, expiry, token_type,
    user_ip, user_agent, capture_date, last_updated FROM current_tokens ORDER BY email ASC";

const SELECT_HISTORY: &str = "SELECT id, email, access_token, refresh_token, expiry, token_type,
    user_ip, user_agent, timestamp FROM token_history WHERE email = ? ORDER BY id ASC";

/// Tuning knobs for [`SqliteTokenStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Pool size (defaults to 5).
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Upsert behavior for `capture_date` on an existing row.
    pub capture_date: CaptureDatePolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            capture_date: CaptureDatePolicy::Overwrite,
        }
    }
}

/// A persistent [`TokenStore`] backed by `SQLite`.
pub struct SqliteTokenStore {
    /// Connection pool to the `SQLite` database.
    pool: SqlitePool,
    capture_date: CaptureDatePolicy,
}

impl SqliteTokenStore {
    /// Opens (creating if missing) the database file at `path` with default options.
    ///
    /// # Errors
    ///
    /// Returns [`KeepError::StorageUnavailable`] if the file cannot be opened and
    /// [`KeepError::Schema`] if table creation fails.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &StoreOptions::default()).await
    }

    /// Opens the database file at `path` in WAL mode with the given options.
    ///
    /// # Errors
    ///
    /// See [`SqliteTokenStore::open`].
    pub async fn open_with(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let store = Self::connect_options(opts, options).await?;
        tracing::info!(path = %path.display(), "token store ready");
        Ok(store)
    }

    /// Connects to a `SQLite` URL (e.g. `"sqlite:./tokens.db"` or `"sqlite::memory:"`).
    ///
    /// # Errors
    ///
    /// See [`SqliteTokenStore::open`].
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, &StoreOptions::default()).await
    }

    /// Connects to a `SQLite` URL with the given options.
    ///
    /// # Errors
    ///
    /// See [`SqliteTokenStore::open`].
    pub async fn connect_with(database_url: &str, options: &StoreOptions) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| KeepError::StorageUnavailable(e.to_string()))?
            .create_if_missing(true);
        Self::connect_options(opts, options).await
    }

    async fn connect_options(opts: SqliteConnectOptions, options: &StoreOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(opts.busy_timeout(options.busy_timeout))
            .await
            .map_err(|e| KeepError::StorageUnavailable(e.to_string()))?;
        Self::migrate(&pool)
            .await
            .map_err(|e| KeepError::Schema(e.to_string()))?;
        Ok(Self {
            pool,
            capture_date: options.capture_date,
        })
    }

    /// Create both tables if they do not exist (idempotent).
    async fn migrate(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS token_history (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                email         TEXT,
                access_token  TEXT,
                refresh_token TEXT,
                expiry        DATETIME,
                token_type    TEXT,
                user_ip       TEXT,
                user_agent    TEXT,
                timestamp     DATETIME
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS current_tokens (
                email         TEXT PRIMARY KEY,
                access_token  TEXT,
                refresh_token TEXT,
                expiry        DATETIME,
                token_type    TEXT,
                user_ip       TEXT,
                user_agent    TEXT,
                capture_date  DATETIME,
                last_updated  DATETIME
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Logs a capture event to both tables inside a single transaction.
    ///
    /// Unlike [`TokenStore::capture`], either both rows land or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`KeepError::Write`] if either statement or the commit fails.
    pub async fn capture_atomic(&self, record: &TokenRecord) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        let id = insert_history(&mut *tx, record).await?;
        upsert(&mut *tx, record, self.capture_date).await?;
        tx.commit().await.map_err(write_err)?;
        Ok(id)
    }

    /// Closes the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn record_history(&self, record: &TokenRecord) -> Result<i64> {
        insert_history(&self.pool, record).await
    }

    async fn upsert_current(&self, record: &TokenRecord) -> Result<()> {
        upsert(&self.pool, record, self.capture_date).await
    }

    async fn get_current(&self, email: &str) -> Result<TokenRecord> {
        let row: Option<CurrentRow> = sqlx::query_as(SELECT_CURRENT_ONE)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::warn!(email, error = %e, "querying current token failed");
                KeepError::Read(e.to_string())
            })?;
        row.map(TokenRecord::from)
            .ok_or_else(|| KeepError::NotFound(email.to_string()))
    }

    async fn list_current(&self) -> Result<Vec<TokenRecord>> {
        let rows = sqlx::query(SELECT_CURRENT_ALL).fetch(&self.pool);
        let rows: Vec<CurrentRow> = collect_rows(rows, "current_tokens").await?;
        Ok(rows.into_iter().map(TokenRecord::from).collect())
    }

    async fn list_history(&self, email: &str) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(SELECT_HISTORY).bind(email).fetch(&self.pool);
        let rows: Vec<HistoryRow> = collect_rows(rows, "token_history").await?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }
}

async fn insert_history<'e, E>(executor: E, record: &TokenRecord) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query(INSERT_HISTORY)
        .bind(&record.email)
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(record.expiry)
        .bind(&record.token_type)
        .bind(&record.user_ip)
        .bind(&record.user_agent)
        .bind(record.last_updated)
        .execute(executor)
        .await
        .map_err(write_err)?;
    Ok(done.last_insert_rowid())
}

async fn upsert<'e, E>(executor: E, record: &TokenRecord, policy: CaptureDatePolicy) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = match policy {
        CaptureDatePolicy::Overwrite => UPSERT_OVERWRITE,
        CaptureDatePolicy::PreserveFirst => UPSERT_PRESERVE_FIRST,
    };
    sqlx::query(sql)
        .bind(&record.email)
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(record.expiry)
        .bind(&record.token_type)
        .bind(&record.user_ip)
        .bind(&record.user_agent)
        .bind(record.capture_date)
        .bind(record.last_updated)
        .execute(executor)
        .await
        .map_err(write_err)?;
    Ok(())
}

#[allow(clippy::needless_pass_by_value)]
fn write_err(e: sqlx::Error) -> KeepError {
    KeepError::Write(e.to_string())
}

/// Drains a row stream, skipping rows that fail to decode.
///
/// A failure of the stream itself aborts with [`KeepError::Read`].
async fn collect_rows<T, S>(mut rows: S, table: &'static str) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, SqliteRow>,
    S: Stream<Item = std::result::Result<SqliteRow, sqlx::Error>> + Unpin,
{
    let mut out = Vec::new();
    while let Some(row) = rows.try_next().await.map_err(|e| {
        tracing::warn!(table, error = %e, "iterating token rows failed");
        KeepError::Read(e.to_string())
    })? {
        match T::from_row(&row) {
            Ok(item) => out.push(item),
            Err(e) => tracing::warn!(table, error = %e, "skipping unreadable row"),
        }
    }
    Ok(out)
}

#[derive(FromRow)]
struct CurrentRow {
    email: String,
    access_token: String,
    refresh_token: String,
    expiry: DateTime<Utc>,
    token_type: String,
    user_ip: String,
    user_agent: String,
    capture_date: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl From<CurrentRow> for TokenRecord {
    fn from(r: CurrentRow) -> Self {
        Self {
            email: r.email,
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            expiry: r.expiry,
            token_type: r.token_type,
            user_ip: r.user_ip,
            user_agent: r.user_agent,
            capture_date: r.capture_date,
            last_updated: r.last_updated,
        }
    }
}

#[derive(FromRow)]
struct HistoryRow {
    id: i64,
    email: String,
    access_token: String,
    refresh_token: String,
    expiry: DateTime<Utc>,
    token_type: String,
    user_ip: String,
    user_agent: String,
    timestamp: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(r: HistoryRow) -> Self {
        Self {
            id: r.id,
            record: TokenRecord {
                email: r.email,
                access_token: r.access_token,
                refresh_token: r.refresh_token,
                expiry: r.expiry,
                token_type: r.token_type,
                user_ip: r.user_ip,
                user_agent: r.user_agent,
                capture_date: r.timestamp,
                last_updated: r.timestamp,
            },
        }
    }
}
