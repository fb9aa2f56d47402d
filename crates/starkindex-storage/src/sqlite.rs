//! SQLite record store.
//!
//! Every record (matched transactions and events, checkpoints, the
//! configuration set) lives in one `records` table keyed by the raw key
//! bytes. Uses `sqlx` with WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use starkindex_storage::sqlite::SqliteRecordStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteRecordStore::open("./starkindex.db").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, trace};

use starkindex_core::error::{IndexerError, IndexerResult};
use starkindex_core::ports::RecordStore;

fn storage(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed [`RecordStore`].
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (or create) a database at `path`.
    ///
    /// The path may be a plain file path (`"./index.db"`) or a full
    /// SQLite URL (`"sqlite:./index.db?mode=rwc"`).
    pub async fn open(path: &str) -> IndexerResult<Self> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        debug!(path, "sqlite record store opened");
        Ok(store)
    }

    /// Open an in-memory database. Data is lost when the store is dropped.
    pub async fn in_memory() -> IndexerResult<Self> {
        // Each connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> IndexerResult<()> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                key   BLOB PRIMARY KEY,
                value BLOB NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Keys starting with `prefix`, in byte order.
    pub async fn keys_with_prefix(&self, prefix: &str) -> IndexerResult<Vec<String>> {
        let rows = match prefix_upper_bound(prefix.as_bytes()) {
            Some(upper) => {
                sqlx::query("SELECT key FROM records WHERE key >= ? AND key < ? ORDER BY key")
                    .bind(prefix.as_bytes())
                    .bind(upper)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT key FROM records WHERE key >= ? ORDER BY key")
                    .bind(prefix.as_bytes())
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage)?;

        Ok(rows
            .into_iter()
            .map(|row| String::from_utf8_lossy(&row.get::<Vec<u8>, _>("key")).into_owned())
            .collect())
    }

    /// Total number of records.
    pub async fn record_count(&self) -> IndexerResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when no such bound exists (empty or all-`0xff` prefix).
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, key: &[u8]) -> IndexerResult<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> IndexerResult<()> {
        sqlx::query("INSERT OR REPLACE INTO records (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        trace!(key = %String::from_utf8_lossy(key), "record stored");
        Ok(())
    }
}
