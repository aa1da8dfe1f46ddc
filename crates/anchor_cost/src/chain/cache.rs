//! SQLite cache of immutable explorer responses (per-transaction lookups).
//!
//! Address-history pages change as new transactions land and are never cached.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed response store. Key = SHA-256 of `provider` + request path.
pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    /// Open or create the cache at `path`, creating parent dirs.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Throwaway cache, discarded on drop.
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                body BLOB NOT NULL,
                created_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_responses_provider ON responses(provider);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Key for a request. `path` must not contain credentials.
    pub fn key_for(provider: &str, path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(path.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut stmt = conn.prepare("SELECT body FROM responses WHERE key = ?1")?;
        let row = stmt
            .query_row([key], |r| r.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(row.and_then(|b| String::from_utf8(b).ok()))
    }

    pub fn put(&self, key: &str, provider: &str, body: &str) -> Result<(), CacheError> {
        let created = time::OffsetDateTime::now_utc().unix_timestamp();
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (key, provider, body, created_utc)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key, provider, body.as_bytes(), created],
        )?;
        Ok(())
    }

    /// Number of cached responses for a provider.
    pub fn count(&self, provider: &str) -> Result<u64, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM responses WHERE provider = ?1",
            [provider],
            |r| r.get(0),
        )?;
        Ok(n.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn key_depends_on_provider_and_path() {
        let a = Cache::key_for("etherscan", "tx/0xabc");
        let b = Cache::key_for("etherscan", "tx/0xabc");
        let c = Cache::key_for("blockchain.info", "tx/0xabc");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn put_get_on_disk() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let key = Cache::key_for("blockchain.info", "rawtx/abc");
        cache.put(&key, "blockchain.info", r#"{"hash":"abc"}"#).unwrap();
        assert_eq!(cache.get(&key).unwrap().as_deref(), Some(r#"{"hash":"abc"}"#));
        assert!(cache.get("missing").unwrap().is_none());
        assert_eq!(cache.count("blockchain.info").unwrap(), 1);
        assert_eq!(cache.count("etherscan").unwrap(), 0);
    }
}
