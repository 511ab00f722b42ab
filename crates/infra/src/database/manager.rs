//! Database connection manager backed by an r2d2 pool of SQLCipher
//! connections.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kindred_domain::{KindredError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::{info, instrument};

use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Owns the connection pool; repositories share it through an `Arc`.
pub struct DbManager {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl DbManager {
    /// Open (or create) the encrypted database at `db_path`.
    ///
    /// Every pooled connection is keyed before first use, so a wrong key
    /// fails here rather than on the first query.
    #[instrument(skip(encryption_key), fields(db_path = %db_path.as_ref().display()))]
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        pool_size: u32,
        encryption_key: Option<&str>,
    ) -> Result<Self> {
        let key = encryption_key
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| KindredError::Config("database encryption key not provided".into()))?;

        let path = db_path.as_ref().to_path_buf();
        let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
            conn.pragma_update(None, "key", &key)?;
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;",
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(InfraError::from)?;

        let db = Self { pool, path };
        db.health_check()?;

        info!(db_path = %db.path.display(), max_connections = pool_size.max(1), "sqlcipher pool initialised");
        Ok(db)
    }

    /// Acquire a pooled connection.
    pub fn get_connection(&self) -> Result<DbConnection> {
        self.pool.get().map_err(|err| InfraError::from(err).into())
    }

    /// Create any missing tables and record the schema version.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(InfraError::from)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at)
             VALUES (?1, CAST(strftime('%s','now') AS INTEGER) * 1000)",
            params![SCHEMA_VERSION],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify the database answers a trivial query.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0)).map_err(InfraError::from)?;
        Ok(())
    }
}

impl std::fmt::Debug for DbManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbManager")
            .field("path", &self.path)
            .field("max_connections", &self.pool.max_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const TEST_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn migrations_create_schema_version() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager =
            DbManager::new(temp_dir.path().join("test.db"), 2, Some(TEST_KEY)).expect("manager");
        manager.run_migrations().expect("migrations run");
        manager.run_migrations().expect("migrations are idempotent");

        let conn = manager.get_connection().expect("connection acquired");
        let version: i32 =
            conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn foreign_keys_are_enabled_on_pooled_connections() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager =
            DbManager::new(temp_dir.path().join("test.db"), 2, Some(TEST_KEY)).expect("manager");

        let conn = manager.get_connection().expect("connection acquired");
        let enabled: i32 =
            conn.pragma_query_value(None, "foreign_keys", |row| row.get(0)).unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn missing_encryption_key_is_a_config_error() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let err = DbManager::new(temp_dir.path().join("test.db"), 2, None).unwrap_err();
        assert!(matches!(err, KindredError::Config(_)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let path = temp_dir.path().join("test.db");
        {
            let manager = DbManager::new(&path, 1, Some(TEST_KEY)).expect("manager");
            manager.run_migrations().expect("migrations run");
        }

        assert!(DbManager::new(&path, 1, Some("another-key")).is_err());
    }
}
