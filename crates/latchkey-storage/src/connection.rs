use crate::error::StorageResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Database connection configuration for SQLite
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout: Duration,

    /// Whether to create the database file if it doesn't exist
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "latchkey.db".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            create_if_missing: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration with the given path
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of connections in the pool
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set whether to create the database if it doesn't exist
    #[must_use]
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a database pool with the given configuration and create the
    /// schema if it is not present.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema DDL
    /// fails.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.database_path))?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        info!(path = %config.database_path, "database ready");
        Ok(db)
    }

    /// In-memory database for tests.
    ///
    /// Pinned to a single connection: every pooled connection to
    /// `sqlite::memory:` would otherwise get its own empty database.
    pub async fn in_memory() -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Idempotent schema DDL.
    ///
    /// Timestamps are written by the application as chrono values so the
    /// text format is uniform; range queries bind chrono endpoints instead
    /// of relying on SQLite's date functions.
    async fn ensure_schema(&self) -> StorageResult<()> {
        const DDL: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS passcodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code_hash TEXT NOT NULL,
                code_masked TEXT NOT NULL,
                is_main INTEGER NOT NULL DEFAULT 0,
                is_one_time INTEGER NOT NULL DEFAULT 0,
                used INTEGER NOT NULL DEFAULT 0,
                valid_until TEXT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS access_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                method TEXT NOT NULL,
                result TEXT NOT NULL,
                passcode_masked TEXT NULL,
                passcode_hash TEXT NULL,
                confidence REAL NULL,
                timestamp TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                passcode_enabled INTEGER NOT NULL DEFAULT 1,
                face_recognition_enabled INTEGER NOT NULL DEFAULT 1,
                fingerprint_enabled INTEGER NOT NULL DEFAULT 1,
                hold_time INTEGER NOT NULL DEFAULT 5,
                door_state TEXT NOT NULL DEFAULT 'close'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS fingerprints (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL DEFAULT ''
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_passcodes_hash ON passcodes(code_hash)",
            "CREATE INDEX IF NOT EXISTS idx_access_log_ts ON access_log(timestamp)",
        ];

        for statement in DDL {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}
