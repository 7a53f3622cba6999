//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `statements` - Statement records and their processing lifecycle
//! - `triage` - Stored triage decisions for inbox messages

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod statements;
mod triage;

pub use statements::CompletedStatement;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "PERKS_DB_KEY";

/// Timestamp format written by this crate. Fractional seconds keep uploads
/// made within the same second in order.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path. This allows moving/renaming/restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"perks-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    // Hash portion, hex encoded, is the SQLCipher key
    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Current time in the stored timestamp format
pub(crate) fn now_string() -> String {
    Utc::now().format(DATETIME_FORMAT).to_string()
}

/// Parse a stored datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Also accepts SQLite's CURRENT_TIMESTAMP format (no fraction)
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    encrypted: bool,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `PERKS_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2.
    ///
    /// Returns an error if `PERKS_DB_KEY` is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended: statements hold card numbers).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for development
    /// or testing. For real statements, use `new()` with `PERKS_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Use with_init to set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            encrypted: passphrase.is_some(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "perks_test_{}_{}.db",
            std::process::id(),
            id
        ));

        // Remove any leftover file from an earlier run
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Whether the database was opened with an encryption key
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the pipeline's writes
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Statements (one row per processed PDF)
            CREATE TABLE IF NOT EXISTS statements (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                bank_name TEXT NOT NULL DEFAULT 'Unknown',
                statement_period TEXT,                     -- exactly as printed
                card_variant TEXT NOT NULL DEFAULT 'Unknown Variant',
                reward_points TEXT NOT NULL DEFAULT '{}',  -- JSON RewardPoints
                raw_text TEXT,
                raw_response TEXT,                         -- unmodified model output
                status TEXT NOT NULL DEFAULT 'processing', -- processing, completed, failed
                error_message TEXT,
                source TEXT NOT NULL DEFAULT 'manual',     -- manual, gmail
                uploaded_at DATETIME NOT NULL,
                content_hash TEXT,                         -- SHA256 of the PDF bytes
                extraction_method TEXT,                    -- direct, ocr
                page_count INTEGER,
                ocr_confidence REAL,
                -- Inbox metadata (gmail source only)
                message_id TEXT,
                email_subject TEXT,
                email_sender TEXT,
                email_date TEXT,
                sender_domain TEXT,
                triage_case TEXT,                          -- bank_domain, keyword_match, content_analysis
                triage_reason TEXT,
                classification_confidence TEXT,
                classification_score INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_statements_user_status ON statements(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_statements_source ON statements(user_id, file_name, message_id);
            CREATE INDEX IF NOT EXISTS idx_statements_hash ON statements(user_id, content_hash);

            -- Triage decisions (one row per inbox message)
            CREATE TABLE IF NOT EXISTS triage_decisions (
                user_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                triage_case TEXT NOT NULL,
                sender_domain TEXT NOT NULL,
                decision TEXT NOT NULL,                    -- JSON EmailTriageDecision
                decided_at DATETIME NOT NULL,
                PRIMARY KEY (user_id, message_id)
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
