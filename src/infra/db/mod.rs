//! Usage: SQLite connection setup, schema migrations, and pooled connection access.

mod migrations;

use crate::shared::error::db_err;
use crate::shared::error::AppResult;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) const DB_FILE_NAME: &str = "account-pool-hub.db";
const BUSY_TIMEOUT_DEFAULT: Duration = Duration::from_millis(2000);
const POOL_MAX_SIZE_DEFAULT: u32 = 4;
const POOL_MIN_IDLE_DEFAULT: u32 = 1;
const POOL_CONNECTION_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5);
const PRAGMA_SYNCHRONOUS_DEFAULT: &str = "NORMAL";

#[derive(Debug, Clone)]
struct DbRuntimeConfig {
    busy_timeout: Duration,
    pool_max_size: u32,
    pool_min_idle: u32,
    pool_connection_timeout: Duration,
    pragma_synchronous: String,
}

impl DbRuntimeConfig {
    fn from_env() -> Self {
        Self::from_env_get(|key| env::var(key).ok())
    }

    fn from_env_get(mut get: impl FnMut(&str) -> Option<String>) -> Self {
        let busy_timeout = get("ACCOUNT_POOL_DB_BUSY_TIMEOUT_MS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(BUSY_TIMEOUT_DEFAULT);

        let pool_max_size = get("ACCOUNT_POOL_DB_POOL_MAX_SIZE")
            .as_deref()
            .and_then(parse_u32_trimmed)
            .filter(|v| *v > 0)
            .unwrap_or(POOL_MAX_SIZE_DEFAULT);

        let pool_min_idle = get("ACCOUNT_POOL_DB_POOL_MIN_IDLE")
            .as_deref()
            .and_then(parse_u32_trimmed)
            .unwrap_or(POOL_MIN_IDLE_DEFAULT)
            .min(pool_max_size);

        let pool_connection_timeout = get("ACCOUNT_POOL_DB_POOL_CONNECTION_TIMEOUT_MS")
            .as_deref()
            .and_then(parse_u64_trimmed)
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .unwrap_or(POOL_CONNECTION_TIMEOUT_DEFAULT);

        let pragma_synchronous = get("ACCOUNT_POOL_DB_PRAGMA_SYNCHRONOUS")
            .as_deref()
            .and_then(parse_pragma_synchronous)
            .unwrap_or_else(|| PRAGMA_SYNCHRONOUS_DEFAULT.to_string());

        Self {
            busy_timeout,
            pool_max_size,
            pool_min_idle,
            pool_connection_timeout,
            pragma_synchronous,
        }
    }
}

fn parse_u32_trimmed(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u32>().ok()
}

fn parse_u64_trimmed(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u64>().ok()
}

fn parse_pragma_synchronous(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "OFF" | "NORMAL" | "FULL" | "EXTRA" => Some(normalized),
        _ => None,
    }
}

#[derive(Clone)]
pub(crate) struct Db {
    pool: Pool<SqliteConnectionManager>,
}

impl Db {
    pub(crate) fn open_connection(
        &self,
    ) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| db_err!("failed to get connection from pool: {e}"))
    }
}

pub(crate) fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE_NAME)
}

pub(crate) fn init(path: &Path) -> AppResult<Db> {
    let path_hint = path.to_string_lossy();

    let config = DbRuntimeConfig::from_env();
    tracing::info!(
        busy_timeout_ms = config.busy_timeout.as_millis(),
        pool_max_size = config.pool_max_size,
        pool_min_idle = config.pool_min_idle,
        pool_connection_timeout_ms = config.pool_connection_timeout.as_millis(),
        pragma_synchronous = %config.pragma_synchronous,
        "sqlite runtime config"
    );

    let manager = SqliteConnectionManager::file(path).with_init({
        let config = config.clone();
        move |conn| {
            conn.busy_timeout(config.busy_timeout)?;
            configure_connection(conn, &config)
        }
    });

    let pool = Pool::builder()
        .max_size(config.pool_max_size)
        .min_idle(Some(config.pool_min_idle))
        .connection_timeout(config.pool_connection_timeout)
        .build(manager)
        .map_err(|e| db_err!("failed to create db pool: {e}"))?;
    let mut conn = pool
        .get()
        .map_err(|e| db_err!("failed to get startup connection: {e}"))?;

    migrations::apply_migrations(&mut conn)
        .map_err(|e| db_err!("sqlite migration failed at {path_hint}: {e}"))?;

    Ok(Db { pool })
}

fn configure_connection(conn: &Connection, config: &DbRuntimeConfig) -> rusqlite::Result<()> {
    let sql = format!(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = {synchronous};
PRAGMA temp_store = MEMORY;
"#,
        synchronous = config.pragma_synchronous.as_str(),
    );

    conn.execute_batch(&sql)
}
