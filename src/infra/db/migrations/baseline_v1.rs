//! Usage: Baseline schema for fresh installs (key/value store backing the account pool).

use crate::shared::error::AppResult;
use crate::shared::time::now_unix_seconds;
use rusqlite::Connection;

pub(super) fn create_baseline_v1(conn: &mut Connection) -> AppResult<()> {
    const VERSION: i64 = 1;
    let tx = conn
        .transaction()
        .map_err(|e| format!("failed to start sqlite transaction: {e}"))?;

    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_store (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    )
    .map_err(|e| format!("failed to create baseline schema: {e}"))?;

    tx.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        [VERSION, now_unix_seconds()],
    )
    .map_err(|e| format!("failed to insert schema_migrations row for v{VERSION}: {e}"))?;

    super::set_user_version(&tx, VERSION)?;

    tx.commit()
        .map_err(|e| format!("failed to commit sqlite transaction: {e}"))?;

    Ok(())
}
