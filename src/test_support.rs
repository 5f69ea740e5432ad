//! Usage: Public test helpers for integration tests.

use crate::domain::accounts::Account;
use crate::infra::kv_store::SqliteKvStore;
use crate::infra::settings::{self, AppSettings};
use crate::shared::error::AppResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub fn db_path(data_dir: &Path) -> PathBuf {
    crate::infra::db::db_path(data_dir)
}

pub fn open_sqlite_store(data_dir: &Path) -> AppResult<SqliteKvStore> {
    SqliteKvStore::open(&db_path(data_dir))
}

pub fn settings_read(data_dir: &Path) -> AppResult<AppSettings> {
    settings::read(data_dir)
}

pub fn settings_write(data_dir: &Path, value: &AppSettings) -> AppResult<AppSettings> {
    settings::write(data_dir, value)
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    settings::settings_path(data_dir)
}

/// Applies env overrides from `vars` instead of the process environment.
pub fn settings_apply_env(value: &mut AppSettings, vars: &[(&str, &str)]) -> AppResult<()> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    settings::apply_env_overrides(value, |key| vars.get(key).cloned())
}

/// Email of the account the rotation policy would pick next.
pub fn next_rotation_candidate(accounts: &[Account], current_active: Option<&str>) -> Option<String> {
    crate::domain::rotation::select_next(accounts, current_active).map(|idx| accounts[idx].email.clone())
}
