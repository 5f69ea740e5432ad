//! Usage: Resolve the data directory (settings.json, sqlite db, logs).

use crate::shared::error::AppResult;
use std::ffi::OsString;
use std::path::PathBuf;

const DATA_DIR_ENV: &str = "ACCOUNT_POOL_HUB_DATA_DIR";
const DOTDIR_NAME_ENV: &str = "ACCOUNT_POOL_HUB_DOTDIR_NAME";
const DEFAULT_DOTDIR_NAME: &str = ".account-pool-hub";

pub(crate) fn data_dir() -> AppResult<PathBuf> {
    let dir = resolve_data_dir(|key| std::env::var_os(key))?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("SYSTEM_ERROR: failed to create data dir {}: {e}", dir.display()))?;
    Ok(dir)
}

pub(crate) fn log_dir() -> AppResult<PathBuf> {
    let dir = data_dir()?.join("logs");
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("SYSTEM_ERROR: failed to create log dir {}: {e}", dir.display()))?;
    Ok(dir)
}

fn resolve_data_dir(get: impl Fn(&str) -> Option<OsString>) -> AppResult<PathBuf> {
    if let Some(explicit) = get(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(explicit));
    }

    let dotdir = get(DOTDIR_NAME_ENV)
        .and_then(|v| v.into_string().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.contains('/') && !v.contains('\\'))
        .unwrap_or_else(|| DEFAULT_DOTDIR_NAME.to_string());

    // USERPROFILE is the Windows fallback when HOME is unset.
    let home = get("HOME")
        .filter(|v| !v.is_empty())
        .or_else(|| get("USERPROFILE").filter(|v| !v.is_empty()))
        .ok_or_else(|| "SYSTEM_ERROR: unable to resolve home directory".to_string())?;

    Ok(PathBuf::from(home).join(dotdir))
}
