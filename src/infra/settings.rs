//! Usage: Persisted application settings (schema + read/write helpers + env overrides).

use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_CONTROL_API_BASE_URL: &str = "http://127.0.0.1:8888";
pub const DEFAULT_CONTROL_API_TIMEOUT_SECONDS: u32 = 5;
pub const DEFAULT_TOKEN_REFRESH_INTERVAL_SECONDS: u32 = 60;
pub const DEFAULT_SCHEDULE_INTERVAL_SECONDS: u32 = 60;
const DEFAULT_UPSTREAM_DOMAIN: &str = "warp.dev";
const DEFAULT_TELEMETRY_HOST: &str = "dataplane.rudderstack.com";
const DEFAULT_AGENT_PATH: &str = "/ai/multi-agent";
const DEFAULT_SETTINGS_SYNC_PATH: &str = "/graphql/v2";
const DEFAULT_SETTINGS_SYNC_OPERATION: &str = "GetUpdatedCloudObjects";
const DEFAULT_EXPERIMENT_ID_HEADER: &str = "X-Warp-Experiment-Id";
const MAX_CONTROL_API_TIMEOUT_SECONDS: u32 = 120;
const MAX_TOKEN_REFRESH_INTERVAL_SECONDS: u32 = 24 * 60 * 60;
const MAX_SCHEDULE_INTERVAL_SECONDS: u32 = 24 * 60 * 60;
const SETTINGS_FILE_NAME: &str = "settings.json";

pub(crate) const ENV_LISTEN: &str = "ACCOUNT_POOL_LISTEN";
pub(crate) const ENV_ACCOUNT_SOURCE: &str = "ACCOUNT_POOL_ACCOUNT_SOURCE";
pub(crate) const ENV_CONTROL_API: &str = "ACCOUNT_POOL_CONTROL_API";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSourceMode {
    /// Registry is read in-process from the shared store.
    Local,
    /// Registry is reached through the control API over HTTP.
    Remote,
}

impl Default for AccountSourceMode {
    fn default() -> Self {
        Self::Local
    }
}

impl AccountSourceMode {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub schema_version: u32,
    // Control API listen address (host, host:port or [ipv6]:port).
    pub listen_address: String,
    pub account_source: AccountSourceMode,
    pub control_api_base_url: String,
    pub control_api_timeout_seconds: u32,
    // Interception matching.
    pub upstream_domain: String,
    pub telemetry_hosts: Vec<String>,
    pub agent_path: String,
    pub settings_sync_path: String,
    pub settings_sync_operation: String,
    pub experiment_id_header: String,
    pub token_refresh_interval_seconds: u32,
    pub schedule_interval_seconds: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            account_source: AccountSourceMode::Local,
            control_api_base_url: DEFAULT_CONTROL_API_BASE_URL.to_string(),
            control_api_timeout_seconds: DEFAULT_CONTROL_API_TIMEOUT_SECONDS,
            upstream_domain: DEFAULT_UPSTREAM_DOMAIN.to_string(),
            telemetry_hosts: vec![DEFAULT_TELEMETRY_HOST.to_string()],
            agent_path: DEFAULT_AGENT_PATH.to_string(),
            settings_sync_path: DEFAULT_SETTINGS_SYNC_PATH.to_string(),
            settings_sync_operation: DEFAULT_SETTINGS_SYNC_OPERATION.to_string(),
            experiment_id_header: DEFAULT_EXPERIMENT_ID_HEADER.to_string(),
            token_refresh_interval_seconds: DEFAULT_TOKEN_REFRESH_INTERVAL_SECONDS,
            schedule_interval_seconds: DEFAULT_SCHEDULE_INTERVAL_SECONDS,
        }
    }
}

fn sanitize_text_or_default(value: &mut String, default: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        *value = default.to_string();
        return true;
    }
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
        return true;
    }
    false
}

fn sanitize_seconds(value: &mut u32, default: u32, max: u32) -> bool {
    if *value == 0 {
        *value = default;
        return true;
    }
    if *value > max {
        *value = max;
        return true;
    }
    false
}

fn sanitize_paths(settings: &mut AppSettings) -> bool {
    let mut changed = false;
    for (value, default) in [
        (&mut settings.agent_path, DEFAULT_AGENT_PATH),
        (&mut settings.settings_sync_path, DEFAULT_SETTINGS_SYNC_PATH),
    ] {
        changed |= sanitize_text_or_default(value, default);
        if !value.starts_with('/') {
            value.insert(0, '/');
            changed = true;
        }
    }
    changed
}

fn sanitize_telemetry_hosts(settings: &mut AppSettings) -> bool {
    let normalized: Vec<String> = settings
        .telemetry_hosts
        .iter()
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .fold(Vec::new(), |mut acc, host| {
            if !acc.contains(&host) {
                acc.push(host);
            }
            acc
        });
    if normalized != settings.telemetry_hosts {
        settings.telemetry_hosts = normalized;
        return true;
    }
    false
}

fn sanitize_control_api_base_url(settings: &mut AppSettings) -> bool {
    let mut changed =
        sanitize_text_or_default(&mut settings.control_api_base_url, DEFAULT_CONTROL_API_BASE_URL);
    while settings.control_api_base_url.ends_with('/') {
        settings.control_api_base_url.pop();
        changed = true;
    }
    changed
}

/// Repairs out-of-range or blank values in place; returns whether anything changed.
pub(crate) fn sanitize(settings: &mut AppSettings) -> bool {
    let mut changed = false;
    if settings.schema_version != SCHEMA_VERSION {
        settings.schema_version = SCHEMA_VERSION;
        changed = true;
    }
    changed |= sanitize_text_or_default(&mut settings.listen_address, DEFAULT_LISTEN_ADDRESS);
    changed |= sanitize_control_api_base_url(settings);
    changed |= sanitize_seconds(
        &mut settings.control_api_timeout_seconds,
        DEFAULT_CONTROL_API_TIMEOUT_SECONDS,
        MAX_CONTROL_API_TIMEOUT_SECONDS,
    );
    changed |= sanitize_text_or_default(&mut settings.upstream_domain, DEFAULT_UPSTREAM_DOMAIN);
    let domain = settings.upstream_domain.to_ascii_lowercase();
    if domain != settings.upstream_domain {
        settings.upstream_domain = domain;
        changed = true;
    }
    changed |= sanitize_telemetry_hosts(settings);
    changed |= sanitize_paths(settings);
    changed |= sanitize_text_or_default(
        &mut settings.settings_sync_operation,
        DEFAULT_SETTINGS_SYNC_OPERATION,
    );
    changed |= sanitize_text_or_default(
        &mut settings.experiment_id_header,
        DEFAULT_EXPERIMENT_ID_HEADER,
    );
    changed |= sanitize_seconds(
        &mut settings.token_refresh_interval_seconds,
        DEFAULT_TOKEN_REFRESH_INTERVAL_SECONDS,
        MAX_TOKEN_REFRESH_INTERVAL_SECONDS,
    );
    changed |= sanitize_seconds(
        &mut settings.schedule_interval_seconds,
        DEFAULT_SCHEDULE_INTERVAL_SECONDS,
        MAX_SCHEDULE_INTERVAL_SECONDS,
    );
    changed
}

/// Applies `ACCOUNT_POOL_*` overrides. These never get written back to settings.json.
pub(crate) fn apply_env_overrides(
    settings: &mut AppSettings,
    get: impl Fn(&str) -> Option<String>,
) -> AppResult<()> {
    if let Some(listen) = get(ENV_LISTEN).filter(|v| !v.trim().is_empty()) {
        settings.listen_address = listen.trim().to_string();
    }
    if let Some(raw) = get(ENV_ACCOUNT_SOURCE).filter(|v| !v.trim().is_empty()) {
        settings.account_source = AccountSourceMode::parse(&raw).ok_or_else(|| {
            format!("SEC_INVALID_INPUT: {ENV_ACCOUNT_SOURCE} must be 'local' or 'remote', got '{raw}'")
        })?;
    }
    if let Some(url) = get(ENV_CONTROL_API).filter(|v| !v.trim().is_empty()) {
        settings.control_api_base_url = url.trim().trim_end_matches('/').to_string();
    }
    Ok(())
}

pub(crate) fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE_NAME)
}

/// Reads settings.json, creating it with defaults on first run and persisting any repairs.
pub fn read(data_dir: &Path) -> AppResult<AppSettings> {
    let path = settings_path(data_dir);

    if !path.exists() {
        let settings = AppSettings::default();
        // Best-effort: create default settings.json on first read to make the config discoverable/editable.
        if let Err(err) = write(data_dir, &settings) {
            tracing::warn!(path = %path.display(), "failed to create default settings: {}", err);
        }
        return Ok(settings);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("SYSTEM_ERROR: failed to read settings: {e}"))?;
    let mut settings: AppSettings = serde_json::from_str(&content)
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid settings.json: {e}"))?;

    if sanitize(&mut settings) {
        tracing::info!(path = %path.display(), "settings.json 已修正非法值");
        // Best-effort: persist repaired values while keeping read semantics.
        if let Err(err) = write(data_dir, &settings) {
            tracing::warn!(path = %path.display(), "failed to persist repaired settings: {}", err);
        }
    }

    Ok(settings)
}

pub fn write(data_dir: &Path, settings: &AppSettings) -> AppResult<AppSettings> {
    let mut settings = settings.clone();
    sanitize(&mut settings);

    let path = settings_path(data_dir);
    let tmp_path = path.with_file_name("settings.json.tmp");
    let backup_path = path.with_file_name("settings.json.bak");

    let content = serde_json::to_vec_pretty(&settings)
        .map_err(|e| format!("failed to serialize settings: {e}"))?;

    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("SYSTEM_ERROR: failed to write temp settings file: {e}"))?;

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    if path.exists() {
        std::fs::rename(&path, &backup_path)
            .map_err(|e| format!("SYSTEM_ERROR: failed to create settings backup: {e}"))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::rename(&backup_path, &path);
        return Err(format!("SYSTEM_ERROR: failed to finalize settings: {e}").into());
    }

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_already_sane() {
        let mut settings = AppSettings::default();
        assert!(!sanitize(&mut settings));
    }

    #[test]
    fn sanitize_repairs_blank_and_out_of_range_values() {
        let mut settings = AppSettings {
            listen_address: "  ".to_string(),
            control_api_base_url: "http://10.0.0.2:9000///".to_string(),
            control_api_timeout_seconds: 0,
            upstream_domain: "Example.COM".to_string(),
            telemetry_hosts: vec![
                " Telemetry.example.com ".to_string(),
                "telemetry.example.com".to_string(),
                "".to_string(),
            ],
            agent_path: "ai/agent".to_string(),
            token_refresh_interval_seconds: u32::MAX,
            ..AppSettings::default()
        };

        assert!(sanitize(&mut settings));
        assert_eq!(settings.listen_address, DEFAULT_LISTEN_ADDRESS);
        assert_eq!(settings.control_api_base_url, "http://10.0.0.2:9000");
        assert_eq!(
            settings.control_api_timeout_seconds,
            DEFAULT_CONTROL_API_TIMEOUT_SECONDS
        );
        assert_eq!(settings.upstream_domain, "example.com");
        assert_eq!(settings.telemetry_hosts, vec!["telemetry.example.com"]);
        assert_eq!(settings.agent_path, "/ai/agent");
        assert_eq!(
            settings.token_refresh_interval_seconds,
            MAX_TOKEN_REFRESH_INTERVAL_SECONDS
        );
    }

    #[test]
    fn env_overrides_replace_listen_source_and_control_api() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_LISTEN, "0.0.0.0:9999"),
            (ENV_ACCOUNT_SOURCE, "Remote"),
            (ENV_CONTROL_API, "http://pool.internal:8888/"),
        ]);
        let mut settings = AppSettings::default();
        apply_env_overrides(&mut settings, |key| vars.get(key).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(settings.listen_address, "0.0.0.0:9999");
        assert_eq!(settings.account_source, AccountSourceMode::Remote);
        assert_eq!(settings.control_api_base_url, "http://pool.internal:8888");
    }

    #[test]
    fn env_override_rejects_unknown_account_source() {
        let mut settings = AppSettings::default();
        let err = apply_env_overrides(&mut settings, |key| {
            (key == ENV_ACCOUNT_SOURCE).then(|| "carrier-pigeon".to_string())
        })
        .expect_err("should reject");
        assert_eq!(err.code(), "SEC_INVALID_INPUT");
    }

    #[test]
    fn read_creates_defaults_then_round_trips_edits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = read(dir.path()).expect("first read");
        assert_eq!(settings, AppSettings::default());
        assert!(settings_path(dir.path()).exists());

        let edited = AppSettings {
            upstream_domain: "api.example.com".to_string(),
            ..settings
        };
        write(dir.path(), &edited).expect("write");
        assert_eq!(read(dir.path()).expect("reread").upstream_domain, "api.example.com");
    }

    #[test]
    fn read_fills_missing_fields_and_persists_repairs() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            settings_path(dir.path()),
            r#"{"listen_address":"127.0.0.1:7001","schedule_interval_seconds":0}"#,
        )
        .expect("seed settings");

        let settings = read(dir.path()).expect("read");
        assert_eq!(settings.listen_address, "127.0.0.1:7001");
        assert_eq!(
            settings.schedule_interval_seconds,
            DEFAULT_SCHEDULE_INTERVAL_SECONDS
        );
        assert_eq!(settings.agent_path, DEFAULT_AGENT_PATH);

        let raw = std::fs::read_to_string(settings_path(dir.path())).expect("read back");
        assert!(raw.contains("\"schema_version\": 1"));
    }

    #[test]
    fn read_rejects_malformed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(settings_path(dir.path()), "{not json").expect("seed");
        let err = read(dir.path()).expect_err("should fail");
        assert_eq!(err.code(), "SEC_INVALID_INPUT");
    }
}
