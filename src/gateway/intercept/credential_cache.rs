//! Usage: Locally cached active credential, refresh marker and settings cache (all in the `KvStore`).

use crate::domain::accounts::{
    ACTIVE_EMAIL_KEY, ACTIVE_TOKEN_KEY, LAST_REFRESH_KEY, SETTINGS_CACHE_KEY,
};
use crate::gateway::source::ActiveCredential;
use crate::infra::kv_store::KvStore;
use crate::shared::blocking;
use crate::shared::error::AppResult;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct CredentialCache {
    store: Arc<dyn KvStore>,
}

impl CredentialCache {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Cached credential, or `None` when either half is missing.
    pub(crate) async fn load(&self) -> AppResult<Option<ActiveCredential>> {
        let store = Arc::clone(&self.store);
        blocking::run("credential_cache_load", move || -> AppResult<Option<ActiveCredential>> {
            let email = store.read(ACTIVE_EMAIL_KEY)?.unwrap_or_default();
            let token = store.read(ACTIVE_TOKEN_KEY)?.unwrap_or_default();
            if email.is_empty() || token.is_empty() {
                return Ok(None);
            }
            Ok(Some(ActiveCredential { email, token }))
        })
        .await
    }

    pub(crate) async fn save(&self, credential: &ActiveCredential) -> AppResult<()> {
        let store = Arc::clone(&self.store);
        let credential = credential.clone();
        blocking::run("credential_cache_save", move || {
            store.write(ACTIVE_EMAIL_KEY, &credential.email)?;
            store.write(ACTIVE_TOKEN_KEY, &credential.token)
        })
        .await
    }

    pub(crate) async fn clear(&self) -> AppResult<()> {
        let store = Arc::clone(&self.store);
        blocking::run("credential_cache_clear", move || {
            store.write(ACTIVE_EMAIL_KEY, "")?;
            store.write(ACTIVE_TOKEN_KEY, "")
        })
        .await
    }

    pub(crate) async fn last_refresh(&self) -> AppResult<Option<i64>> {
        let store = Arc::clone(&self.store);
        let raw =
            blocking::run("refresh_marker_read", move || store.read(LAST_REFRESH_KEY)).await?;
        Ok(raw.and_then(|v| v.trim().parse::<i64>().ok()))
    }

    pub(crate) async fn mark_refreshed(&self, now_unix: i64) -> AppResult<()> {
        let store = Arc::clone(&self.store);
        blocking::run("refresh_marker_write", move || {
            store.write(LAST_REFRESH_KEY, &now_unix.to_string())
        })
        .await
    }

    pub(crate) async fn settings_cache(&self) -> AppResult<Option<String>> {
        let store = Arc::clone(&self.store);
        let raw =
            blocking::run("settings_cache_read", move || store.read(SETTINGS_CACHE_KEY)).await?;
        Ok(raw.filter(|v| !v.trim().is_empty()))
    }
}

/// Whether the refresh interval has elapsed since `last` (a missing marker is always due).
pub(crate) fn refresh_due(last: Option<i64>, now_unix: i64, interval_secs: i64) -> bool {
    let Some(last) = last else {
        return true;
    };
    now_unix.saturating_sub(last) >= interval_secs.max(1)
}
