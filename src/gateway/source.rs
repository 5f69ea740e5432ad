//! Usage: `AccountSource` seam between the interception pipeline and the account registry.

use crate::domain::accounts::{Account, AccountRegistry, AccountSummary};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The `(email, token)` pair injected into upstream requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCredential {
    pub email: String,
    pub token: String,
}

impl From<Account> for ActiveCredential {
    fn from(acc: Account) -> Self {
        Self {
            email: acc.email,
            token: acc.token,
        }
    }
}

#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Effective active account; `ACCOUNT_NOT_FOUND` when none is eligible or it has no token.
    async fn active_account(&self) -> AppResult<ActiveCredential>;

    /// Rotates to the next eligible account and makes it active.
    async fn switch_account(&self) -> AppResult<ActiveCredential>;

    async fn ban_account(&self, email: &str) -> AppResult<()>;

    async fn list_accounts(&self) -> AppResult<Vec<AccountSummary>>;

    /// True when the source writes the active credential keys itself (under the registry's
    /// write lock); the pipeline must then never write them.
    fn owns_credential_slot(&self) -> bool {
        false
    }
}

/// Talks to the registry in-process.
pub struct LocalAccountSource {
    registry: Arc<AccountRegistry>,
}

impl LocalAccountSource {
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl AccountSource for LocalAccountSource {
    async fn active_account(&self) -> AppResult<ActiveCredential> {
        let registry = Arc::clone(&self.registry);
        blocking::run("active_account", move || registry.pin_active_account())
            .await
            .map(ActiveCredential::from)
    }

    async fn switch_account(&self) -> AppResult<ActiveCredential> {
        let registry = Arc::clone(&self.registry);
        blocking::run("switch_account", move || registry.switch_next())
            .await
            .map(ActiveCredential::from)
    }

    async fn ban_account(&self, email: &str) -> AppResult<()> {
        let registry = Arc::clone(&self.registry);
        let email = email.to_string();
        blocking::run("ban_account", move || registry.ban(Some(email.as_str())))
            .await
            .map(|_| ())
    }

    async fn list_accounts(&self) -> AppResult<Vec<AccountSummary>> {
        let registry = Arc::clone(&self.registry);
        blocking::run("list_accounts", move || registry.summaries()).await
    }

    fn owns_credential_slot(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::kv_store::MemoryKvStore;
    use crate::shared::error::ErrorKind;

    fn source_with(accounts: &[(&str, &str)]) -> (Arc<AccountRegistry>, LocalAccountSource) {
        let registry = Arc::new(AccountRegistry::new(Arc::new(MemoryKvStore::new())));
        for (email, token) in accounts {
            registry
                .upsert(Some(*email), Some(*token))
                .expect("seed account");
        }
        let source = LocalAccountSource::new(Arc::clone(&registry));
        (registry, source)
    }

    #[tokio::test]
    async fn local_source_switch_then_ban() {
        let (registry, source) = source_with(&[("a@x", "ta"), ("b@x", "tb")]);
        registry.activate(Some("a@x")).expect("activate");

        let next = source.switch_account().await.expect("switch");
        assert_eq!(next.email, "b@x");
        assert_eq!(source.active_account().await.expect("active").token, "tb");

        source.ban_account("b@x").await.expect("ban");
        let next = source.switch_account().await.expect("switch back");
        assert_eq!(next.email, "a@x");

        let err = source.switch_account().await.expect_err("no candidate left");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn local_source_lists_summaries() {
        let (_registry, source) = source_with(&[("a@x", "ta")]);
        let rows = source.list_accounts().await.expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].has_token, 1);
    }

    #[tokio::test]
    async fn local_source_pins_the_fallback_account() {
        let (registry, source) = source_with(&[("a@x", "ta"), ("b@x", "tb")]);
        assert!(source.owns_credential_slot());
        assert_eq!(registry.active_email().expect("pointer"), None);

        let active = source.active_account().await.expect("active");
        assert_eq!(active.email, "a@x");
        assert_eq!(
            registry.active_email().expect("pointer").as_deref(),
            Some("a@x")
        );
    }
}
