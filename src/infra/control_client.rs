//! Usage: HTTP client for the control API (`AccountSource` used when the pipeline runs out of process).

use crate::domain::accounts::AccountSummary;
use crate::gateway::source::{AccountSource, ActiveCredential};
use crate::infra::kv_store::KvStore;
use crate::shared::blocking;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const REMOTE_ACCOUNTS_KEY: &str = "account_pool_remote_accounts";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ControlReply {
    email: Option<String>,
    token: Option<String>,
    error: Option<String>,
    accounts: Option<Vec<AccountSummary>>,
}

pub struct RemoteAccountSource {
    client: reqwest::Client,
    base_url: String,
    snapshot_store: Arc<dyn KvStore>,
}

impl RemoteAccountSource {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        snapshot_store: Arc<dyn KvStore>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("account-pool-hub/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: control api client init failed: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            snapshot_store,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, label: &str, request: reqwest::RequestBuilder) -> AppResult<ControlReply> {
        let response = request.send().await.map_err(|e| {
            AppError::upstream_unavailable(format!("{label}: control api unreachable: {e}"))
                .with_source(e)
        })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            AppError::upstream_unavailable(format!("{label}: failed to read control api reply: {e}"))
                .with_source(e)
        })?;
        let parsed = serde_json::from_slice::<ControlReply>(&bytes);

        if status.is_success() {
            return parsed.map_err(|e| {
                AppError::upstream_unavailable(format!("{label}: invalid control api reply: {e}"))
            });
        }

        let detail = parsed
            .ok()
            .and_then(|reply| reply.error)
            .unwrap_or_else(|| status.to_string());
        Err(match status {
            StatusCode::NOT_FOUND => AppError::not_found(detail),
            StatusCode::BAD_REQUEST => AppError::invalid_input(detail),
            _ => AppError::upstream_unavailable(format!(
                "{label}: control api returned {status}: {detail}"
            )),
        })
    }

    fn credential_from(label: &str, reply: ControlReply) -> AppResult<ActiveCredential> {
        match (reply.email, reply.token) {
            (Some(email), Some(token)) if !email.is_empty() && !token.is_empty() => {
                Ok(ActiveCredential { email, token })
            }
            _ => Err(AppError::upstream_unavailable(format!(
                "{label}: control api reply is missing email or token"
            ))),
        }
    }

    async fn cached_snapshot(&self) -> AppResult<Option<Vec<AccountSummary>>> {
        let store = Arc::clone(&self.snapshot_store);
        let raw =
            blocking::run("remote_snapshot_read", move || store.read(REMOTE_ACCOUNTS_KEY)).await?;
        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    async fn store_snapshot(&self, accounts: &[AccountSummary]) -> AppResult<()> {
        let raw = serde_json::to_string(accounts)
            .map_err(|e| format!("failed to encode account snapshot: {e}"))?;
        let store = Arc::clone(&self.snapshot_store);
        blocking::run("remote_snapshot_write", move || {
            store.write(REMOTE_ACCOUNTS_KEY, &raw)
        })
        .await
    }
}

#[async_trait]
impl AccountSource for RemoteAccountSource {
    async fn active_account(&self) -> AppResult<ActiveCredential> {
        let reply = self
            .send("active_account", self.client.get(self.url("/active-account")))
            .await?;
        Self::credential_from("active_account", reply)
    }

    async fn switch_account(&self) -> AppResult<ActiveCredential> {
        let reply = self
            .send("switch_account", self.client.post(self.url("/switch-account")))
            .await?;
        Self::credential_from("switch_account", reply)
    }

    async fn ban_account(&self, email: &str) -> AppResult<()> {
        self.send(
            "ban_account",
            self.client
                .post(self.url("/ban-account"))
                .json(&serde_json::json!({ "email": email })),
        )
        .await
        .map(|_| ())
    }

    async fn list_accounts(&self) -> AppResult<Vec<AccountSummary>> {
        match self
            .send("list_accounts", self.client.get(self.url("/accounts")))
            .await
        {
            Ok(reply) => {
                let accounts = reply.accounts.unwrap_or_default();
                if let Err(err) = self.store_snapshot(&accounts).await {
                    tracing::warn!("账号快照缓存失败: {}", err);
                }
                tracing::info!(count = accounts.len(), "从控制接口加载了账号列表");
                Ok(accounts)
            }
            Err(err) if err.kind() == ErrorKind::UpstreamUnavailable => {
                match self.cached_snapshot().await? {
                    Some(cached) => {
                        tracing::warn!(
                            count = cached.len(),
                            "获取账号列表失败，使用本地缓存: {}",
                            err
                        );
                        Ok(cached)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}
