//! Usage: Interception pipeline (credential injection on requests, failover on responses, scheduled tick).

mod credential_cache;
mod experiment_id;
mod settings_replay;
mod types;

pub use types::{InterceptedRequest, InterceptedResponse, RequestOutcome, SyntheticResponse};

use crate::gateway::source::{AccountSource, ActiveCredential};
use crate::infra::kv_store::KvStore;
use crate::infra::settings::AppSettings;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use crate::shared::security::mask_token;
use crate::shared::time::now_unix_seconds;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use credential_cache::{refresh_due, CredentialCache};
use std::sync::Arc;

/// Matching rules and cadence for the pipeline, derived from `AppSettings`.
#[derive(Debug, Clone)]
pub struct InterceptConfig {
    pub upstream_domain: String,
    pub telemetry_hosts: Vec<String>,
    pub agent_path: String,
    pub settings_sync_path: String,
    pub settings_sync_operation: String,
    pub experiment_id_header: HeaderName,
    pub token_refresh_interval_secs: i64,
}

impl InterceptConfig {
    pub fn from_settings(settings: &AppSettings) -> AppResult<Self> {
        let experiment_id_header =
            HeaderName::from_bytes(settings.experiment_id_header.trim().as_bytes()).map_err(
                |e| {
                    AppError::invalid_input(format!(
                        "invalid experiment_id_header '{}': {e}",
                        settings.experiment_id_header
                    ))
                },
            )?;
        Ok(Self {
            upstream_domain: settings.upstream_domain.trim().to_ascii_lowercase(),
            telemetry_hosts: settings
                .telemetry_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            agent_path: settings.agent_path.clone(),
            settings_sync_path: settings.settings_sync_path.clone(),
            settings_sync_operation: settings.settings_sync_operation.clone(),
            experiment_id_header,
            token_refresh_interval_secs: i64::from(settings.token_refresh_interval_seconds),
        })
    }
}

/// `host` equals `domain` or is one of its subdomains.
pub(crate) fn host_matches(host: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

pub struct Interceptor {
    config: InterceptConfig,
    source: Arc<dyn AccountSource>,
    cache: CredentialCache,
}

impl Interceptor {
    /// `store` holds the cached credential, the refresh marker and the settings cache.
    pub fn new(
        config: InterceptConfig,
        source: Arc<dyn AccountSource>,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            config,
            source,
            cache: CredentialCache::new(store),
        }
    }

    fn is_telemetry_host(&self, host: &str) -> bool {
        self.config
            .telemetry_hosts
            .iter()
            .any(|t| host_matches(host, t))
    }

    fn is_upstream_host(&self, host: &str) -> bool {
        host_matches(host, &self.config.upstream_domain)
    }

    pub async fn on_request(&self, mut req: InterceptedRequest) -> RequestOutcome {
        let Some(host) = req.host() else {
            return RequestOutcome::Forward(req);
        };

        // Telemetry collectors live outside the upstream domain, so they are checked first.
        if self.is_telemetry_host(&host) {
            tracing::info!(host = %host, url = %req.url, "阻止遥测请求");
            return RequestOutcome::Respond(SyntheticResponse::no_content());
        }
        if !self.is_upstream_host(&host) {
            return RequestOutcome::Forward(req);
        }

        tracing::debug!(method = %req.method, url = %req.url, "upstream 请求");

        match self.current_credential().await {
            Some(credential) => self.inject_authorization(&mut req, &credential),
            None => tracing::warn!(url = %req.url, "未找到活跃 token，无法替换 Authorization"),
        }

        if req.headers.contains_key(&self.config.experiment_id_header) {
            let fresh = experiment_id::generate_experiment_id();
            match HeaderValue::from_str(&fresh) {
                Ok(value) => {
                    req.headers
                        .insert(self.config.experiment_id_header.clone(), value);
                    tracing::debug!("Experiment ID 已随机化");
                }
                Err(err) => tracing::warn!("Experiment ID 随机化失败: {}", err),
            }
        }

        self.refresh_if_due().await;

        RequestOutcome::Forward(req)
    }

    fn inject_authorization(&self, req: &mut InterceptedRequest, credential: &ActiveCredential) {
        let bearer = format!("Bearer {}", credential.token);
        let value = match HeaderValue::from_str(&bearer) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(email = %credential.email, "token 不是合法的 header 值: {}", err);
                return;
            }
        };
        let previous = req.headers.insert(header::AUTHORIZATION, value);
        if previous.as_ref().is_some_and(|old| old.as_bytes() == bearer.as_bytes()) {
            tracing::warn!(email = %credential.email, "新旧 token 相同");
        } else {
            tracing::info!(
                email = %credential.email,
                token = %mask_token(&credential.token),
                "Authorization 已替换"
            );
        }
    }

    /// Cached credential, falling back to the account source (and caching its answer).
    async fn current_credential(&self) -> Option<ActiveCredential> {
        match self.cache.load().await {
            Ok(Some(credential)) => return Some(credential),
            Ok(None) => {}
            Err(err) => tracing::warn!("读取本地凭据缓存失败: {}", err),
        }
        self.resolve_from_source().await
    }

    async fn resolve_from_source(&self) -> Option<ActiveCredential> {
        match self.source.active_account().await {
            Ok(credential) => {
                self.remember(&credential).await;
                tracing::info!(email = %credential.email, "加载活跃账号");
                Some(credential)
            }
            Err(err) => {
                log_source_error("获取活跃账号失败", &err);
                None
            }
        }
    }

    /// Caches `credential` unless the source already keeps those keys current.
    async fn remember(&self, credential: &ActiveCredential) {
        if self.source.owns_credential_slot() {
            return;
        }
        if let Err(err) = self.cache.save(credential).await {
            tracing::warn!("写入本地凭据缓存失败: {}", err);
        }
    }

    async fn refresh_if_due(&self) {
        let now = now_unix_seconds();
        let last = match self.cache.last_refresh().await {
            Ok(last) => last,
            Err(err) => {
                tracing::warn!("读取刷新时间失败: {}", err);
                None
            }
        };
        if !refresh_due(last, now, self.config.token_refresh_interval_secs) {
            return;
        }
        tracing::info!("Token 检查时间到，刷新中");
        self.resolve_from_source().await;
        self.record_refresh(now).await;
    }

    async fn record_refresh(&self, now: i64) {
        if let Err(err) = self.cache.mark_refreshed(now).await {
            tracing::warn!("记录刷新时间失败: {}", err);
        }
    }

    pub async fn on_response(
        &self,
        req: &InterceptedRequest,
        mut resp: InterceptedResponse,
    ) -> InterceptedResponse {
        let Some(host) = req.host() else {
            return resp;
        };
        if !self.is_upstream_host(&host) {
            return resp;
        }

        tracing::debug!(status = resp.status.as_u16(), url = %req.url, "upstream 响应");

        if settings_replay::is_settings_sync(
            req,
            resp.status,
            &self.config.settings_sync_path,
            &self.config.settings_sync_operation,
        ) {
            match self.cache.settings_cache().await {
                Ok(Some(cached)) => {
                    settings_replay::replay_settings(&mut resp, cached);
                    tracing::info!("使用缓存的 settings 替换响应");
                }
                Ok(None) => {}
                Err(err) => tracing::warn!("读取 settings 缓存失败: {}", err),
            }
        }

        if resp.status == StatusCode::FORBIDDEN && req.url.path().starts_with(&self.config.agent_path)
        {
            tracing::warn!(url = %req.url, "检测到 403, 当前账号已被 ban");
            self.ban_active_and_switch().await;
        } else if resp.status == StatusCode::UNAUTHORIZED {
            tracing::info!(url = %req.url, "收到 401 响应，尝试切换账号");
            self.switch_and_cache().await;
        }

        resp
    }

    async fn ban_active_and_switch(&self) {
        let Some(active) = self.current_credential().await else {
            tracing::warn!("没有可 ban 的活跃账号");
            return;
        };
        match self.source.ban_account(&active.email).await {
            Ok(()) => {
                tracing::warn!(email = %active.email, "账号已标记为 banned");
                if !self.source.owns_credential_slot() {
                    if let Err(err) = self.cache.clear().await {
                        tracing::warn!("清除本地凭据缓存失败: {}", err);
                    }
                }
            }
            Err(err) => log_source_error("标记 ban 失败", &err),
        }
        self.switch_and_cache().await;
    }

    /// Switch-and-activate; on failure the cached credential is left as it was.
    async fn switch_and_cache(&self) -> Option<ActiveCredential> {
        match self.source.switch_account().await {
            Ok(credential) => {
                self.remember(&credential).await;
                tracing::info!(email = %credential.email, "切换到账号");
                Some(credential)
            }
            Err(err) => {
                log_source_error("切换账号失败", &err);
                None
            }
        }
    }

    /// Periodic check: make sure an active credential is cached, reloading the account list
    /// from the source when none can be resolved.
    pub async fn on_schedule(&self) {
        tracing::debug!("定时检查 token 有效性");
        let now = now_unix_seconds();

        match self.current_credential().await {
            Some(credential) => {
                tracing::info!(email = %credential.email, "当前活跃账号");
            }
            None => {
                tracing::warn!("未找到活跃账号，尝试重新加载");
                match self.source.list_accounts().await {
                    Ok(accounts) => tracing::info!(count = accounts.len(), "已重新加载账号列表"),
                    Err(err) => log_source_error("获取账号列表失败", &err),
                }
                if let Some(credential) = self.resolve_from_source().await {
                    tracing::info!(email = %credential.email, "当前活跃账号");
                }
            }
        }

        self.record_refresh(now).await;
    }
}

fn log_source_error(context: &str, err: &AppError) {
    match err.kind() {
        ErrorKind::NotFound => tracing::warn!(code = err.code(), "{context}: {}", err.message()),
        _ => tracing::error!(code = err.code(), "{context}: {}", err.message()),
    }
}
