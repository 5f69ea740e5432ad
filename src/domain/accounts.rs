//! Usage: Account registry (durable account list + active pointer over a `KvStore`).

use crate::domain::rotation;
use crate::infra::kv_store::KvStore;
use crate::shared::error::{db_err, AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::mask_token;
use crate::shared::time::{format_timestamp, now_local};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::{Arc, Mutex};

pub const ACCOUNTS_KEY: &str = "account_pool_accounts";
pub const ACTIVE_EMAIL_KEY: &str = "account_pool_active_email";
pub const ACTIVE_TOKEN_KEY: &str = "account_pool_active_token";
pub const SETTINGS_CACHE_KEY: &str = "account_pool_settings_cache";
pub const LAST_REFRESH_KEY: &str = "account_pool_last_token_check";

const STATUS_HEALTHY: &str = "healthy";
const STATUS_BANNED: &str = "banned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Banned,
}

impl HealthStatus {
    pub(crate) fn parse_lossy(raw: &str) -> Self {
        Self::parse_strict(raw).unwrap_or(Self::Healthy)
    }

    pub(crate) fn parse_strict(raw: &str) -> Option<Self> {
        match raw.trim() {
            STATUS_HEALTHY => Some(Self::Healthy),
            STATUS_BANNED => Some(Self::Banned),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => STATUS_HEALTHY,
            Self::Banned => STATUS_BANNED,
        }
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HealthStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse_lossy).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub health_status: HealthStatus,
    #[serde(default, with = "crate::shared::time::local_timestamp")]
    pub last_updated: Option<NaiveDateTime>,
}

impl Account {
    pub fn is_banned(&self) -> bool {
        self.health_status == HealthStatus::Banned
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    pub(crate) fn last_used(&self) -> Option<String> {
        self.last_updated.as_ref().map(format_timestamp)
    }
}

/// Row shape of `GET /accounts` (flags are 0/1 integers for compatibility with existing clients).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub email: String,
    pub is_active: u8,
    pub is_banned: u8,
    pub last_used: Option<String>,
    pub has_token: u8,
    pub health_status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDetail {
    pub email: String,
    pub token: String,
    pub is_active: u8,
    pub is_banned: u8,
    pub health_status: HealthStatus,
    pub last_used: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub banned: usize,
    pub available: usize,
    /// 1 when the active pointer is set (even if stale), else 0.
    pub active: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    TokenUpdated,
}

fn normalize_required(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

/// Owns the account list and the active pointer.
///
/// Every mutation is a read-modify-write of the whole list, serialized by `write_lock`.
pub struct AccountRegistry {
    store: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn list(&self) -> AppResult<Vec<Account>> {
        let Some(raw) = self.store.read(ACCOUNTS_KEY)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| db_err!("failed to decode account list: {e}"))
    }

    fn save(&self, accounts: &[Account]) -> AppResult<()> {
        let raw = serde_json::to_string(accounts)
            .map_err(|e| db_err!("failed to encode account list: {e}"))?;
        self.store.write(ACCOUNTS_KEY, &raw)
    }

    pub fn active_email(&self) -> AppResult<Option<String>> {
        Ok(self
            .store
            .read(ACTIVE_EMAIL_KEY)?
            .filter(|v| !v.is_empty()))
    }

    /// Points at `email` and mirrors its token into the shared credential slot.
    pub fn set_active_email(&self, email: &str) -> AppResult<()> {
        let token = self
            .list()?
            .into_iter()
            .find(|acc| acc.email == email)
            .map(|acc| acc.token)
            .unwrap_or_default();
        self.write_active(email, &token)
    }

    pub fn clear_active(&self) -> AppResult<()> {
        self.write_active("", "")
    }

    fn write_active(&self, email: &str, token: &str) -> AppResult<()> {
        self.store.write(ACTIVE_EMAIL_KEY, email)?;
        self.store.write(ACTIVE_TOKEN_KEY, token)
    }

    pub fn upsert(&self, email: Option<&str>, token: Option<&str>) -> AppResult<UpsertOutcome> {
        let (Some(email), Some(token)) = (normalize_required(email), normalize_required(token))
        else {
            return Err(AppError::invalid_input("缺少 email 或 token 参数"));
        };

        let _guard = self.write_lock.lock_or_recover();
        let mut accounts = self.list()?;
        let now = Some(now_local());
        let outcome = match accounts.iter_mut().find(|acc| acc.email == email) {
            Some(existing) => {
                existing.token = token.clone();
                existing.last_updated = now;
                UpsertOutcome::TokenUpdated
            }
            None => {
                accounts.push(Account {
                    email: email.clone(),
                    token: token.clone(),
                    health_status: HealthStatus::Healthy,
                    last_updated: now,
                });
                UpsertOutcome::Added
            }
        };
        self.save(&accounts)?;

        // Keep the shared credential slot in sync when the active account is re-keyed.
        if self.active_email()?.as_deref() == Some(email.as_str()) {
            self.write_active(&email, &token)?;
        }

        tracing::info!(
            email = %email,
            token = %mask_token(&token),
            outcome = ?outcome,
            "account upserted"
        );
        Ok(outcome)
    }

    pub fn ban(&self, email: Option<&str>) -> AppResult<String> {
        let email = normalize_required(email)
            .ok_or_else(|| AppError::invalid_input("缺少 email 参数"))?;

        let _guard = self.write_lock.lock_or_recover();
        let mut accounts = self.list()?;
        let target = accounts
            .iter_mut()
            .find(|acc| acc.email == email)
            .ok_or_else(|| AppError::not_found("账号不存在"))?;
        target.health_status = HealthStatus::Banned;
        self.save(&accounts)?;
        if self.active_email()?.as_deref() == Some(email.as_str()) {
            self.clear_active()?;
        }

        tracing::warn!(email = %email, "账号已标记为 banned");
        Ok(email)
    }

    pub fn delete(&self, email: Option<&str>) -> AppResult<String> {
        let email = normalize_required(email)
            .ok_or_else(|| AppError::invalid_input("缺少 email 参数"))?;

        let _guard = self.write_lock.lock_or_recover();
        let mut accounts = self.list()?;
        let before = accounts.len();
        accounts.retain(|acc| acc.email != email);
        let removed = accounts.len() != before;
        if removed {
            self.save(&accounts)?;
        }
        if self.active_email()?.as_deref() == Some(email.as_str()) {
            self.clear_active()?;
        }
        if !removed {
            return Err(AppError::not_found("账号不存在"));
        }

        tracing::info!(email = %email, "account deleted");
        Ok(email)
    }

    /// Activates a specific healthy account that has a token.
    pub fn activate(&self, email: Option<&str>) -> AppResult<Account> {
        let email = normalize_required(email)
            .ok_or_else(|| AppError::invalid_input("缺少 email 参数"))?;

        let _guard = self.write_lock.lock_or_recover();
        let mut accounts = self.list()?;
        let idx = accounts
            .iter()
            .position(|acc| acc.email == email && !acc.is_banned())
            .ok_or_else(|| AppError::not_found("账号不存在或已被 ban"))?;
        if !accounts[idx].has_token() {
            return Err(AppError::not_found("账号没有 token"));
        }
        self.promote(&mut accounts, idx)
    }

    /// Rotates to the oldest eligible account other than the current one.
    pub fn switch_next(&self) -> AppResult<Account> {
        let _guard = self.write_lock.lock_or_recover();
        let mut accounts = self.list()?;
        let current = self.active_email()?;
        let idx = rotation::select_next(&accounts, current.as_deref())
            .ok_or_else(|| AppError::not_found("没有可用的账号"))?;
        if !accounts[idx].has_token() {
            tracing::warn!(email = %accounts[idx].email, "下一个账号没有 token, 无法切换");
            return Err(AppError::not_found("下一个账号没有 token"));
        }
        let account = self.promote(&mut accounts, idx)?;
        tracing::info!(
            from = current.as_deref().unwrap_or(""),
            to = %account.email,
            "已切换账号"
        );
        Ok(account)
    }

    fn promote(&self, accounts: &mut [Account], idx: usize) -> AppResult<Account> {
        accounts[idx].last_updated = Some(now_local());
        let account = accounts[idx].clone();
        self.save(accounts)?;
        self.write_active(&account.email, &account.token)?;
        Ok(account)
    }

    /// Effective active account (read-only; the pointer is not rewritten on fallback).
    pub fn resolve_active_account(&self) -> AppResult<Account> {
        let accounts = self.list()?;
        let active = self.active_email()?;
        let idx = rotation::resolve_active(&accounts, active.as_deref())
            .ok_or_else(|| AppError::not_found("没有找到活跃账号"))?;
        let account = accounts[idx].clone();
        if !account.has_token() {
            return Err(AppError::not_found("活跃账号没有 token"));
        }
        Ok(account)
    }

    /// Resolves like `resolve_active_account`, then points at the result when the pointer is
    /// empty or stale. Runs under the write lock so a concurrent switch is never overwritten.
    pub fn pin_active_account(&self) -> AppResult<Account> {
        let _guard = self.write_lock.lock_or_recover();
        let account = self.resolve_active_account()?;
        if self.active_email()?.as_deref() != Some(account.email.as_str()) {
            self.write_active(&account.email, &account.token)?;
            tracing::info!(email = %account.email, "活跃指针已指向回退账号");
        }
        Ok(account)
    }

    /// Accounts for display, most recently used first (missing timestamps last).
    pub fn summaries(&self) -> AppResult<Vec<AccountSummary>> {
        let mut accounts = self.list()?;
        let active = self.active_email()?;
        accounts.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(accounts
            .into_iter()
            .map(|acc| AccountSummary {
                is_active: flag(active.as_deref() == Some(acc.email.as_str())),
                is_banned: flag(acc.is_banned()),
                last_used: acc.last_used(),
                has_token: flag(acc.has_token()),
                health_status: acc.health_status,
                email: acc.email,
            })
            .collect())
    }

    pub fn account_detail(&self, email: &str) -> AppResult<AccountDetail> {
        let active = self.active_email()?;
        let acc = self
            .list()?
            .into_iter()
            .find(|acc| acc.email == email)
            .ok_or_else(|| AppError::not_found("账号不存在"))?;
        Ok(AccountDetail {
            is_active: flag(active.as_deref() == Some(acc.email.as_str())),
            is_banned: flag(acc.is_banned()),
            health_status: acc.health_status,
            last_used: acc.last_used(),
            email: acc.email,
            token: acc.token,
        })
    }

    pub fn stats(&self) -> AppResult<RegistryStats> {
        let accounts = self.list()?;
        let banned = accounts.iter().filter(|acc| acc.is_banned()).count();
        Ok(RegistryStats {
            total: accounts.len(),
            banned,
            available: accounts.len() - banned,
            active: flag(self.active_email()?.is_some()),
        })
    }

    pub fn settings_cache(&self) -> AppResult<Option<String>> {
        Ok(self
            .store
            .read(SETTINGS_CACHE_KEY)?
            .filter(|v| !v.trim().is_empty()))
    }

    /// Stores `raw` verbatim after checking it is valid JSON.
    pub fn set_settings_cache(&self, raw: &str) -> AppResult<()> {
        serde_json::from_str::<serde_json::Value>(raw)
            .map_err(|e| AppError::invalid_input(format!("settings 缓存不是合法 JSON: {e}")))?;
        self.store.write(SETTINGS_CACHE_KEY, raw)
    }

    pub fn clear_settings_cache(&self) -> AppResult<()> {
        self.store.remove(SETTINGS_CACHE_KEY)
    }
}
