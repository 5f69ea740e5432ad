//! Usage: Account pool with rotation, a local control API, and a credential interception
//! pipeline that fails over between accounts on 401/403 responses.

mod app;
mod domain;
mod gateway;
mod infra;
mod shared;
pub mod test_support;

pub use app::app_state::AppState;
pub use app::run;
pub use domain::accounts::{
    Account, AccountDetail, AccountRegistry, AccountSummary, HealthStatus, RegistryStats,
    UpsertOutcome, ACCOUNTS_KEY, ACTIVE_EMAIL_KEY, ACTIVE_TOKEN_KEY, LAST_REFRESH_KEY,
    SETTINGS_CACHE_KEY,
};
pub use gateway::intercept::{
    InterceptConfig, InterceptedRequest, InterceptedResponse, Interceptor, RequestOutcome,
    SyntheticResponse,
};
pub use gateway::source::{AccountSource, ActiveCredential, LocalAccountSource};
pub use gateway::{build_router, GatewayManager, GatewayStatus};
pub use infra::control_client::RemoteAccountSource;
pub use infra::kv_store::{KvStore, MemoryKvStore, SqliteKvStore};
pub use infra::settings::{AccountSourceMode, AppSettings};
pub use shared::error::{AppError, AppResult, ErrorKind};
