//! Usage: Wires the store, registry, account source and interceptor from `AppSettings`.

use crate::domain::accounts::AccountRegistry;
use crate::gateway::intercept::{InterceptConfig, Interceptor};
use crate::gateway::source::{AccountSource, LocalAccountSource};
use crate::infra::control_client::RemoteAccountSource;
use crate::infra::kv_store::{KvStore, SqliteKvStore};
use crate::infra::settings::{AccountSourceMode, AppSettings};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub settings: AppSettings,
    pub store: Arc<dyn KvStore>,
    pub registry: Arc<AccountRegistry>,
    pub interceptor: Arc<Interceptor>,
}

impl AppState {
    pub fn new(settings: AppSettings, store: Arc<dyn KvStore>) -> AppResult<Self> {
        let registry = Arc::new(AccountRegistry::new(Arc::clone(&store)));
        let source = build_source(&settings, &registry, &store)?;
        let config = InterceptConfig::from_settings(&settings)?;
        let interceptor = Arc::new(Interceptor::new(config, source, Arc::clone(&store)));
        Ok(Self {
            settings,
            store,
            registry,
            interceptor,
        })
    }
}

fn build_source(
    settings: &AppSettings,
    registry: &Arc<AccountRegistry>,
    store: &Arc<dyn KvStore>,
) -> AppResult<Arc<dyn AccountSource>> {
    match settings.account_source {
        AccountSourceMode::Local => {
            tracing::info!("账号来源: 本地存储");
            Ok(Arc::new(LocalAccountSource::new(Arc::clone(registry))))
        }
        AccountSourceMode::Remote => {
            tracing::info!(base_url = %settings.control_api_base_url, "账号来源: 控制接口");
            let timeout = Duration::from_secs(u64::from(settings.control_api_timeout_seconds));
            Ok(Arc::new(RemoteAccountSource::new(
                &settings.control_api_base_url,
                timeout,
                Arc::clone(store),
            )?))
        }
    }
}

/// Opens (and migrates) the sqlite store off the async executor.
pub(crate) async fn open_store(data_dir: &Path) -> AppResult<Arc<dyn KvStore>> {
    let path = crate::infra::db::db_path(data_dir);
    let store = blocking::run("db_init", move || SqliteKvStore::open(&path)).await?;
    Ok(Arc::new(store))
}
