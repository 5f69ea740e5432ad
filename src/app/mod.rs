//! Usage: Process entry (settings, logging, store, control API, scheduled account check).

pub(crate) mod app_state;
pub(crate) mod logging;
pub(crate) mod refresh_ticker;

use crate::gateway::GatewayManager;
use crate::infra::{app_paths, settings};
use crate::shared::error::{AppError, AppResult};
use app_state::AppState;
use refresh_ticker::RefreshTicker;
use std::path::Path;
use std::time::Duration;

pub fn run() -> AppResult<()> {
    let data_dir = app_paths::data_dir()?;
    let _log_guard = logging::init(&app_paths::log_dir()?);

    // Payloads may carry account data; only the location is logged.
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(location = %location, "PANIC: application panicked at {location}");
    }));

    let mut cfg = settings::read(&data_dir)?;
    settings::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::new("SYSTEM_ERROR", format!("tokio runtime init failed: {e}")))?;

    let result = runtime.block_on(serve(&data_dir, cfg));
    if let Err(err) = &result {
        tracing::error!("启动失败: {}", err);
    }
    result
}

async fn serve(data_dir: &Path, cfg: settings::AppSettings) -> AppResult<()> {
    tracing::info!(
        data_dir = %data_dir.display(),
        version = env!("CARGO_PKG_VERSION"),
        "account-pool-hub 启动中"
    );

    let store = app_state::open_store(data_dir).await?;
    let state = AppState::new(cfg, store)?;

    let mut gateway = GatewayManager::default();
    // In remote mode another process owns the registry and serves the control API.
    if state.settings.account_source == settings::AccountSourceMode::Local {
        gateway.start(&state.settings.listen_address, state.registry.clone())?;
    }

    let ticker = RefreshTicker::spawn(
        state.interceptor.clone(),
        Duration::from_secs(u64::from(state.settings.schedule_interval_seconds)),
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("监听退出信号失败: {}", err);
    }
    tracing::info!("收到退出信号，正在停止");

    ticker.stop().await;
    gateway.stop().await;
    Ok(())
}
