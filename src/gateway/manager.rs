use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::listen::{self, ParsedListenAddress};
use super::routes::build_router;
use super::GatewayStatus;
use crate::domain::accounts::AccountRegistry;
use crate::shared::error::{AppError, AppResult};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct RunningGateway {
    port: u16,
    base_url: String,
    listen_addr: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

type RunningGatewayHandles = (oneshot::Sender<()>, JoinHandle<()>);

/// Owns the control API server task. `start` must be called from within a tokio runtime.
#[derive(Default)]
pub struct GatewayManager {
    running: Option<RunningGateway>,
}

fn bind_listener(parsed: &ParsedListenAddress) -> AppResult<std::net::TcpListener> {
    let std_listener =
        std::net::TcpListener::bind((parsed.host.as_str(), parsed.port)).map_err(|e| {
            AppError::new(
                "GW_BIND_FAILED",
                format!("failed to bind {}: {e}", parsed.bind_addr()),
            )
        })?;
    std_listener
        .set_nonblocking(true)
        .map_err(|e| AppError::new("GW_BIND_FAILED", format!("set_nonblocking failed: {e}")))?;
    Ok(std_listener)
}

impl GatewayManager {
    pub fn status(&self) -> GatewayStatus {
        match &self.running {
            Some(r) => GatewayStatus {
                running: true,
                port: Some(r.port),
                base_url: Some(r.base_url.clone()),
                listen_addr: Some(r.listen_addr.clone()),
            },
            None => GatewayStatus {
                running: false,
                port: None,
                base_url: None,
                listen_addr: None,
            },
        }
    }

    pub fn start(
        &mut self,
        listen_address: &str,
        registry: Arc<AccountRegistry>,
    ) -> AppResult<GatewayStatus> {
        if self.running.is_some() {
            return Ok(self.status());
        }

        let parsed = listen::parse_listen_address(listen_address)?;
        let std_listener = bind_listener(&parsed)?;
        let bind_addr = std_listener
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], parsed.port)));
        // Port 0 resolves to whatever the OS handed out.
        let port = bind_addr.port();

        let listen_addr = listen::format_host_port(&parsed.host, port);
        let base_host = if listen::is_wildcard_host(&parsed.host) {
            "127.0.0.1".to_string()
        } else {
            parsed.host.clone()
        };
        let base_url = format!("http://{}", listen::format_host_port(&base_host, port));

        let app = build_router(registry);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::from_std(std_listener) {
                Ok(l) => l,
                Err(err) => {
                    tracing::error!(bind_addr = %bind_addr, "控制接口监听器初始化失败: {}", err);
                    return;
                }
            };

            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

            if let Err(err) = serve.await {
                tracing::error!(bind_addr = %bind_addr, "控制接口服务器运行错误: {}", err);
            }
        });

        tracing::info!(listen_addr = %listen_addr, base_url = %base_url, "控制接口已启动");

        self.running = Some(RunningGateway {
            port,
            base_url,
            listen_addr,
            shutdown: shutdown_tx,
            task,
        });

        Ok(self.status())
    }

    pub fn take_running(&mut self) -> Option<RunningGatewayHandles> {
        self.running.take().map(|r| (r.shutdown, r.task))
    }

    /// Signals graceful shutdown and waits (bounded) for the server task to finish.
    pub async fn stop(&mut self) -> GatewayStatus {
        if let Some((shutdown, task)) = self.take_running() {
            let _ = shutdown.send(());
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(())) => tracing::info!("控制接口已停止"),
                Ok(Err(err)) => tracing::warn!("控制接口任务异常结束: {}", err),
                Err(_) => tracing::warn!("控制接口停止超时"),
            }
        }
        self.status()
    }
}
