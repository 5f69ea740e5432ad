//! Usage: Periodic account check (`Interceptor::on_schedule`) on a fixed interval until shutdown.

use crate::gateway::intercept::Interceptor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub(crate) struct RefreshTicker {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshTicker {
    pub(crate) fn spawn(interceptor: Arc<Interceptor>, every: Duration) -> Self {
        let every = every.max(Duration::from_secs(1));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        tracing::info!(interval_s = every.as_secs(), "账号定时检查已启动");

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick is immediate; skip it so startup does not double up with the first request.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => interceptor.on_schedule().await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("账号定时检查已停止");
        });

        Self { shutdown, task }
    }

    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!("定时检查任务异常结束: {}", err);
        }
    }
}
