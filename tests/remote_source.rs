mod support;

use std::sync::Arc;
use std::time::Duration;

use account_pool_hub_lib::{
    AccountSource, ErrorKind, GatewayManager, KvStore, MemoryKvStore, RemoteAccountSource,
};
use support::TestPool;

fn remote(base_url: &str, snapshot: Arc<dyn KvStore>) -> RemoteAccountSource {
    RemoteAccountSource::new(base_url, Duration::from_secs(3), snapshot).expect("client")
}

#[tokio::test]
async fn remote_source_drives_the_control_api() {
    let pool = TestPool::with_accounts(&[("a@x", "ta"), ("b@x", "tb")]);
    pool.registry.activate(Some("a@x")).expect("activate");

    let mut gateway = GatewayManager::default();
    let status = gateway
        .start("127.0.0.1:0", Arc::clone(&pool.registry))
        .expect("start control api");
    let base_url = status.base_url.expect("base url");
    let source = remote(&base_url, Arc::new(MemoryKvStore::new()));

    let active = source.active_account().await.expect("active");
    assert_eq!(active.email, "a@x");
    assert_eq!(active.token, "ta");

    let switched = source.switch_account().await.expect("switch");
    assert_eq!(switched.email, "b@x");
    assert_eq!(
        pool.registry.active_email().expect("pointer").as_deref(),
        Some("b@x")
    );

    source.ban_account("b@x").await.expect("ban");
    let err = source.ban_account("nobody@x").await.expect_err("unknown");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let switched = source.switch_account().await.expect("switch back");
    assert_eq!(switched.email, "a@x");
    let err = source.switch_account().await.expect_err("exhausted");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.message(), "没有可用的账号");

    let rows = source.list_accounts().await.expect("list");
    assert_eq!(rows.len(), 2);

    gateway.stop().await;
}

#[tokio::test]
async fn remote_list_falls_back_to_snapshot_after_control_api_stops() {
    let pool = TestPool::with_accounts(&[("a@x", "ta")]);
    let snapshot: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());

    let mut gateway = GatewayManager::default();
    let base_url = gateway
        .start("127.0.0.1:0", Arc::clone(&pool.registry))
        .expect("start")
        .base_url
        .expect("base url");
    let source = remote(&base_url, Arc::clone(&snapshot));

    let live = source.list_accounts().await.expect("live list");
    assert_eq!(live.len(), 1);

    gateway.stop().await;

    let cached = source.list_accounts().await.expect("cached list");
    assert_eq!(cached, live);

    let err = source.active_account().await.expect_err("unreachable");
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
}
