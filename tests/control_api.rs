mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;
use support::{call, get, post, TestPool};

#[tokio::test]
async fn single_account_cannot_switch() {
    let pool = TestPool::with_accounts(&[("a@x", "ta")]);
    pool.registry.activate(Some("a@x")).expect("activate");
    let router = pool.router();

    let reply = post(&router, "/switch-account", json!({})).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json["success"], false);
    assert_eq!(reply.json["error"], "没有可用的账号");
}

#[tokio::test]
async fn switch_selects_the_other_candidate() {
    let pool = TestPool::with_accounts(&[("a@x", "ta"), ("b@x", "tb")]);
    let router = pool.router();
    let reply = post(&router, "/activate-account", json!({ "email": "a@x" })).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["message"], "已激活账号: a@x");

    let reply = post(&router, "/switch-account", json!({})).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["success"], true);
    assert_eq!(reply.json["email"], "b@x");
    assert_eq!(reply.json["token"], "tb");
    assert_eq!(reply.json["message"], "已切换到账号: b@x");

    let active = get(&router, "/active-account").await;
    assert_eq!(active.json["email"], "b@x");
    assert!(active.json["last_used"].is_string());
}

#[tokio::test]
async fn banning_the_only_active_account_clears_the_pointer() {
    let pool = TestPool::with_accounts(&[("a@x", "ta")]);
    pool.registry.activate(Some("a@x")).expect("activate");
    let router = pool.router();

    let reply = post(&router, "/ban-account", json!({ "email": "a@x" })).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.json["message"].as_str().expect("message").contains("banned"));
    assert_eq!(pool.registry.active_email().expect("pointer"), None);

    let active = get(&router, "/active-account").await;
    assert_eq!(active.status, StatusCode::NOT_FOUND);
    assert_eq!(active.json["success"], false);

    let stats = get(&router, "/stats").await;
    assert_eq!(stats.json["total"], 1);
    assert_eq!(stats.json["banned"], 1);
    assert_eq!(stats.json["available"], 0);
    assert_eq!(stats.json["active"], 0);
}

#[tokio::test]
async fn list_is_sorted_most_recent_first() {
    let pool = TestPool::with_accounts(&[("a@x", "ta"), ("b@x", "tb")]);
    let router = pool.router();
    post(&router, "/activate-account", json!({ "email": "a@x" })).await;

    let reply = get(&router, "/accounts").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.content_type.as_deref(), Some("application/json"));
    let rows = reply.json["accounts"].as_array().expect("accounts");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["email"], "a@x");
    assert_eq!(rows[0]["is_active"], 1);
    assert_eq!(rows[0]["has_token"], 1);
    assert_eq!(rows[0]["health_status"], "healthy");
    assert_eq!(rows[1]["email"], "b@x");
    assert_eq!(rows[1]["is_active"], 0);
}

#[tokio::test]
async fn add_is_idempotent_per_email() {
    let pool = TestPool::new();
    let router = pool.router();

    let first = post(&router, "/add-account", json!({ "email": "a@x", "token": "t1" })).await;
    assert_eq!(first.json["message"], "账号 a@x 已添加");
    let second = post(&router, "/add-account", json!({ "email": "a@x", "token": "t2" })).await;
    assert_eq!(second.json["message"], "账号 a@x 的 token 已更新");

    let accounts = pool.registry.list().expect("list");
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].token, "t2");

    let missing = post(&router, "/add-account", json!({ "email": "b@x" })).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json["error"], "缺少 email 或 token 参数");
}

#[tokio::test]
async fn delete_and_detail() {
    let pool = TestPool::with_accounts(&[("a@x", "ta")]);
    let router = pool.router();

    let detail = get(&router, "/account/a@x").await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.json["token"], "ta");
    assert_eq!(detail.json["is_banned"], 0);

    let deleted = post(&router, "/delete-account", json!({ "email": "a@x" })).await;
    assert_eq!(deleted.json["message"], "账号 a@x 已删除");

    let again = post(&router, "/delete-account", json!({ "email": "a@x" })).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);

    let detail = get(&router, "/account/a@x").await;
    assert_eq!(detail.status, StatusCode::NOT_FOUND);
    assert_eq!(detail.json["error"], "账号不存在");
}

#[tokio::test]
async fn activation_rejects_banned_and_unknown_accounts() {
    let pool = TestPool::with_accounts(&[("a@x", "ta")]);
    pool.registry.ban(Some("a@x")).expect("ban");
    let router = pool.router();

    let banned = post(&router, "/activate-account", json!({ "email": "a@x" })).await;
    assert_eq!(banned.status, StatusCode::NOT_FOUND);
    assert_eq!(banned.json["error"], "账号不存在或已被 ban");

    let missing = post(&router, "/activate-account", json!({})).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn options_and_fallback() {
    let pool = TestPool::new();
    let router = pool.router();

    let options = call(&router, Method::OPTIONS, "/switch-account", None).await;
    assert_eq!(options.status, StatusCode::OK);
    assert_eq!(options.json, serde_json::Value::Null);

    let unknown = get(&router, "/does-not-exist").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.json["success"], false);
}

#[tokio::test]
async fn state_survives_reopening_the_database() {
    let pool = TestPool::with_accounts(&[("a@x", "ta"), ("b@x", "tb")]);
    pool.registry.activate(Some("b@x")).expect("activate");

    let reopened =
        account_pool_hub_lib::AccountRegistry::new(std::sync::Arc::new(pool.reopen_store()));
    assert_eq!(reopened.list().expect("list").len(), 2);
    assert_eq!(reopened.active_email().expect("pointer").as_deref(), Some("b@x"));
    assert_eq!(reopened.resolve_active_account().expect("active").token, "tb");
}
