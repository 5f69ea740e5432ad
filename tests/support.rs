#![allow(dead_code)]

use std::sync::Arc;

use account_pool_hub_lib::{AccountRegistry, KvStore, SqliteKvStore};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

/// Registry backed by a fresh sqlite database in a temp dir.
pub struct TestPool {
    pub dir: TempDir,
    pub store: Arc<dyn KvStore>,
    pub registry: Arc<AccountRegistry>,
}

impl TestPool {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store: Arc<dyn KvStore> = Arc::new(
            account_pool_hub_lib::test_support::open_sqlite_store(dir.path()).expect("open store"),
        );
        let registry = Arc::new(AccountRegistry::new(Arc::clone(&store)));
        Self {
            dir,
            store,
            registry,
        }
    }

    pub fn with_accounts(accounts: &[(&str, &str)]) -> Self {
        let pool = Self::new();
        for (email, token) in accounts {
            pool.registry
                .upsert(Some(*email), Some(*token))
                .expect("seed account");
        }
        pool
    }

    pub fn reopen_store(&self) -> SqliteKvStore {
        account_pool_hub_lib::test_support::open_sqlite_store(self.dir.path()).expect("reopen")
    }

    pub fn router(&self) -> Router {
        account_pool_hub_lib::build_router(Arc::clone(&self.registry))
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub json: serde_json::Value,
}

pub async fn call(router: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Reply {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("request");
    let resp = router.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.expect("body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    Reply {
        status,
        content_type,
        json,
    }
}

pub async fn get(router: &Router, uri: &str) -> Reply {
    call(router, Method::GET, uri, None).await
}

pub async fn post(router: &Router, uri: &str, body: serde_json::Value) -> Reply {
    call(router, Method::POST, uri, Some(body)).await
}
