//! Usage: Control API router (account registry endpoints, settings cache, CORS, JSON 404).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::responses;
use crate::domain::accounts::{AccountRegistry, UpsertOutcome};
use crate::shared::blocking;
use crate::shared::error::{AppError, AppResult};
use crate::shared::time::now_unix_seconds;

#[derive(Clone)]
pub(super) struct GatewayAppState {
    pub(super) registry: Arc<AccountRegistry>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    app: &'static str,
    version: &'static str,
    ts: i64,
}

/// Request body shared by the mutation endpoints. Malformed JSON reads as `{}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountBody {
    email: Option<String>,
    token: Option<String>,
}

fn parse_body(body: &Bytes) -> AccountBody {
    serde_json::from_slice(body).unwrap_or_default()
}

async fn with_registry<T, F>(state: &GatewayAppState, label: &'static str, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AccountRegistry) -> AppResult<T> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    blocking::run(label, move || f(&registry)).await
}

fn respond<T: Serialize>(result: AppResult<T>) -> Response {
    match result {
        Ok(payload) => responses::ok(payload),
        Err(err) => responses::from_error(err),
    }
}

#[derive(Debug, Serialize)]
struct MessageReply {
    message: String,
}

#[derive(Debug, Serialize)]
struct CredentialReply {
    email: String,
    token: String,
    message: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "account-pool-hub",
        version: env!("CARGO_PKG_VERSION"),
        ts: now_unix_seconds(),
    })
}

async fn list_accounts(State(state): State<GatewayAppState>) -> Response {
    respond(
        with_registry(&state, "list_accounts", |r| r.summaries())
            .await
            .map(|accounts| serde_json::json!({ "accounts": accounts })),
    )
}

async fn active_account(State(state): State<GatewayAppState>) -> Response {
    respond(
        with_registry(&state, "active_account", |r| r.resolve_active_account())
            .await
            .map(|acc| {
                serde_json::json!({
                    "email": acc.email,
                    "token": acc.token,
                    "last_used": acc.last_used(),
                })
            }),
    )
}

async fn account_detail(
    State(state): State<GatewayAppState>,
    Path(email): Path<String>,
) -> Response {
    respond(with_registry(&state, "account_detail", move |r| r.account_detail(&email)).await)
}

async fn stats(State(state): State<GatewayAppState>) -> Response {
    respond(with_registry(&state, "stats", |r| r.stats()).await)
}

async fn switch_account(State(state): State<GatewayAppState>) -> Response {
    let result = with_registry(&state, "switch_account", |r| r.switch_next()).await;
    respond(result.map(|acc| CredentialReply {
        message: format!("已切换到账号: {}", acc.email),
        email: acc.email,
        token: acc.token,
    }))
}

async fn activate_account(State(state): State<GatewayAppState>, body: Bytes) -> Response {
    let body = parse_body(&body);
    let result = with_registry(&state, "activate_account", move |r| {
        r.activate(body.email.as_deref())
    })
    .await;
    respond(result.map(|acc| {
        tracing::info!(email = %acc.email, "已激活账号");
        CredentialReply {
            message: format!("已激活账号: {}", acc.email),
            email: acc.email,
            token: acc.token,
        }
    }))
}

async fn ban_account(State(state): State<GatewayAppState>, body: Bytes) -> Response {
    let body = parse_body(&body);
    let result = with_registry(&state, "ban_account", move |r| r.ban(body.email.as_deref())).await;
    respond(result.map(|email| MessageReply {
        message: format!("账号 {email} 已标记为 banned"),
    }))
}

async fn add_account(State(state): State<GatewayAppState>, body: Bytes) -> Response {
    let body = parse_body(&body);
    let email = body.email.as_deref().map(str::trim).unwrap_or("").to_string();
    let result = with_registry(&state, "add_account", move |r| {
        r.upsert(body.email.as_deref(), body.token.as_deref())
    })
    .await;
    respond(result.map(|outcome| MessageReply {
        message: match outcome {
            UpsertOutcome::TokenUpdated => format!("账号 {email} 的 token 已更新"),
            UpsertOutcome::Added => format!("账号 {email} 已添加"),
        },
    }))
}

async fn delete_account(State(state): State<GatewayAppState>, body: Bytes) -> Response {
    let body = parse_body(&body);
    let result = with_registry(&state, "delete_account", move |r| {
        r.delete(body.email.as_deref())
    })
    .await;
    respond(result.map(|email| MessageReply {
        message: format!("账号 {email} 已删除"),
    }))
}

async fn store_settings_cache(State(state): State<GatewayAppState>, body: Bytes) -> Response {
    let raw = match String::from_utf8(body.to_vec()) {
        Ok(raw) => raw,
        Err(err) => {
            return responses::from_error(AppError::invalid_input(format!(
                "settings 缓存不是合法 UTF-8: {err}"
            )))
        }
    };
    let result = with_registry(&state, "settings_cache_write", move |r| {
        r.set_settings_cache(&raw)
    })
    .await;
    respond(result.map(|()| MessageReply {
        message: "settings 缓存已更新".to_string(),
    }))
}

async fn clear_settings_cache(State(state): State<GatewayAppState>) -> Response {
    let result = with_registry(&state, "settings_cache_clear", |r| r.clear_settings_cache()).await;
    respond(result.map(|()| MessageReply {
        message: "settings 缓存已清除".to_string(),
    }))
}

async fn not_found() -> Response {
    responses::failure(StatusCode::NOT_FOUND, "未找到接口")
}

pub fn build_router(registry: Arc<AccountRegistry>) -> Router {
    // The cors layer answers every OPTIONS request itself (200, empty body).
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/accounts", get(list_accounts))
        .route("/active-account", get(active_account))
        .route("/account/:email", get(account_detail))
        .route("/stats", get(stats))
        .route("/switch-account", post(switch_account))
        .route("/activate-account", post(activate_account))
        .route("/ban-account", post(ban_account))
        .route("/add-account", post(add_account))
        .route("/delete-account", post(delete_account))
        .route(
            "/settings-cache",
            post(store_settings_cache).delete(clear_settings_cache),
        )
        .fallback(not_found)
        .layer(cors)
        .with_state(GatewayAppState { registry })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::kv_store::MemoryKvStore;
    use axum::body::{to_bytes, Body};
    use tower::ServiceExt;

    fn router() -> (Arc<AccountRegistry>, Router) {
        let registry = Arc::new(AccountRegistry::new(Arc::new(MemoryKvStore::new())));
        (Arc::clone(&registry), build_router(registry))
    }

    async fn call(
        router: &Router,
        method: Method,
        uri: &str,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let req = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let resp = router.clone().oneshot(req).await.expect("response");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 64 * 1024).await.expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json")
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_app() {
        let (_, router) = router();
        let (status, body) = call(&router, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["app"], "account-pool-hub");
    }

    #[tokio::test]
    async fn malformed_body_reads_as_missing_fields() {
        let (_, router) = router();
        let (status, body) = call(&router, Method::POST, "/ban-account", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "缺少 email 参数");
    }

    #[tokio::test]
    async fn add_then_update_messages() {
        let (_, router) = router();
        let (status, body) = call(
            &router,
            Method::POST,
            "/add-account",
            r#"{"email":"a@x","token":"t1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "账号 a@x 已添加");

        let (_, body) = call(
            &router,
            Method::POST,
            "/add-account",
            r#"{"email":"a@x","token":"t2"}"#,
        )
        .await;
        assert_eq!(body["message"], "账号 a@x 的 token 已更新");
    }

    #[tokio::test]
    async fn options_and_unknown_paths() {
        let (_, router) = router();
        let (status, body) = call(&router, Method::OPTIONS, "/accounts", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::Value::Null);

        let (status, body) = call(&router, Method::GET, "/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "未找到接口");
    }

    #[tokio::test]
    async fn settings_cache_requires_json() {
        let (registry, router) = router();
        let (status, _) = call(&router, Method::POST, "/settings-cache", "nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&router, Method::POST, "/settings-cache", r#"{"data":{}}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            registry.settings_cache().expect("read").as_deref(),
            Some(r#"{"data":{}}"#)
        );

        let (status, _) = call(&router, Method::DELETE, "/settings-cache", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(registry.settings_cache().expect("read"), None);
    }

    #[tokio::test]
    async fn settings_cache_rejects_invalid_utf8() {
        let (registry, router) = router();
        let req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/settings-cache")
            .body(Body::from(b"{\"data\":\"\xff\"}".to_vec()))
            .expect("request");
        let resp = router.oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(registry.settings_cache().expect("read"), None);
    }
}
