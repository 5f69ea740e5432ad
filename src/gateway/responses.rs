//! Usage: JSON envelopes for the control API (`success` flag + payload, or `success:false` + `error`).

use crate::shared::error::{AppError, ErrorKind};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SuccessEnvelope<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    payload: T,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
}

pub(super) fn ok<T: Serialize>(payload: T) -> Response {
    (
        StatusCode::OK,
        Json(SuccessEnvelope {
            success: true,
            payload,
        }),
    )
        .into_response()
}

pub(super) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(super) fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorEnvelope {
            success: false,
            error: error.into(),
        }),
    )
        .into_response()
}

pub(super) fn from_error(err: AppError) -> Response {
    let status = status_for(err.kind());
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(code = err.code(), "控制接口内部错误: {}", err.message());
        return failure(status, format!("数据库错误: {}", err.message()));
    }
    failure(status, err.message())
}
