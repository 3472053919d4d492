//! HTTP 接口
//!
//! - `POST /api/v1/stream`：SSE 流式输出一次生成过程
//! - `POST /api/v1/invoke`：运行到结束，返回最终消息
//! - `POST /api/v1/history`：会话历史
//! - `GET /api/download/:filename`：下载生成的 Excel
//! - `GET /`、`GET /health`

pub mod chat;
pub mod download;
pub mod health;

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::orchestrator::SessionRegistry;
use crate::services::DOWNLOAD_ROUTE;

/// 处理函数共享的状态
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub download_dir: PathBuf,
}

impl AppState {
    pub fn new(registry: SessionRegistry, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            download_dir: download_dir.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health))
        .route("/api/v1/stream", post(chat::stream))
        .route("/api/v1/invoke", post(chat::invoke))
        .route("/api/v1/history", post(chat::history))
        .route(&format!("{}/:filename", DOWNLOAD_ROUTE), get(download::download))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.is_bad_request() {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            tracing::error!("❌ 请求处理失败: {}", self);
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}
