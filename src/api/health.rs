use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "测试用例生成服务",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 存活检查，附带当前登记的会话数
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.registry.len().await,
    }))
}
