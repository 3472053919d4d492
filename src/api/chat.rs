//! 对话接口

use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};

use super::AppState;
use crate::error::AppResult;
use crate::models::{ChatHistory, ChatHistoryInput, StreamEvent, UserInput};
use crate::workflow::emit;

/// SSE 流式输出
///
/// 事件依次为 token / message，出错时为 error；无论成功与否最后都发送 `[DONE]`。
pub async fn stream(
    State(state): State<AppState>,
    Json(input): Json<UserInput>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = state.registry.get_or_create(input.thread_id.as_deref()).await;
    info!("[会话 {}] 📡 流式请求", session.thread_id());

    let (event_tx, event_rx) = mpsc::unbounded_channel::<StreamEvent>();
    let error_tx = event_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = session
            .run(input.content, input.attachments, Some(event_tx))
            .await
        {
            error!("[会话 {}] ❌ 流式请求失败: {}", session.thread_id(), e);
            emit(Some(&error_tx), StreamEvent::Error(e.to_string()));
        }
    });

    let events = UnboundedReceiverStream::new(event_rx)
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|e| {
                json!({ "type": "error", "content": e.to_string() }).to_string()
            });
            Ok::<_, Infallible>(Event::default().data(data))
        })
        .chain(stream::once(async { Ok::<_, Infallible>(Event::default().data("[DONE]")) }));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// 运行到结束，返回最终消息
pub async fn invoke(State(state): State<AppState>, Json(input): Json<UserInput>) -> Response {
    let session = state.registry.get_or_create(input.thread_id.as_deref()).await;
    info!("[会话 {}] 📨 同步请求", session.thread_id());

    match session.run(input.content, input.attachments, None).await {
        Ok(message) => Json(message).into_response(),
        Err(e) if e.is_bad_request() => e.into_response(),
        Err(e) => {
            error!("[会话 {}] ❌ 请求失败: {}", session.thread_id(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": format!("Unexpected error: {}", e) })),
            )
                .into_response()
        }
    }
}

pub async fn history(
    State(state): State<AppState>,
    Json(input): Json<ChatHistoryInput>,
) -> AppResult<Json<ChatHistory>> {
    let messages = state.registry.history(&input.thread_id).await?;
    Ok(Json(ChatHistory { messages }))
}
