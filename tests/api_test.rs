use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use testcase_agent::api::{router, AppState};
use testcase_agent::clients::{LlmReply, ScriptedLlmClient};
use testcase_agent::models::ToolCall;
use testcase_agent::services::ExcelExporter;
use testcase_agent::workflow::{Supervisor, SupervisorSettings};
use testcase_agent::{SessionRegistry, SessionSettings};

fn app(dir: &std::path::Path, replies: Vec<LlmReply>) -> Router {
    let supervisor = Supervisor::new(
        Arc::new(ScriptedLlmClient::new(replies)),
        Arc::new(ExcelExporter::new(dir)),
        SupervisorSettings {
            pass_threshold: 90.0,
            max_agent_turns: 8,
        },
    );
    let settings = SessionSettings {
        max_iterations: 2,
        idle_timeout: Duration::from_secs(60),
    };
    router(AppState::new(SessionRegistry::new(supervisor, settings), dir))
}

fn passing_run() -> Vec<LlmReply> {
    let cases = json!([{
        "test_case_id": "TC_001",
        "test_type": "功能测试",
        "test_description": "正常登录",
        "test_steps": ["打开登录页", "点击登录"],
        "expected_result": "登录成功",
        "priority": "高"
    }]);
    let review = json!({
        "coverage_score": 95, "executability_score": 95, "clarity_score": 95,
        "suggestions": []
    });
    vec![
        LlmReply::text("").with_tool_call(ToolCall::from_raw(
            "c1",
            "save_test_cases",
            &json!({ "test_cases_json": cases.to_string() }).to_string(),
        )),
        LlmReply::text("已保存"),
        LlmReply::text("").with_tool_call(ToolCall::from_raw(
            "c2",
            "save_review_result",
            &json!({ "review_result_json": review.to_string() }).to_string(),
        )),
        LlmReply::text("评审通过"),
    ]
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok", "sessions": 0 }));

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["message"].is_string());
}

#[tokio::test]
async fn test_download_rejects_bad_names() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    for uri in [
        "/api/download/..%2Fsecret.xlsx",
        "/api/download/..secret.xlsx",
        "/api/download/report.csv",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    let response = app.oneshot(get("/api/download/missing.xlsx")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invoke_then_download_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), passing_run());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/invoke",
            json!({ "content": "用户登录功能需求", "thread_id": "thread-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let message = body_json(response).await;
    assert_eq!(message["type"], "ai");
    let content = message["content"].as_str().unwrap();
    assert!(content.contains("# 测试用例文档"));

    // 从回复中取出下载地址
    let start = content.find("/api/download/").unwrap();
    let end = content[start..].find(')').unwrap() + start;
    let url = &content[start..end];

    let response = app.clone().oneshot(get(url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename*=UTF-8''testcases_"));
    let bytes = body_bytes(response).await;
    assert_eq!(&bytes[..2], b"PK");

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/history", json!({ "thread_id": "thread-1" })))
        .await
        .unwrap();
    let history = body_json(response).await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages[0]["type"], "human");
    assert!(messages.iter().any(|m| m["type"] == "tool"));

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/history", json!({ "thread_id": "unknown" })))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({ "messages": [] }));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(body_json(response).await["sessions"], 1);
}

#[tokio::test]
async fn test_invoke_failure_is_500_with_detail() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let response = app
        .oneshot(post_json("/api/v1/invoke", json!({ "content": "需求" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Unexpected error: "));
}

#[tokio::test]
async fn test_stream_ends_with_done() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), passing_run());

    let response = app
        .oneshot(post_json("/api/v1/stream", json!({ "content": "用户登录功能需求" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();

    assert!(text.contains(r#""type":"token""#));
    assert!(text.contains(r#""type":"message""#));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn test_stream_error_still_ends_with_done() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let response = app
        .oneshot(post_json("/api/v1/stream", json!({ "content": "需求" })))
        .await
        .unwrap();
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains(r#""type":"error""#));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}
