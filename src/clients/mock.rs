//! 按脚本回复的 LLM 客户端，用于测试
//!
//! ```rust,ignore
//! let llm = ScriptedLlmClient::new([
//!     LlmReply::text("").with_tool_call(ToolCall::from_raw("c1", "save_test_cases", args)),
//!     LlmReply::text("已保存"),
//! ]);
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::llm_client::{LlmClient, LlmMessage, LlmReply, ToolSpec, TokenSink};
use crate::error::{AppError, AppResult, LlmError};

/// 依次返回预先设定的回复；脚本用完后返回空文本
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<LlmReply>>,
    requests: Mutex<Vec<Vec<LlmMessage>>>,
    fail_stream: bool,
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = LlmReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            fail_stream: false,
        }
    }

    /// 流式调用总是失败，用来验证回退到非流式调用
    pub fn failing_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    /// 目前为止收到的全部请求
    pub fn requests(&self) -> Vec<Vec<LlmMessage>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// 尚未消费的回复数
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next_reply(&self, messages: &[LlmMessage]) -> LlmReply {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[LlmMessage], _tools: &[ToolSpec]) -> AppResult<LlmReply> {
        Ok(self.next_reply(messages))
    }

    async fn stream(
        &self,
        messages: &[LlmMessage],
        _tools: &[ToolSpec],
        on_token: TokenSink<'_>,
    ) -> AppResult<LlmReply> {
        if self.fail_stream {
            return Err(AppError::Llm(LlmError::StreamFailed {
                model: self.model().to_string(),
                source: "scripted stream failure".into(),
            }));
        }
        let reply = self.next_reply(messages);
        if !reply.content.is_empty() {
            on_token(&reply.content);
        }
        Ok(reply)
    }
}
