//! 单个 Agent 的工具调用循环
//!
//! 发送 `[system, user, ...]`，回复中带工具调用就交给 [`ToolHost`] 执行并追加结果，
//! 直到回复不再调用工具或达到轮数上限。

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::clients::{LlmClient, LlmMessage, LlmReply, ToolSpec};
use crate::error::AppResult;
use crate::models::{ChatMessage, StreamEvent};
use crate::utils::logging::truncate_text;
use crate::workflow::tools::ToolHost;

/// 推送给调用方的事件通道
///
/// token 回调是同步的，所以用无界通道。
pub type EventSender = UnboundedSender<StreamEvent>;

/// 向事件通道推送一条消息；接收端已关闭时静默丢弃
pub fn emit(events: Option<&EventSender>, event: StreamEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[derive(Debug, Clone)]
pub struct Agent {
    name: String,
    system_prompt: String,
    max_turns: usize,
}

/// 一次 Agent 运行的结果
#[derive(Debug, Clone, Default)]
pub struct AgentRun {
    /// 最后一条 AI 回复的文本
    pub final_text: String,
    /// 期间产生的全部 AI / 工具消息
    pub messages: Vec<ChatMessage>,
}

impl Agent {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            max_turns: max_turns.max(1),
        }
    }

    pub async fn run(
        &self,
        llm: &dyn LlmClient,
        user_message: &str,
        tools: &mut dyn ToolHost,
        events: Option<&EventSender>,
    ) -> AppResult<AgentRun> {
        let specs = tools.specs();
        let mut conversation = vec![
            LlmMessage::System(self.system_prompt.clone()),
            LlmMessage::User(user_message.to_string()),
        ];
        let mut run = AgentRun::default();

        for turn in 1..=self.max_turns {
            debug!("[{}] 第 {} 轮请求 LLM", self.name, turn);
            let reply = self.request(llm, &conversation, &specs, events).await?;

            let message = ChatMessage::ai(reply.content.clone())
                .with_name(self.name.clone())
                .with_tool_calls(reply.tool_calls.clone());
            emit(events, StreamEvent::Message(message.clone()));
            run.messages.push(message);
            run.final_text = reply.content.clone();

            conversation.push(LlmMessage::Assistant {
                content: reply.content,
                tool_calls: reply.tool_calls.clone(),
            });

            if reply.tool_calls.is_empty() {
                return Ok(run);
            }

            for call in &reply.tool_calls {
                info!("[{}] 🔧 调用工具 {}", self.name, call.name);
                let output = tools.call(call).await;
                debug!("[{}] 工具 {} 返回: {}", self.name, call.name, truncate_text(&output, 200));

                let message = ChatMessage::tool(output.clone(), call.name.clone(), call.id.clone());
                emit(events, StreamEvent::Message(message.clone()));
                run.messages.push(message);
                conversation.push(LlmMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: output,
                });
            }
        }

        warn!(
            "[{}] ⚠️ 达到最大轮数 {}，停止工具调用",
            self.name, self.max_turns
        );
        Ok(run)
    }

    /// 优先流式调用；流式失败时记录日志并以非流式重发同一请求
    async fn request(
        &self,
        llm: &dyn LlmClient,
        conversation: &[LlmMessage],
        specs: &[ToolSpec],
        events: Option<&EventSender>,
    ) -> AppResult<LlmReply> {
        let on_token = |token: &str| emit(events, StreamEvent::Token(token.to_string()));
        match llm.stream(conversation, specs, &on_token).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!("[{}] ⚠️ 流式调用失败，改用非流式调用: {}", self.name, e);
                llm.complete(conversation, specs).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ScriptedLlmClient;
    use crate::models::{MessageType, ToolCall};
    use crate::workflow::state::IterationState;
    use crate::workflow::tools::{GenerationTools, NoTools};

    const CASES: &str = r#"{"test_cases_json": "[{\"test_case_id\": \"TC_001\"}]"}"#;

    #[tokio::test]
    async fn test_tool_loop_until_plain_reply() {
        let llm = ScriptedLlmClient::new([
            LlmReply::text("").with_tool_call(ToolCall::from_raw("c1", "save_test_cases", CASES)),
            LlmReply::text("已保存 1 个测试用例"),
        ]);
        let mut state = IterationState::new("登录", 3);
        let agent = Agent::new("generator", "system", 8);

        let run = {
            let mut tools = GenerationTools::new(&mut state);
            agent.run(&llm, "生成", &mut tools, None).await.unwrap()
        };

        assert_eq!(run.final_text, "已保存 1 个测试用例");
        assert_eq!(run.messages.len(), 3);
        assert_eq!(run.messages[1].kind, MessageType::Tool);
        assert_eq!(run.messages[1].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(state.test_cases.len(), 1);

        // 第二次请求带上了助手消息和工具结果
        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), 4);
        assert!(matches!(&requests[1][3], LlmMessage::Tool { tool_call_id, .. } if tool_call_id == "c1"));
    }

    #[tokio::test]
    async fn test_max_turns_stops_loop() {
        let looping = (0..5).map(|i| {
            LlmReply::text("").with_tool_call(ToolCall::from_raw(format!("c{}", i), "noop", "{}"))
        });
        let llm = ScriptedLlmClient::new(looping);
        let agent = Agent::new("looper", "system", 2);

        let run = agent.run(&llm, "go", &mut NoTools, None).await.unwrap();
        assert_eq!(llm.requests().len(), 2);
        assert_eq!(run.messages.len(), 4);
        assert_eq!(llm.remaining(), 3);
    }

    #[tokio::test]
    async fn test_stream_failure_falls_back_and_emits_events() {
        let llm = ScriptedLlmClient::new([LlmReply::text("你好")]).failing_stream();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let agent = Agent::new("sql_agent", "system", 8);

        let run = agent.run(&llm, "hi", &mut NoTools, Some(&tx)).await.unwrap();
        assert_eq!(run.final_text, "你好");

        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        // 回退到非流式后没有 token，只有完整消息
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Message(m) if m.content == "你好"));
    }

    #[tokio::test]
    async fn test_tokens_are_streamed() {
        let llm = ScriptedLlmClient::new([LlmReply::text("完成")]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        Agent::new("a", "s", 1)
            .run(&llm, "u", &mut NoTools, Some(&tx))
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(StreamEvent::Token(t)) if t == "完成"));
        assert!(matches!(rx.recv().await, Some(StreamEvent::Message(_))));
    }
}
