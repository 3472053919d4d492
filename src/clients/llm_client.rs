//! LLM 客户端
//!
//! 对 Agent 暴露统一的 [`LlmClient`] trait：输入一组有序消息和工具定义，
//! 返回最终文本或工具调用请求。默认实现 [`OpenAiClient`] 通过 `async-openai`
//! 对接任意兼容 OpenAI 协议的端点（默认 DeepSeek）。

use std::collections::BTreeMap;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolChoiceOption,
        ChatCompletionTools, CreateChatCompletionRequest, FunctionCall, FunctionObject,
        ToolChoiceOptions,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::ToolCall;

/// 发送给 LLM 的一条消息
#[derive(Debug, Clone, PartialEq)]
pub enum LlmMessage {
    System(String),
    User(String),
    Assistant {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// 提供给 LLM 的工具定义
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// LLM 的一次回复
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// 流式输出的回调，每收到一段文本调用一次
pub type TokenSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 当前使用的模型名
    fn model(&self) -> &str;

    /// 非流式调用
    async fn complete(&self, messages: &[LlmMessage], tools: &[ToolSpec]) -> AppResult<LlmReply>;

    /// 流式调用，文本片段经 `on_token` 实时输出，返回拼接后的完整回复
    ///
    /// 默认实现退化为一次非流式调用。
    async fn stream(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        on_token: TokenSink<'_>,
    ) -> AppResult<LlmReply> {
        let reply = self.complete(messages, tools).await?;
        if !reply.content.is_empty() {
            on_token(&reply.content);
        }
        Ok(reply)
    }
}

/// 基于 async-openai 的 LLM 客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
}

impl OpenAiClient {
    /// 按当前运行环境（dev / prod）选择端点和密钥
    pub fn new(config: &Config) -> AppResult<Self> {
        let (api_base, api_key) = config.llm_endpoint();
        debug!("初始化 LLM 客户端: {} @ {}", config.llm_model_name, api_base);

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()
            .map_err(|e| AppError::llm_api_failed(&config.llm_model_name, e))?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
        })
    }

    fn build_request(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let messages = messages
            .iter()
            .map(convert_message)
            .collect::<Result<Vec<_>, _>>()?;

        let (tools, tool_choice) = if tools.is_empty() {
            (None, None)
        } else {
            (
                Some(tools.iter().map(convert_tool).collect()),
                Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto)),
            )
        };

        Ok(CreateChatCompletionRequest {
            model: self.model_name.clone(),
            messages,
            tools,
            tool_choice,
            temperature: Some(self.temperature),
            stream: stream.then_some(true),
            ..Default::default()
        })
    }

    fn stream_failed(&self, source: impl std::error::Error + Send + Sync + 'static) -> AppError {
        AppError::Llm(LlmError::StreamFailed {
            model: self.model_name.clone(),
            source: Box::new(source),
        })
    }
}

fn convert_message(message: &LlmMessage) -> Result<ChatCompletionRequestMessage, LlmError> {
    let converted = match message {
        LlmMessage::System(text) => ChatCompletionRequestSystemMessageArgs::default()
            .content(text.as_str())
            .build()?
            .into(),
        LlmMessage::User(text) => ChatCompletionRequestUserMessageArgs::default()
            .content(text.as_str())
            .build()?
            .into(),
        LlmMessage::Assistant {
            content,
            tool_calls,
        } => {
            let tool_calls: Vec<ChatCompletionMessageToolCalls> = tool_calls
                .iter()
                .map(|call| {
                    ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                        id: call.id.clone(),
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: call.raw_args(),
                        },
                    })
                })
                .collect();

            // 只有工具调用时 content 必须省略，部分兼容端点会拒绝空字符串
            let content = if content.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(ChatCompletionRequestAssistantMessageContent::Text(
                    content.clone(),
                ))
            };

            #[allow(deprecated)]
            ChatCompletionRequestAssistantMessage {
                content,
                name: None,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                function_call: None,
                refusal: None,
                audio: None,
            }
            .into()
        }
        LlmMessage::Tool {
            tool_call_id,
            content,
        } => ChatCompletionRequestToolMessage {
            content: ChatCompletionRequestToolMessageContent::Text(content.clone()),
            tool_call_id: tool_call_id.clone(),
        }
        .into(),
    };
    Ok(converted)
}

fn convert_tool(tool: &ToolSpec) -> ChatCompletionTools {
    ChatCompletionTools::Function(ChatCompletionTool {
        function: FunctionObject {
            name: tool.name.clone(),
            description: Some(tool.description.clone()),
            parameters: Some(tool.parameters.clone()),
            strict: None,
        },
    })
}

/// 流式返回中按 index 拼接的工具调用
#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, messages: &[LlmMessage], tools: &[ToolSpec]) -> AppResult<LlmReply> {
        debug!(
            "调用 LLM API，模型: {}，消息数: {}，工具数: {}",
            self.model_name,
            messages.len(),
            tools.len()
        );
        let request = self.build_request(messages, tools, false)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e)
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|call| match call {
                ChatCompletionMessageToolCalls::Function(func_call) => Some(ToolCall::from_raw(
                    func_call.id,
                    func_call.function.name,
                    &func_call.function.arguments,
                )),
                _ => None,
            })
            .collect();

        debug!("LLM API 调用成功");
        Ok(LlmReply {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    async fn stream(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        on_token: TokenSink<'_>,
    ) -> AppResult<LlmReply> {
        debug!("流式调用 LLM API，模型: {}", self.model_name);
        let request = self.build_request(messages, tools, true)?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| self.stream_failed(e))?;

        let mut content = String::new();
        let mut partial_calls: BTreeMap<u32, PartialToolCall> = BTreeMap::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.stream_failed(e))?;
            for choice in chunk.choices {
                if let Some(token) = choice.delta.content {
                    if !token.is_empty() {
                        on_token(&token);
                        content.push_str(&token);
                    }
                }
                for call in choice.delta.tool_calls.unwrap_or_default() {
                    let entry = partial_calls.entry(call.index).or_default();
                    if let Some(id) = call.id {
                        entry.id = id;
                    }
                    if let Some(function) = call.function {
                        if let Some(name) = function.name {
                            if entry.name.is_empty() {
                                entry.name = name;
                            }
                        }
                        if let Some(arguments) = function.arguments {
                            entry.arguments.push_str(&arguments);
                        }
                    }
                }
            }
        }

        let tool_calls = partial_calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| ToolCall::from_raw(call.id, call.name, &call.arguments))
            .collect();

        Ok(LlmReply {
            content,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_client() -> OpenAiClient {
        let config = Config {
            llm_api_key: "sk-test".to_string(),
            ..Config::default()
        };
        OpenAiClient::new(&config).unwrap()
    }

    #[test]
    fn test_build_request_with_tools() {
        let client = test_client();
        let messages = vec![
            LlmMessage::System("你是测试专家".to_string()),
            LlmMessage::User("登录功能".to_string()),
            LlmMessage::Assistant {
                content: String::new(),
                tool_calls: vec![ToolCall::from_raw("call_1", "get_test_cases", "{}")],
            },
            LlmMessage::Tool {
                tool_call_id: "call_1".to_string(),
                content: "[]".to_string(),
            },
        ];
        let tools = vec![ToolSpec::new(
            "get_test_cases",
            "获取测试用例",
            json!({"type": "object", "properties": {}}),
        )];

        let request = client.build_request(&messages, &tools, true).unwrap();
        assert_eq!(request.model, "deepseek-chat");
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
        assert_eq!(request.stream, Some(true));
    }

    #[test]
    fn test_build_request_without_tools_omits_choice() {
        let client = test_client();
        let request = client
            .build_request(&[LlmMessage::User("hi".to_string())], &[], false)
            .unwrap();
        assert!(request.tools.is_none());
        assert!(request.tool_choice.is_none());
        assert!(request.stream.is_none());
    }

    /// 需要真实的 LLM_API_KEY
    #[tokio::test]
    #[ignore]
    async fn test_live_completion() {
        let _ = dotenvy::dotenv();
        let config = Config::from_env().unwrap();
        let client = OpenAiClient::new(&config).unwrap();
        let reply = client
            .complete(&[LlmMessage::User("用一句话介绍你自己".to_string())], &[])
            .await
            .unwrap();
        println!("{}", reply.content);
        assert!(!reply.content.is_empty());
    }
}
