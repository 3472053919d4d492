use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 对话消息的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    Ai,
    Tool,
}

/// LLM 发起的工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// 解析后的参数；LLM 给出的不是合法 JSON 时保留为字符串
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// 由 LLM 返回的原始参数字符串构造
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw_args: &str) -> Self {
        let args = if raw_args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw_args).unwrap_or_else(|_| Value::String(raw_args.to_string()))
        };
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// 还原为发送给 LLM 的参数字符串
    pub fn raw_args(&self) -> String {
        match &self.args {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 对外暴露的对话消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    /// 产生该消息的 agent 或工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Human,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Ai,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn tool(
        content: impl Into<String>,
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: MessageType::Tool,
            content: content.into(),
            name: Some(name.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// 用户上传的附件（base64 编码）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default, alias = "type")]
    pub mime_type: String,
    pub data: String,
}

/// `/stream` 与 `/invoke` 的请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInput {
    pub content: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryInput {
    pub thread_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
}

/// SSE 流中的单个事件：`{"type": ..., "content": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum StreamEvent {
    Token(String),
    Message(ChatMessage),
    Error(String),
}
