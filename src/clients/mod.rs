pub mod llm_client;
pub mod mock;

pub use llm_client::{LlmClient, LlmMessage, LlmReply, OpenAiClient, TokenSink, ToolSpec};
pub use mock::ScriptedLlmClient;
