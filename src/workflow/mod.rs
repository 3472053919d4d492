//! 流程层
//!
//! - `supervisor`：GENERATE → REVIEW → EXPORT 的迭代流程
//! - `agent`：单个 Agent 的工具调用循环
//! - `tools`：各 Agent 的工具（直接借用会话的迭代状态）
//! - `sql_assistant`：只读数据库问答

pub mod agent;
pub mod prompts;
pub mod sql_assistant;
pub mod state;
pub mod supervisor;
pub mod tools;

pub use agent::{emit, Agent, AgentRun, EventSender};
pub use sql_assistant::ask_database;
pub use state::IterationState;
pub use supervisor::{after_generation, after_review, Phase, RunOutcome, Supervisor, SupervisorSettings};
pub use tools::{GenerationTools, NoTools, ReviewTools, SqlTools, ToolHost};
