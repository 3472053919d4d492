//! # Testcase Agent
//!
//! 多 Agent 测试用例生成服务：根据需求文本或 Word 文档生成测试用例，
//! 迭代评审后导出 Excel，并通过 HTTP 接口提供流式对话。
//!
//! ## 架构设计
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - LLM 客户端（async-openai，支持流式），以及测试用的脚本客户端
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务一项能力
//! - `word_parser` - Word 文档解析
//! - `excel_exporter` - 测试用例导出为 xlsx
//! - `sql_tools` - 只读 SQL 工具
//! - `attachment` / `report` - 附件转文本、Markdown 文档
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个需求"的完整处理流程
//! - `Agent` - 单个 Agent 的工具调用循环
//! - `Supervisor` - GENERATE → REVIEW → EXPORT
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/registry` - 会话注册表
//! - `orchestrator/session` - 每个会话一个 actor，独占迭代状态
//!
//! ### ⑤ 接口层（API）
//! - `api/` - axum 路由：stream / invoke / history / download
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ChatMessage, ReviewResult, TestCase};
pub use orchestrator::{SessionRegistry, SessionSettings};
pub use workflow::{RunOutcome, Supervisor};
