//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责会话管理和请求调度，是 HTTP 接口与生成流程之间的"调度中心"。
//!
//! ## 模块划分
//!
//! ### `registry` - 会话注册表
//! - 按 `thread_id` 查找或创建会话
//! - 缺少 `thread_id` 时分配新的 UUID
//! - 未知会话的历史为空
//! - 创建会话时清理已退出的句柄
//!
//! ### `session` - 单个会话
//! - 每个会话一个后台任务，独占迭代状态和消息历史
//! - 通过 mpsc 接收命令，通过 oneshot 返回结果
//! - 进入流程前把附件转换为文本
//! - 空闲超时后自行退出
//!
//! ## 层次关系
//!
//! ```text
//! api (HTTP 处理函数)
//!     ↓
//! registry (thread_id → SessionHandle)
//!     ↓
//! session (每个会话一个 actor)
//!     ↓
//! workflow::Supervisor (GENERATE → REVIEW → EXPORT)
//!     ↓
//! services (能力层：word / excel / sql / report)
//! ```
//!
//! ## 设计原则
//!
//! 1. **会话隔离**：同一会话串行，不同会话并行
//! 2. **状态归属**：迭代状态只属于会话任务，没有全局状态
//! 3. **无业务逻辑**：只做调度，不做生成或评审判断

pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
pub use session::{SessionHandle, SessionSettings};
