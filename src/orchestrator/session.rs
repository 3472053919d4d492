//! 单个会话 - 编排层
//!
//! ## 职责
//!
//! 每个 `thread_id` 对应一个后台任务（actor），独占该会话的迭代状态和消息历史。
//! HTTP 处理函数通过 mpsc 发送命令，通过 oneshot 接收结果。
//!
//! - 同一会话的请求严格按到达顺序处理
//! - 不同会话互不阻塞
//! - 工具函数直接借用 actor 持有的状态，不存在全局共享的草稿状态
//! - 空闲超过 `idle_timeout` 后任务退出，释放状态和历史

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, SessionError};
use crate::models::{Attachment, ChatMessage};
use crate::services::merge_attachments;
use crate::workflow::{EventSender, IterationState, Supervisor};

const COMMAND_BUFFER: usize = 32;

/// 会话参数
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_iterations: u32,
    /// 连续这么久没有收到命令，会话任务退出
    pub idle_timeout: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_iterations: config.max_iterations,
            idle_timeout: Duration::from_secs(config.session_idle_secs),
        }
    }
}

enum SessionCommand {
    Run {
        content: String,
        attachments: Vec<Attachment>,
        events: Option<EventSender>,
        reply: oneshot::Sender<AppResult<ChatMessage>>,
    },
    History {
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
}

/// 会话句柄，可随意克隆
#[derive(Clone)]
pub struct SessionHandle {
    thread_id: String,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// 启动会话任务
    pub fn spawn(thread_id: impl Into<String>, supervisor: Supervisor, settings: SessionSettings) -> Self {
        let thread_id = thread_id.into();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = SessionActor {
            thread_id: thread_id.clone(),
            supervisor,
            settings,
            state: IterationState::default(),
            history: Vec::new(),
            rx,
        };
        tokio::spawn(actor.run());
        debug!("[会话 {}] 会话任务已启动", thread_id);
        Self { thread_id, tx }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// 会话任务是否已退出（空闲超时或异常）
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 提交一条用户消息并等待整个流程结束，返回最终回复
    pub async fn run(
        &self,
        content: String,
        attachments: Vec<Attachment>,
        events: Option<EventSender>,
    ) -> AppResult<ChatMessage> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Run {
            content,
            attachments,
            events,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// 会话的全部消息
    pub async fn history(&self) -> AppResult<Vec<ChatMessage>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::History { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    async fn send(&self, command: SessionCommand) -> AppResult<()> {
        self.tx.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> AppError {
        SessionError::Closed {
            thread_id: self.thread_id.clone(),
        }
        .into()
    }
}

struct SessionActor {
    thread_id: String,
    supervisor: Supervisor,
    settings: SessionSettings,
    state: IterationState,
    history: Vec<ChatMessage>,
    rx: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let next = tokio::time::timeout(self.settings.idle_timeout, self.rx.recv()).await;
            let command = match next {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(_) => {
                    info!("[会话 {}] 💤 空闲超时，释放会话", self.thread_id);
                    // 关闭后仍会取出已排队的命令，之后 recv 返回 None
                    self.rx.close();
                    continue;
                }
            };
            match command {
                SessionCommand::Run {
                    content,
                    attachments,
                    events,
                    reply,
                } => {
                    let result = self.handle_run(content, attachments, events.as_ref()).await;
                    // 调用方已放弃等待时结果只保留在历史中
                    let _ = reply.send(result);
                }
                SessionCommand::History { reply } => {
                    let _ = reply.send(self.history.clone());
                }
            }
        }
        debug!("[会话 {}] 会话任务退出", self.thread_id);
    }

    async fn handle_run(
        &mut self,
        content: String,
        attachments: Vec<Attachment>,
        events: Option<&EventSender>,
    ) -> AppResult<ChatMessage> {
        let requirement = if attachments.is_empty() {
            content
        } else {
            info!(
                "[会话 {}] 📎 处理 {} 个附件",
                self.thread_id,
                attachments.len()
            );
            tokio::task::spawn_blocking(move || merge_attachments(&content, &attachments))
                .await
                .map_err(|e| AppError::Other(format!("附件处理任务异常退出: {}", e)))?
        };
        if requirement.trim().is_empty() {
            return Err(SessionError::EmptyInput.into());
        }

        self.history.push(ChatMessage::human(requirement.clone()));
        self.state = IterationState::new(requirement, self.settings.max_iterations);

        match self
            .supervisor
            .run(&self.thread_id, &mut self.state, events)
            .await
        {
            Ok(outcome) => {
                self.history.extend(outcome.messages);
                self.history
                    .last()
                    .cloned()
                    .ok_or_else(|| AppError::Other("流程没有产生任何消息".to_string()))
            }
            Err(e) => {
                error!("[会话 {}] ❌ 流程失败: {}", self.thread_id, e);
                self.history
                    .push(ChatMessage::ai(format!("测试用例生成失败: {}", e)));
                Err(e)
            }
        }
    }
}
