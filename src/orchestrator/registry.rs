//! 会话注册表 - 编排层
//!
//! `thread_id` → 会话句柄。没有 `thread_id` 的请求分配新的 UUID。
//! 会话任务空闲超时或意外退出后，句柄在下一次创建会话时被清理；
//! 再次访问同一 `thread_id` 会启动一个全新的会话。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::session::{SessionHandle, SessionSettings};
use crate::error::AppResult;
use crate::models::ChatMessage;
use crate::workflow::Supervisor;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
    supervisor: Supervisor,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(supervisor: Supervisor, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            supervisor,
            settings,
        }
    }

    /// 取得会话，不存在时创建
    pub async fn get_or_create(&self, thread_id: Option<&str>) -> SessionHandle {
        let thread_id = match thread_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(&thread_id).filter(|h| !h.is_closed()) {
            return handle.clone();
        }

        // 顺带清理已退出的会话
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_closed());
        if sessions.len() < before {
            debug!("清理 {} 个已退出的会话", before - sessions.len());
        }

        let handle = SessionHandle::spawn(thread_id.clone(), self.supervisor.clone(), self.settings);
        sessions.insert(thread_id.clone(), handle.clone());
        info!("[会话 {}] 🆕 创建会话，当前共 {} 个", thread_id, sessions.len());
        handle
    }

    /// 会话历史；未知或已释放的会话返回空列表
    pub async fn history(&self, thread_id: &str) -> AppResult<Vec<ChatMessage>> {
        let handle = self
            .sessions
            .lock()
            .await
            .get(thread_id)
            .filter(|h| !h.is_closed())
            .cloned();
        match handle {
            Some(handle) => handle.history().await,
            None => Ok(Vec::new()),
        }
    }

    /// 当前登记的会话数（包括尚未清理的已退出会话）
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
