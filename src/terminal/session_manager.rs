//! 本地 PTY 后端
//!
//! 在进程内管理所有 PTY 会话，实现 `TerminalBackend`。
//!
//! ## 功能
//! - 维护活跃会话的 HashMap（以调用方提供的会话 ID 为键）
//! - 同一 ID 重复创建时复用仍在运行的会话
//! - 进程退出后移除会话并发射关闭事件（仅限当前代次）
//! - 提供会话元数据查询

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::backend::{CreateOptions, TermSize, TerminalBackend};
use super::emitter::{EventBus, SessionSubscription};
use super::error::TerminalError;
use super::events::SessionStatus;
use super::pty_session::{ExitCallback, PtySession, PtySpawnOptions, DEFAULT_BACKLOG_MAX_BYTES};

/// 会话元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// 会话 ID
    pub id: String,
    /// 会话状态
    pub status: SessionStatus,
    /// 创建时间（Unix 时间戳，毫秒）
    pub created_at: i64,
    /// 工作目录
    pub cwd: PathBuf,
    /// 终端行数
    pub rows: u16,
    /// 终端列数
    pub cols: u16,
}

/// 本地后端参数
#[derive(Debug, Clone)]
pub struct LocalBackendOptions {
    /// 覆盖 `$SHELL`
    pub shell: Option<String>,
    /// 每个会话保留的历史输出上限
    pub backlog_max_bytes: usize,
}

impl Default for LocalBackendOptions {
    fn default() -> Self {
        Self {
            shell: None,
            backlog_max_bytes: DEFAULT_BACKLOG_MAX_BYTES,
        }
    }
}

struct SessionData {
    session: PtySession,
    metadata: SessionMetadata,
}

impl SessionData {
    fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            status: self.session.status(),
            ..self.metadata.clone()
        }
    }
}

type SessionMap = Arc<RwLock<HashMap<String, SessionData>>>;

/// 本地 PTY 后端
pub struct LocalPtyBackend {
    sessions: SessionMap,
    bus: EventBus,
    options: LocalBackendOptions,
    next_generation: AtomicU64,
}

impl LocalPtyBackend {
    pub fn new(options: LocalBackendOptions) -> Self {
        tracing::info!("[终端] 本地 PTY 后端已初始化");
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            bus: EventBus::new(),
            options,
            next_generation: AtomicU64::new(1),
        }
    }

    /// 获取单个会话信息
    pub fn get_session(&self, session_id: &str) -> Option<SessionMetadata> {
        self.sessions.read().get(session_id).map(SessionData::metadata)
    }

    /// 获取活跃会话数量
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// 进程退出回调：只有代次仍与当前会话一致时才移除会话
    pub(super) fn exit_callback(&self, session_id: &str) -> ExitCallback {
        let sessions = Arc::downgrade(&self.sessions);
        let id = session_id.to_string();
        Box::new(move |generation| {
            let Some(sessions) = sessions.upgrade() else {
                return false;
            };
            let mut sessions = sessions.write();
            match sessions.get(&id) {
                Some(data) if data.session.generation() == generation => {
                    sessions.remove(&id);
                    true
                }
                _ => {
                    tracing::debug!("[终端] 忽略会话 {} 过期代次 {} 的退出", id, generation);
                    false
                }
            }
        })
    }
}

impl Default for LocalPtyBackend {
    fn default() -> Self {
        Self::new(LocalBackendOptions::default())
    }
}

#[async_trait]
impl TerminalBackend for LocalPtyBackend {
    async fn create(
        &self,
        session_id: &str,
        options: &CreateOptions,
    ) -> Result<(), TerminalError> {
        let mut sessions = self.sessions.write();

        if let Some(existing) = sessions
            .get_mut(session_id)
            .filter(|data| data.session.is_running())
        {
            tracing::info!("[终端] 会话 {} 已存在，复用", session_id);
            existing.session.resize(options.size)?;
            existing.metadata.rows = options.size.rows;
            existing.metadata.cols = options.size.cols;
            return Ok(());
        }
        if let Some(stale) = sessions.remove(session_id) {
            let _ = stale.session.close();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let session = PtySession::spawn(
            session_id.to_string(),
            generation,
            PtySpawnOptions {
                cwd: &options.cwd,
                size: options.size,
                shell: self.options.shell.as_deref(),
                backlog_max_bytes: self.options.backlog_max_bytes,
            },
            Arc::new(self.bus.clone()),
            self.exit_callback(session_id),
        )?;

        let metadata = SessionMetadata {
            id: session_id.to_string(),
            status: SessionStatus::Running,
            created_at: Utc::now().timestamp_millis(),
            cwd: options.cwd.clone(),
            rows: options.size.rows,
            cols: options.size.cols,
        };
        sessions.insert(session_id.to_string(), SessionData { session, metadata });

        tracing::info!("[终端] 创建会话: {} ({})", session_id, options.size);
        Ok(())
    }

    async fn write(&self, session_id: &str, data: &str) -> Result<(), TerminalError> {
        let decoded = BASE64
            .decode(data)
            .map_err(|e| TerminalError::Base64DecodeFailed(e.to_string()))?;

        let sessions = self.sessions.read();
        let session_data = sessions
            .get(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;
        session_data.session.write(&decoded)
    }

    async fn resize(&self, session_id: &str, size: TermSize) -> Result<(), TerminalError> {
        let mut sessions = self.sessions.write();
        let session_data = sessions
            .get_mut(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;

        session_data.session.resize(size)?;
        session_data.metadata.rows = size.rows;
        session_data.metadata.cols = size.cols;
        Ok(())
    }

    async fn fetch_backlog(&self, session_id: &str) -> Result<Option<String>, TerminalError> {
        let sessions = self.sessions.read();
        Ok(sessions
            .get(session_id)
            .and_then(|data| data.session.output_history()))
    }

    async fn ping(&self, session_id: &str) -> Result<bool, TerminalError> {
        let sessions = self.sessions.read();
        Ok(sessions
            .get(session_id)
            .map(|data| data.session.is_running())
            .unwrap_or(false))
    }

    async fn close(&self, session_id: &str) -> Result<(), TerminalError> {
        let session_data = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| TerminalError::SessionNotFound(session_id.to_string()))?;

        session_data.session.close()?;
        tracing::info!("[终端] 关闭会话: {}", session_id);
        Ok(())
    }

    fn subscribe(&self, session_id: &str) -> SessionSubscription {
        self.bus.subscribe(session_id)
    }
}
