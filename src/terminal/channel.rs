//! 会话通道
//!
//! 绑定到单个会话 ID 的后端调用通道，克隆开销很小（共享后端 + ID）。

use std::path::PathBuf;
use std::sync::Arc;

use super::backend::{CreateOptions, TermSize, TerminalBackend};
use super::emitter::SessionSubscription;
use super::error::TerminalError;

#[derive(Clone)]
pub struct SessionChannel {
    backend: Arc<dyn TerminalBackend>,
    session_id: String,
}

impl SessionChannel {
    pub fn new(backend: Arc<dyn TerminalBackend>, session_id: impl Into<String>) -> Self {
        Self {
            backend,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> SessionSubscription {
        self.backend.subscribe(&self.session_id)
    }

    pub async fn create(&self, cwd: PathBuf, size: TermSize) -> Result<(), TerminalError> {
        let options = CreateOptions { cwd, size };
        self.backend.create(&self.session_id, &options).await
    }

    pub async fn probe(&self, size: TermSize) -> Result<(), TerminalError> {
        self.backend.probe(&self.session_id, size).await
    }

    pub async fn write(&self, encoded: &str) -> Result<(), TerminalError> {
        self.backend.write(&self.session_id, encoded).await
    }

    pub async fn resize(&self, size: TermSize) -> Result<(), TerminalError> {
        self.backend.resize(&self.session_id, size).await
    }

    pub async fn fetch_backlog(&self) -> Result<Option<String>, TerminalError> {
        self.backend.fetch_backlog(&self.session_id).await
    }

    pub async fn ping(&self) -> Result<bool, TerminalError> {
        self.backend.ping(&self.session_id).await
    }

    pub async fn close(&self) -> Result<(), TerminalError> {
        self.backend.close(&self.session_id).await
    }
}
