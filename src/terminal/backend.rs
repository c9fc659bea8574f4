//! 终端后端接口
//!
//! 会话层消费的后端能力。实际的 PTY 进程管理在后端完成，
//! 会话层只通过此 trait 访问，传输方式不做约定。

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::emitter::SessionSubscription;
use super::error::TerminalError;

/// 默认终端行数
pub const DEFAULT_ROWS: u16 = 24;
/// 默认终端列数
pub const DEFAULT_COLS: u16 = 80;

/// 终端尺寸（列 x 行）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self::new(DEFAULT_COLS, DEFAULT_ROWS)
    }
}

impl std::fmt::Display for TermSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// 创建会话参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptions {
    /// 工作目录
    pub cwd: PathBuf,
    /// 初始尺寸
    #[serde(flatten)]
    pub size: TermSize,
}

/// 终端后端
///
/// 所有调用以会话 ID 作为关联键。写入数据与输出事件均为 Base64 编码文本。
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// 创建会话；ID 已在运行时应视为成功
    async fn create(&self, session_id: &str, options: &CreateOptions)
        -> Result<(), TerminalError>;

    /// 重连探测：后端仍持有该会话时成功
    ///
    /// 默认以调整大小作为探测。
    async fn probe(&self, session_id: &str, size: TermSize) -> Result<(), TerminalError> {
        self.resize(session_id, size).await
    }

    /// 写入编码后的输入
    async fn write(&self, session_id: &str, data: &str) -> Result<(), TerminalError>;

    /// 调整大小（尽力而为）
    async fn resize(&self, session_id: &str, size: TermSize) -> Result<(), TerminalError>;

    /// 获取历史输出快照（编码后），无历史时返回 `None`
    async fn fetch_backlog(&self, session_id: &str) -> Result<Option<String>, TerminalError>;

    /// 存活探测
    async fn ping(&self, session_id: &str) -> Result<bool, TerminalError>;

    /// 请求终止会话（尽力而为）
    async fn close(&self, session_id: &str) -> Result<(), TerminalError>;

    /// 订阅单个会话的输出与关闭事件
    fn subscribe(&self, session_id: &str) -> SessionSubscription;
}
