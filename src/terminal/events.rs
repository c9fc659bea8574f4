//! 终端事件定义
//!
//! ## 事件列表
//! - `SessionEvent` - 单个会话的后端事件流（输出、关闭）
//! - `TerminalOutputEvent` - 后端发射的输出数据
//! - `TerminalInterruptedEvent` - 用户发送中断字节时的应用级通知

use serde::{Deserialize, Serialize};

/// 后端会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// 正在连接
    Connecting,
    /// 运行中
    Running,
    /// 已结束
    Done,
    /// 错误
    Error,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Connecting
    }
}

/// 终端输出事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOutputEvent {
    /// 会话 ID
    pub session_id: String,
    /// 输出数据（Base64 编码）
    pub data: String,
}

/// 命令中断事件
///
/// 用户在终端中输入中断字节（默认 ETX）时发出，供“命令运行中”跟踪方清除忙碌状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalInterruptedEvent {
    /// 会话 ID
    pub session_id: String,
}

/// 单个会话的后端事件
///
/// 输出与关闭事件走同一条有序通道，关闭事件之前的输出不会被越过。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 输出块（Base64 编码）
    Output(String),
    /// 会话已结束，每个会话生命周期至多一次
    Closed,
}
