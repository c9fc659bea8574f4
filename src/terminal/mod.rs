//! 终端会话层
//!
//! 会话层负责创建、重连、流式输出、调整大小、自愈和关闭后端 PTY 会话。
//! 后端通过 `TerminalBackend` trait 访问，呈现通过 `TerminalSurface` trait 完成。
//!
//! ## 模块结构
//! - `error` - 错误类型定义
//! - `events` - 会话事件定义
//! - `emitter` - 事件发射器与进程内事件总线
//! - `codec` - Base64 通道编解码
//! - `backend` - 后端接口
//! - `channel` - 绑定单个会话 ID 的调用通道
//! - `pending` - 历史加载前的输出队列
//! - `surface` - 呈现层接口与会话通知
//! - `controller` - 单会话状态机
//! - `pty_session` - 本地 PTY 会话封装
//! - `session_manager` - 本地 PTY 后端
//!
//! ## 使用示例
//! ```ignore
//! use termhub::terminal::{ControllerOptions, LocalPtyBackend, SessionController};
//!
//! let backend = Arc::new(LocalPtyBackend::default());
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let handle = SessionController::spawn(descriptor, backend, surface, ControllerOptions::default(), tx);
//! handle.send_input(b"ls -la\n".to_vec());
//! ```

pub mod backend;
pub mod channel;
pub mod codec;
pub mod controller;
pub mod emitter;
pub mod error;
pub mod events;
pub mod pending;
pub mod pty_session;
pub mod session_manager;
pub mod surface;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出常用类型
pub use backend::{CreateOptions, TermSize, TerminalBackend, DEFAULT_COLS, DEFAULT_ROWS};
pub use channel::SessionChannel;
pub use codec::ChannelCodec;
pub use controller::{
    CloseReason, ControllerEvent, ControllerOptions, ControllerSnapshot, SessionController,
    SessionHandle, SessionPhase, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_INTERRUPT_BYTE,
};
pub use emitter::{DynEmitter, EventBus, SessionSubscription, TerminalEventEmitter};
pub use error::TerminalError;
pub use events::{SessionEvent, SessionStatus, TerminalInterruptedEvent, TerminalOutputEvent};
pub use pending::PendingChunks;
pub use pty_session::{PtySession, DEFAULT_BACKLOG_MAX_BYTES};
pub use session_manager::{LocalBackendOptions, LocalPtyBackend, SessionMetadata};
pub use surface::{SessionNotice, SurfaceFactory, SurfaceMetrics, TerminalSurface};
