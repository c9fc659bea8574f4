//! termhub - 终端会话层
//!
//! 创建、重连、流式输出、调整大小、自愈和关闭 PTY 会话，
//! 并以标签页形式管理多个会话，重启后可恢复。

// 核心模块
pub mod session;
pub mod terminal;

// 外围模块
pub mod app;
pub mod config;
pub mod logger;

pub use session::{SessionDescriptor, SessionMultiplexer, SessionRegistry};
pub use terminal::{SessionController, SessionHandle, TerminalBackend, TerminalError};

// 重新导出 run 函数
pub use app::run;
