//! 呈现层接口
//!
//! 转义序列的渲染交给外部终端组件，会话层只需要：
//! - 测量容器以推导终端尺寸
//! - 写入解码后的字节
//! - 显示会话通知（断开、重连、退出、错误）
//! - 卸载时释放

use super::backend::TermSize;
use crate::session::SessionDescriptor;

/// 最小列数
pub const MIN_COLS: u16 = 2;
/// 最小行数
pub const MIN_ROWS: u16 = 1;

/// 呈现容器的测量结果（像素）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceMetrics {
    pub width: f32,
    pub height: f32,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl SurfaceMetrics {
    /// 由容器与字符单元大小推导终端尺寸
    ///
    /// 容器尚未布局（任一尺寸为 0）时返回 `fallback`。
    pub fn fit(&self, fallback: TermSize) -> TermSize {
        if self.width <= 0.0
            || self.height <= 0.0
            || self.cell_width <= 0.0
            || self.cell_height <= 0.0
        {
            return fallback;
        }
        let cols = (self.width / self.cell_width).floor() as u32;
        let rows = (self.height / self.cell_height).floor() as u32;
        TermSize::new(
            cols.clamp(MIN_COLS as u32, u16::MAX as u32) as u16,
            rows.clamp(MIN_ROWS as u32, u16::MAX as u32) as u16,
        )
    }
}

/// 会话通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// 心跳失败，正在重连
    Disconnected,
    /// 重连成功
    Reconnected,
    /// 重连失败，下一次心跳重试
    ReconnectFailed(String),
    /// 后端进程已退出
    Exited,
    /// 初始化错误
    Error(String),
}

impl SessionNotice {
    /// 渲染为带颜色的终端文本
    pub fn render(&self) -> String {
        match self {
            Self::Disconnected => "\r\n\x1b[33m[连接已断开，正在尝试重连...]\x1b[0m\r\n".to_string(),
            Self::Reconnected => "\r\n\x1b[32m[重连成功]\x1b[0m\r\n".to_string(),
            Self::ReconnectFailed(reason) => {
                format!("\r\n\x1b[31m[重连失败] {}\x1b[0m\r\n", reason)
            }
            Self::Exited => "\r\n\x1b[33m[进程已退出]\x1b[0m\r\n".to_string(),
            Self::Error(reason) => format!("\r\n\x1b[31m错误: {}\x1b[0m\r\n", reason),
        }
    }
}

/// 终端呈现面
pub trait TerminalSurface: Send + 'static {
    /// 测量容器
    fn measure(&mut self) -> SurfaceMetrics;

    /// 写入解码后的输出
    fn write(&mut self, data: &[u8]);

    /// 显示会话通知，默认以彩色文本写入
    fn show_notice(&mut self, notice: &SessionNotice) {
        self.write(notice.render().as_bytes());
    }

    /// 释放呈现资源
    fn release(&mut self) {}
}

/// 为每个标签页创建呈现面
pub trait SurfaceFactory: Send {
    fn create(&mut self, descriptor: &SessionDescriptor) -> Box<dyn TerminalSurface>;
}

impl<F> SurfaceFactory for F
where
    F: FnMut(&SessionDescriptor) -> Box<dyn TerminalSurface> + Send,
{
    fn create(&mut self, descriptor: &SessionDescriptor) -> Box<dyn TerminalSurface> {
        self(descriptor)
    }
}
