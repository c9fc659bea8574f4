//! 行模式控制台
//!
//! 标准输入逐行读取：以 `:` 开头的是标签页命令，其余内容加换行后发送到活跃会话。
//! 只有活跃标签页的输出写到标准输出。
//!
//! ## 命令
//! - `:new [目录]` - 新建标签页
//! - `:tab <ID 或序号>` - 切换标签页
//! - `:close [ID]` - 关闭标签页（默认活跃标签页）
//! - `:list` - 列出标签页
//! - `:int` - 发送 Ctrl+C
//! - `:quit` - 退出（后端会话保留）
//! - `::文本` - 发送以 `:` 开头的文本

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::terminal::{SurfaceMetrics, TerminalSurface};

/// 控制台命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    New(Option<PathBuf>),
    Tab(String),
    Close(Option<String>),
    List,
    Interrupt,
    Quit,
    Input(String),
}

impl ConsoleCommand {
    /// 解析一行输入
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        if let Some(literal) = line.strip_prefix("::") {
            return Ok(Self::Input(format!(":{}", literal)));
        }
        let Some(command) = line.strip_prefix(':') else {
            return Ok(Self::Input(line.to_string()));
        };

        let mut parts = command.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        match name {
            "new" => Ok(Self::New(arg.map(|dir| crate::config::expand_tilde(&dir)))),
            "tab" => arg
                .map(Self::Tab)
                .ok_or_else(|| "用法: :tab <ID 或序号>".to_string()),
            "close" => Ok(Self::Close(arg)),
            "list" => Ok(Self::List),
            "int" => Ok(Self::Interrupt),
            "quit" | "q" => Ok(Self::Quit),
            other => Err(format!("未知命令: :{}", other)),
        }
    }
}

/// 控制台呈现面
pub struct ConsoleSurface {
    session_id: String,
    active: Arc<Mutex<Option<String>>>,
}

impl ConsoleSurface {
    /// `active` 由主循环维护，保存当前活跃的会话 ID
    pub fn new(session_id: impl Into<String>, active: Arc<Mutex<Option<String>>>) -> Self {
        Self {
            session_id: session_id.into(),
            active,
        }
    }

    fn is_active(&self) -> bool {
        self.active.lock().as_deref() == Some(self.session_id.as_str())
    }
}

/// 从 `COLUMNS` / `LINES` 环境变量读取终端尺寸，缺失时返回未布局的度量
pub fn env_metrics() -> SurfaceMetrics {
    let read = |name: &str| {
        std::env::var(name)
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .map(f32::from)
    };
    match (read("COLUMNS"), read("LINES")) {
        (Some(cols), Some(rows)) => SurfaceMetrics {
            width: cols,
            height: rows,
            cell_width: 1.0,
            cell_height: 1.0,
        },
        _ => SurfaceMetrics::default(),
    }
}

impl TerminalSurface for ConsoleSurface {
    fn measure(&mut self) -> SurfaceMetrics {
        env_metrics()
    }

    fn write(&mut self, data: &[u8]) {
        if !self.is_active() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(data).and_then(|_| stdout.flush()) {
            tracing::debug!("[控制台] 写入标准输出失败: {}", e);
        }
    }

    fn release(&mut self) {
        tracing::debug!("[控制台] 释放会话 {} 的呈现面", self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_input() {
        assert_eq!(
            ConsoleCommand::parse("ls -la\n").unwrap(),
            ConsoleCommand::Input("ls -la".to_string())
        );
        assert_eq!(
            ConsoleCommand::parse("::echo").unwrap(),
            ConsoleCommand::Input(":echo".to_string())
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ConsoleCommand::parse(":new /tmp").unwrap(),
            ConsoleCommand::New(Some(PathBuf::from("/tmp")))
        );
        assert_eq!(ConsoleCommand::parse(":new").unwrap(), ConsoleCommand::New(None));
        assert_eq!(
            ConsoleCommand::parse(":tab 2").unwrap(),
            ConsoleCommand::Tab("2".to_string())
        );
        assert_eq!(ConsoleCommand::parse(":close").unwrap(), ConsoleCommand::Close(None));
        assert_eq!(ConsoleCommand::parse(":list").unwrap(), ConsoleCommand::List);
        assert_eq!(ConsoleCommand::parse(":int").unwrap(), ConsoleCommand::Interrupt);
        assert_eq!(ConsoleCommand::parse(":q").unwrap(), ConsoleCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse(":tab").is_err());
        assert!(ConsoleCommand::parse(":bogus").is_err());
    }

    #[test]
    fn test_surface_writes_only_when_active() {
        let active = Arc::new(Mutex::new(Some("other".to_string())));
        let surface = ConsoleSurface::new("mine", active.clone());
        assert!(!surface.is_active());
        *active.lock() = Some("mine".to_string());
        assert!(surface.is_active());
    }
}
