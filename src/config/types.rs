//! 配置类型定义
//!
//! 所有字段带 serde 默认值，缺失的字段回退到默认配置。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::terminal::{
    ControllerOptions, LocalBackendOptions, TermSize, DEFAULT_BACKLOG_MAX_BYTES, DEFAULT_COLS,
    DEFAULT_INTERRUPT_BYTE, DEFAULT_ROWS,
};

/// 主配置结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// 终端会话配置
    #[serde(default)]
    pub terminal: TerminalSettings,
    /// 持久化配置
    #[serde(default)]
    pub persistence: PersistenceSettings,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 终端会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSettings {
    /// 心跳间隔（毫秒）
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// 容器未布局时的默认列数
    #[serde(default = "default_cols")]
    pub default_cols: u16,
    /// 容器未布局时的默认行数
    #[serde(default = "default_rows")]
    pub default_rows: u16,
    /// 中断字节（默认 3，即 Ctrl+C）
    #[serde(default = "default_interrupt_byte")]
    pub interrupt_byte: u8,
    /// 覆盖 `$SHELL`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// 每个会话保留的历史输出上限（字节）
    #[serde(default = "default_backlog_max_bytes")]
    pub backlog_max_bytes: usize,
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_cols() -> u16 {
    DEFAULT_COLS
}

fn default_rows() -> u16 {
    DEFAULT_ROWS
}

fn default_interrupt_byte() -> u8 {
    DEFAULT_INTERRUPT_BYTE
}

fn default_backlog_max_bytes() -> usize {
    DEFAULT_BACKLOG_MAX_BYTES
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            default_cols: default_cols(),
            default_rows: default_rows(),
            interrupt_byte: default_interrupt_byte(),
            shell: None,
            backlog_max_bytes: default_backlog_max_bytes(),
        }
    }
}

impl TerminalSettings {
    /// 转换为控制器参数
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            default_size: TermSize::new(self.default_cols.max(1), self.default_rows.max(1)),
            interrupt_byte: self.interrupt_byte,
        }
    }

    /// 转换为本地后端参数
    pub fn backend_options(&self) -> LocalBackendOptions {
        LocalBackendOptions {
            shell: self.shell.clone().filter(|s| !s.trim().is_empty()),
            backlog_max_bytes: self.backlog_max_bytes,
        }
    }
}

impl From<&TerminalSettings> for ControllerOptions {
    fn from(settings: &TerminalSettings) -> Self {
        settings.controller_options()
    }
}

/// 持久化配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// 标签页状态目录（支持 ~ 展开），为空时使用系统数据目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
    /// 关闭后不恢复标签页
    #[serde(default)]
    pub disabled: bool,
}

impl PersistenceSettings {
    /// 解析后的状态目录
    pub fn resolved_state_dir(&self) -> PathBuf {
        match self.state_dir.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(dir) => super::expand_tilde(dir),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("termhub"),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 是否输出 ANSI 颜色
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: default_ansi(),
        }
    }
}
