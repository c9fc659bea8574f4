//! 配置管理模块
//!
//! 提供 YAML 配置文件的加载、保存与默认值

mod path_utils;
mod types;
mod yaml;

pub use path_utils::{collapse_tilde, expand_tilde};
pub use types::{Config, LoggingConfig, PersistenceSettings, TerminalSettings};
pub use yaml::{ConfigError, ConfigManager};

#[cfg(test)]
mod tests;
