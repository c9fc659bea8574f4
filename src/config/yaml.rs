//! YAML 配置文件支持
//!
//! 提供 YAML 配置的加载、保存和管理功能

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::Config;

/// 配置错误类型
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("配置读取错误: {0}")]
    ReadError(String),
    /// 文件写入错误
    #[error("配置写入错误: {0}")]
    WriteError(String),
    /// YAML 解析错误
    #[error("YAML 解析错误: {0}")]
    ParseError(String),
    /// YAML 序列化错误
    #[error("YAML 序列化错误: {0}")]
    SerializeError(String),
    /// 配置验证错误
    #[error("配置验证错误: {0}")]
    ValidationError(String),
}

/// 配置管理器
///
/// 管理 YAML 配置文件的加载与保存
#[derive(Debug)]
pub struct ConfigManager {
    /// 当前配置
    config: Config,
    /// 配置文件路径
    config_path: PathBuf,
}

impl ConfigManager {
    /// 从文件加载配置
    ///
    /// 如果文件不存在，返回默认配置
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
            Self::parse_yaml(&content)?
        } else {
            tracing::info!("[配置] 配置文件 {} 不存在，使用默认配置", path.display());
            Config::default()
        };

        Ok(Self {
            config,
            config_path: path.to_path_buf(),
        })
    }

    /// 从 YAML 字符串解析配置
    pub fn parse_yaml(yaml: &str) -> Result<Config, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// 将配置序列化为 YAML 字符串
    pub fn to_yaml(config: &Config) -> Result<String, ConfigError> {
        serde_yaml::to_string(config).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// 校验取值范围
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let terminal = &config.terminal;
        if terminal.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "terminal.heartbeat_interval_ms 必须大于 0".to_string(),
            ));
        }
        if terminal.default_cols == 0 || terminal.default_rows == 0 {
            return Err(ConfigError::ValidationError(
                "terminal.default_cols / default_rows 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 保存配置到文件
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&self.config_path)
    }

    /// 保存配置到指定路径
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // 确保父目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        if path.exists() {
            let backup_path = path.with_extension("yaml.backup");
            let _ = std::fs::copy(path, backup_path);
        }
        let yaml = Self::to_yaml(&self.config)?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    /// 获取当前配置
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 获取配置文件路径
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 获取默认配置文件路径
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termhub")
            .join("config.yaml")
    }
}
