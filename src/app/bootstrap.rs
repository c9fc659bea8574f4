//! 应用启动引导模块
//!
//! 包含配置加载、日志初始化与后端、存储的创建。

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, ConfigError, ConfigManager};
use crate::session::{JsonFileRegistryStore, MemoryRegistryStore, RegistryStore};
use crate::terminal::LocalPtyBackend;

/// 启动所需的全部状态
pub struct AppStates {
    pub config: Config,
    pub backend: Arc<LocalPtyBackend>,
    pub store: Box<dyn RegistryStore>,
}

/// 加载配置
///
/// 未指定路径时使用默认配置文件路径；文件不存在时使用默认配置并写出该文件。
pub fn load_and_validate_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(ConfigManager::default_config_path);
    let manager = ConfigManager::load(&path)?;
    if !path.exists() {
        match manager.save() {
            Ok(()) => tracing::info!("[启动] 已写出默认配置: {}", path.display()),
            Err(e) => tracing::warn!("[启动] 写出默认配置失败: {}", e),
        }
    }
    let config = manager.config().clone();
    ConfigManager::validate(&config)?;
    Ok(config)
}

/// 初始化后端与注册表存储
pub fn init_states(config: &Config) -> AppStates {
    let backend = Arc::new(LocalPtyBackend::new(config.terminal.backend_options()));

    let store: Box<dyn RegistryStore> = if config.persistence.disabled {
        tracing::info!("[启动] 标签页持久化已关闭");
        Box::new(MemoryRegistryStore::new())
    } else {
        let dir = config.persistence.resolved_state_dir();
        tracing::info!("[启动] 标签页状态目录: {}", dir.display());
        Box::new(JsonFileRegistryStore::new(dir))
    };

    AppStates {
        config: config.clone(),
        backend,
        store,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_written_with_defaults() {
        let temp_dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = temp_dir.path().join("termhub").join("config.yaml");

        let config = load_and_validate_config(Some(path.as_path())).expect("加载应成功");
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = load_and_validate_config(Some(path.as_path())).expect("再次加载应成功");
        assert_eq!(reloaded, config);
        assert!(!path.with_extension("yaml.backup").exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "terminal:\n  heartbeat_interval_ms: 0\n").expect("写入文件失败");

        let err = load_and_validate_config(Some(path.as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
