//! 注册表持久化存储
//!
//! 注册表只通过 `RegistryStore` 读写字符串值，存储介质由调用方注入。
//!
//! ## 实现
//! - `MemoryRegistryStore` - 进程内存储（测试与无持久化场景）
//! - `JsonFileRegistryStore` - 数据目录下每个键一个 JSON 文件

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// 注册表状态的存储键
pub const REGISTRY_STORAGE_KEY: &str = "terminal_page_state";

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 文件读写失败
    #[error("存储 I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 键包含非法字符
    #[error("非法的存储键: {0}")]
    InvalidKey(String),
}

/// 键值存储端口
pub trait RegistryStore: Send + Sync {
    /// 读取键对应的值，不存在时返回 `None`
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 写入键值
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// 删除键，不存在时视为成功
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// 内存存储
///
/// 克隆后共享同一份数据。
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以初始值创建
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.entries.lock().insert(key.to_string(), value.to_string());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON 文件存储
#[derive(Debug, Clone)]
pub struct JsonFileRegistryStore {
    dir: PathBuf,
}

impl JsonFileRegistryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 键对应的文件路径
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl RegistryStore for JsonFileRegistryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // 先写临时文件再重命名
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
