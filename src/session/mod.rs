//! 多会话管理
//!
//! 标签页身份的注册、持久化与控制器调度。
//!
//! ## 模块结构
//! - `descriptor` - 会话描述符
//! - `store` - 持久化存储端口与实现
//! - `registry` - 会话注册表
//! - `multiplexer` - 控制器多路复用

pub mod descriptor;
pub mod multiplexer;
pub mod registry;
pub mod store;


pub use descriptor::{default_title, SessionDescriptor};
pub use multiplexer::SessionMultiplexer;
pub use registry::{CloseOptions, SessionRegistry};
pub use store::{
    JsonFileRegistryStore, MemoryRegistryStore, RegistryStore, StoreError, REGISTRY_STORAGE_KEY,
};
