//! 应用入口模块
//!
//! ## 模块结构
//! - `bootstrap` - 配置加载与状态初始化
//! - `console` - 行模式控制台呈现面
//! - `runner` - 主循环

pub mod bootstrap;
pub mod console;
pub mod runner;

pub use bootstrap::{init_states, load_and_validate_config, AppStates};
pub use console::{ConsoleCommand, ConsoleSurface};
pub use runner::run;
