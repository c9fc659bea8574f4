//! termhub 命令行入口
//!
//! 用法: `termhub [配置文件路径]`

use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    termhub::app::run(config_path).await
}
