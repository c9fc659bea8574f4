//! 日志初始化
//!
//! 基于 `tracing-subscriber` 的 fmt 输出，级别来自 `LoggingConfig`，
//! 设置了 `RUST_LOG` 时以环境变量为准。

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// 由配置构建过滤器
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::try_new(&config.level).unwrap_or_else(|e| {
        eprintln!("[日志] 无效的日志级别 {:?}: {}，改用 info", config.level, e);
        EnvFilter::new("info")
    })
}

/// 安装全局订阅者
///
/// 已安装时返回 `false`（例如测试中重复调用）。
pub fn init(config: &LoggingConfig) -> bool {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        let config = LoggingConfig {
            level: "termhub=debug,warn".to_string(),
            ansi: false,
        };
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            let rendered = build_filter(&config).to_string();
            assert!(rendered.contains("termhub=debug"));
            assert!(rendered.contains("warn"));
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        let first = init(&config);
        let second = init(&config);
        assert!(!(first && second));
    }
}
