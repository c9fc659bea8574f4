//! 配置模块属性测试
//!
//! 使用 proptest 进行属性测试

use crate::config::{
    collapse_tilde, expand_tilde, Config, ConfigError, ConfigManager,
    LoggingConfig, PersistenceSettings, TerminalSettings,
};
use crate::terminal::TermSize;
use proptest::prelude::*;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

/// 生成随机的终端配置
fn arb_terminal_settings() -> impl Strategy<Value = TerminalSettings> {
    (
        1u64..60_000,
        1u16..500,
        1u16..200,
        any::<u8>(),
        proptest::option::of(prop_oneof![
            Just("/bin/bash".to_string()),
            Just("/bin/zsh".to_string()),
            Just("/usr/bin/fish".to_string()),
        ]),
        0usize..(8 * 1024 * 1024),
    )
        .prop_map(
            |(heartbeat_interval_ms, default_cols, default_rows, interrupt_byte, shell, backlog_max_bytes)| {
                TerminalSettings {
                    heartbeat_interval_ms,
                    default_cols,
                    default_rows,
                    interrupt_byte,
                    shell,
                    backlog_max_bytes,
                }
            },
        )
}

/// 生成随机的日志配置
fn arb_logging_config() -> impl Strategy<Value = LoggingConfig> {
    (
        prop_oneof![
            Just("trace".to_string()),
            Just("debug".to_string()),
            Just("info".to_string()),
            Just("warn".to_string()),
            Just("error".to_string()),
        ],
        any::<bool>(),
    )
        .prop_map(|(level, ansi)| LoggingConfig { level, ansi })
}

/// 生成随机的完整配置
fn arb_config() -> impl Strategy<Value = Config> {
    (
        arb_terminal_settings(),
        proptest::option::of("~/[a-z]{1,8}(/[a-z]{1,8}){0,2}"),
        any::<bool>(),
        arb_logging_config(),
    )
        .prop_map(|(terminal, state_dir, disabled, logging)| Config {
            terminal,
            persistence: PersistenceSettings {
                state_dir,
                disabled,
            },
            logging,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// 任意有效配置序列化后再解析应得到等价配置
    #[test]
    fn prop_config_roundtrip(config in arb_config()) {
        let yaml = ConfigManager::to_yaml(&config).expect("序列化应成功");
        let parsed = ConfigManager::parse_yaml(&yaml).expect("反序列化应成功");
        prop_assert_eq!(config, parsed);
    }

    /// 控制器参数与配置一一对应
    #[test]
    fn prop_controller_options_follow_settings(settings in arb_terminal_settings()) {
        let options = settings.controller_options();
        prop_assert_eq!(
            options.heartbeat_interval,
            Duration::from_millis(settings.heartbeat_interval_ms)
        );
        prop_assert_eq!(
            options.default_size,
            TermSize::new(settings.default_cols, settings.default_rows)
        );
        prop_assert_eq!(options.interrupt_byte, settings.interrupt_byte);
    }

    /// `~/path` 展开后再折叠应得到原路径
    #[test]
    fn prop_tilde_expand_collapse(path in "~/[a-z]{1,8}(/[a-z]{1,8}){0,3}") {
        prop_assume!(dirs::home_dir().is_some());
        let expanded = expand_tilde(&path);
        prop_assert!(!expanded.to_string_lossy().starts_with('~'));
        prop_assert_eq!(collapse_tilde(&expanded), path);
    }
}

// ============================================================================
// 默认值测试
// ============================================================================

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.terminal.heartbeat_interval_ms, 5000);
    assert_eq!(config.terminal.default_cols, 80);
    assert_eq!(config.terminal.default_rows, 24);
    assert_eq!(config.terminal.interrupt_byte, 3);
    assert_eq!(config.terminal.backlog_max_bytes, 2 * 1024 * 1024);
    assert!(config.terminal.shell.is_none());
    assert_eq!(config.logging.level, "info");
    assert!(!config.persistence.disabled);
}

#[test]
fn test_partial_yaml_uses_defaults() {
    let yaml = r#"
terminal:
  heartbeat_interval_ms: 1000
logging:
  level: debug
"#;
    let config = ConfigManager::parse_yaml(yaml).expect("解析应成功");
    assert_eq!(config.terminal.heartbeat_interval_ms, 1000);
    assert_eq!(config.terminal.default_cols, 80);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.ansi);
}

#[test]
fn test_empty_yaml_is_default() {
    let config = ConfigManager::parse_yaml("{}").expect("解析应成功");
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_yaml_is_parse_error() {
    let err = ConfigManager::parse_yaml("terminal: [unclosed").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_zero_heartbeat_is_rejected() {
    let err = ConfigManager::parse_yaml("terminal:\n  heartbeat_interval_ms: 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn test_backend_options_ignore_blank_shell() {
    let settings = TerminalSettings {
        shell: Some("  ".to_string()),
        ..TerminalSettings::default()
    };
    assert!(settings.backend_options().shell.is_none());

    let settings = TerminalSettings {
        shell: Some("/bin/zsh".to_string()),
        backlog_max_bytes: 1024,
        ..TerminalSettings::default()
    };
    let options = settings.backend_options();
    assert_eq!(options.shell.as_deref(), Some("/bin/zsh"));
    assert_eq!(options.backlog_max_bytes, 1024);
}

#[test]
fn test_persistence_state_dir_expands_tilde() {
    let settings = PersistenceSettings {
        state_dir: Some("/var/lib/termhub".to_string()),
        disabled: false,
    };
    assert_eq!(
        settings.resolved_state_dir(),
        std::path::PathBuf::from("/var/lib/termhub")
    );

    if let Some(home) = dirs::home_dir() {
        let settings = PersistenceSettings {
            state_dir: Some("~/.termhub".to_string()),
            disabled: false,
        };
        assert_eq!(settings.resolved_state_dir(), home.join(".termhub"));
    }
}

// ============================================================================
// 文件读写测试
// ============================================================================

#[test]
fn test_load_missing_file_returns_default() {
    let temp_dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = temp_dir.path().join("absent.yaml");
    let manager = ConfigManager::load(&path).expect("加载应成功");
    assert_eq!(manager.config(), &Config::default());
    assert_eq!(manager.config_path(), path.as_path());
}

#[test]
fn test_load_from_file() {
    let mut temp_file = NamedTempFile::new().expect("创建临时文件失败");
    temp_file
        .write_all(b"terminal:\n  default_cols: 132\n  shell: /bin/sh\n")
        .expect("写入文件失败");

    let manager = ConfigManager::load(temp_file.path()).expect("加载应成功");
    assert_eq!(manager.config().terminal.default_cols, 132);
    assert_eq!(manager.config().terminal.shell.as_deref(), Some("/bin/sh"));
}

#[test]
fn test_save_creates_parent_dirs_and_backup() {
    let temp_dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = temp_dir.path().join("nested").join("config.yaml");

    let manager = ConfigManager::load(&path).expect("加载应成功");
    manager.save().expect("首次保存应成功");
    assert!(path.exists());
    assert!(!path.with_extension("yaml.backup").exists());

    std::fs::write(&path, "terminal:\n  default_rows: 50\n").expect("写入文件失败");
    let edited = ConfigManager::load(&path).expect("加载应成功");
    assert_eq!(edited.config().terminal.default_rows, 50);
    edited.save().expect("再次保存应成功");

    let backup = std::fs::read_to_string(path.with_extension("yaml.backup")).expect("读取备份失败");
    assert_eq!(backup, "terminal:\n  default_rows: 50\n");
    let reloaded = ConfigManager::load(&path).expect("重新加载应成功");
    assert_eq!(reloaded.config().terminal.default_rows, 50);
}
