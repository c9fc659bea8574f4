//! 应用运行器模块
//!
//! 主循环：读取标准输入、处理控制器通知、响应 Ctrl+C。

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::bootstrap::{self, AppStates};
use super::console::{ConsoleCommand, ConsoleSurface};
use crate::logger;
use crate::session::{SessionDescriptor, SessionMultiplexer, SessionRegistry};
use crate::terminal::{
    ChannelCodec, ControllerEvent, LocalPtyBackend, TerminalBackend, TerminalSurface,
    DEFAULT_INTERRUPT_BYTE,
};

/// 运行控制台应用
///
/// 1. 加载配置并初始化日志
/// 2. 创建本地后端与注册表存储
/// 3. 恢复上次的标签页（没有时新建一个）
/// 4. 进入主循环，直到 `:quit`、Ctrl+C、标准输入结束或最后一个标签页关闭
pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = bootstrap::load_and_validate_config(config_path.as_deref())
        .context("加载配置失败")?;
    logger::init(&config.logging);

    let AppStates {
        config,
        backend,
        store,
    } = bootstrap::init_states(&config);

    let active: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let surface_active = active.clone();
    let surfaces = move |descriptor: &SessionDescriptor| -> Box<dyn TerminalSurface> {
        Box::new(ConsoleSurface::new(descriptor.id.clone(), surface_active.clone()))
    };

    let dyn_backend: Arc<dyn TerminalBackend> = backend.clone();
    let registry = SessionRegistry::load(store, dyn_backend.clone());
    let mut multiplexer = SessionMultiplexer::new(
        registry,
        dyn_backend.clone(),
        surfaces,
        config.terminal.controller_options(),
    );

    sync_active(&multiplexer, &active);
    multiplexer.restore();
    if multiplexer.registry().is_empty() {
        multiplexer.open_tab(None, current_dir());
    }
    sync_active(&multiplexer, &active);
    print_tabs(&multiplexer, &backend);

    let mut interrupts = multiplexer.subscribe_interrupts();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[主循环] 收到 Ctrl+C，退出");
                break;
            }
            Some(event) = multiplexer.recv_event() => {
                if !multiplexer.apply_event(&event).await {
                    continue;
                }
                if let ControllerEvent::Closed { session_id, reason, .. } = event {
                    eprintln!("[标签页 {} 已关闭: {:?}]", session_id, reason);
                    sync_active(&multiplexer, &active);
                    if multiplexer.registry().is_empty() {
                        tracing::info!("[主循环] 所有标签页已关闭");
                        break;
                    }
                    replay_active(&multiplexer, dyn_backend.as_ref()).await;
                }
            }
            Ok(interrupted) = interrupts.recv() => {
                tracing::debug!("[主循环] 会话 {} 已中断", interrupted.session_id);
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!("[主循环] 标准输入已结束");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("[主循环] 读取标准输入失败: {}", e);
                        break;
                    }
                };
                match ConsoleCommand::parse(&line) {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => {
                        handle_command(&mut multiplexer, &backend, &active, command).await;
                        if multiplexer.registry().is_empty() {
                            break;
                        }
                    }
                    Err(message) => eprintln!("{}", message),
                }
            }
        }
    }

    multiplexer.shutdown().await;
    Ok(())
}

async fn handle_command(
    multiplexer: &mut SessionMultiplexer,
    backend: &LocalPtyBackend,
    active: &Arc<Mutex<Option<String>>>,
    command: ConsoleCommand,
) {
    match command {
        ConsoleCommand::Input(text) => match multiplexer.active_handle() {
            Some(handle) => handle.send_input(format!("{}\n", text).into_bytes()),
            None => eprintln!("[没有活跃的标签页]"),
        },
        ConsoleCommand::Interrupt => {
            if let Some(handle) = multiplexer.active_handle() {
                handle.send_input(vec![DEFAULT_INTERRUPT_BYTE]);
            }
        }
        ConsoleCommand::New(dir) => {
            let id = multiplexer.open_tab(None, dir.unwrap_or_else(current_dir));
            sync_active(multiplexer, active);
            eprintln!("[已新建标签页 {}]", id);
        }
        ConsoleCommand::Tab(target) => match resolve_tab(multiplexer, &target) {
            Some(id) => {
                multiplexer.activate(&id);
                sync_active(multiplexer, active);
                replay_active(multiplexer, backend).await;
            }
            None => eprintln!("[找不到标签页 {}]", target),
        },
        ConsoleCommand::Close(target) => {
            let id = match target {
                Some(target) => resolve_tab(multiplexer, &target),
                None => multiplexer.registry().active_id().map(str::to_string),
            };
            match id {
                Some(id) => {
                    multiplexer.close_tab(&id).await;
                    sync_active(multiplexer, active);
                    replay_active(multiplexer, backend).await;
                }
                None => eprintln!("[没有可关闭的标签页]"),
            }
        }
        ConsoleCommand::List => print_tabs(multiplexer, backend),
        ConsoleCommand::Quit => {}
    }
}

/// 按 ID 或 1 开始的序号查找标签页
fn resolve_tab(multiplexer: &SessionMultiplexer, target: &str) -> Option<String> {
    let registry = multiplexer.registry();
    if registry.contains(target) {
        return Some(target.to_string());
    }
    target
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| registry.descriptors().get(index))
        .map(|descriptor| descriptor.id.clone())
}

fn sync_active(multiplexer: &SessionMultiplexer, active: &Arc<Mutex<Option<String>>>) {
    *active.lock() = multiplexer.registry().active_id().map(str::to_string);
}

/// 切换后重放活跃标签页的历史输出
async fn replay_active(multiplexer: &SessionMultiplexer, backend: &dyn TerminalBackend) {
    let Some(id) = multiplexer.registry().active_id() else {
        return;
    };
    eprintln!("[切换到标签页 {}]", id);
    match backend.fetch_backlog(id).await {
        Ok(Some(encoded)) => match ChannelCodec::new().decode(&encoded) {
            Ok(bytes) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = stdout.write_all(&bytes).and_then(|_| stdout.flush()) {
                    tracing::debug!("[主循环] 写入标准输出失败: {}", e);
                }
            }
            Err(e) => tracing::warn!("[主循环] 解码历史失败: {}", e),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!("[主循环] 获取历史失败: {}", e),
    }
}

/// 列出标签页及其本地会话状态
fn print_tabs(multiplexer: &SessionMultiplexer, backend: &LocalPtyBackend) {
    let registry = multiplexer.registry();
    eprintln!(
        "[{} 个标签页, {} 个本地会话]",
        registry.len(),
        backend.session_count()
    );
    for (index, descriptor) in registry.descriptors().iter().enumerate() {
        let marker = if registry.active_id() == Some(descriptor.id.as_str()) {
            "*"
        } else {
            " "
        };
        let status = match backend.get_session(&descriptor.id) {
            Some(metadata) => format!("{:?} {}x{}", metadata.status, metadata.cols, metadata.rows),
            None => "detached".to_string(),
        };
        eprintln!(
            "{} {}. {} [{}] {} ({})",
            marker,
            index + 1,
            descriptor.title,
            descriptor.id,
            crate::config::collapse_tilde(&descriptor.working_directory),
            status
        );
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir()
        .ok()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/"))
}
