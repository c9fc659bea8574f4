//! PTY 会话封装
//!
//! 封装单个 PTY 进程，处理输入输出和生命周期管理。
//!
//! ## 功能
//! - 按给定尺寸与工作目录创建 PTY 子进程
//! - 独立线程读取 PTY 输出，保存到历史缓冲区并通过事件发射器推送
//! - 处理 PTY 输入写入与尺寸调整
//! - 进程退出时回调所属管理器并发射关闭事件
//!
//! ## 架构说明
//! 输出历史保存在循环缓冲区中，前端（重新）连接时通过 `fetch_backlog` 获取。
//! 主动关闭（`close`）会杀死子进程，但不会发射关闭事件。

use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

use super::backend::TermSize;
use super::emitter::DynEmitter;
use super::error::TerminalError;
use super::events::{SessionStatus, TerminalOutputEvent};

/// 输出历史缓冲区默认大小 (2MB)
pub const DEFAULT_BACKLOG_MAX_BYTES: usize = 2 * 1024 * 1024;
/// 单次读取大小
const READ_CHUNK_SIZE: usize = 8192;

/// 循环缓冲区，用于存储终端输出历史
pub(crate) struct CircularBuffer {
    data: Vec<u8>,
    max_size: usize,
}

impl CircularBuffer {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            data: Vec::new(),
            max_size,
        }
    }

    pub(crate) fn append(&mut self, new_data: &[u8]) {
        if self.max_size == 0 {
            return;
        }
        // 新数据本身超过上限时只保留末尾 max_size 字节
        if new_data.len() >= self.max_size {
            self.data.clear();
            self.data
                .extend_from_slice(&new_data[new_data.len() - self.max_size..]);
            return;
        }

        self.data.extend_from_slice(new_data);

        if self.data.len() > self.max_size {
            let excess = self.data.len() - self.max_size;
            self.data.drain(0..excess);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }
}

/// 进程退出回调，参数为会话代次；返回 `false` 表示该代次已被替换，不再发射关闭事件
pub type ExitCallback = Box<dyn FnOnce(u64) -> bool + Send>;

/// PTY 启动参数
pub struct PtySpawnOptions<'a> {
    pub cwd: &'a Path,
    pub size: TermSize,
    pub shell: Option<&'a str>,
    pub backlog_max_bytes: usize,
}

/// PTY 会话
pub struct PtySession {
    id: String,
    /// 同一 ID 重建时递增，用于识别过期的退出通知
    generation: u64,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    status: Arc<Mutex<SessionStatus>>,
    shutdown_flag: Arc<AtomicBool>,
    output_buffer: Arc<Mutex<CircularBuffer>>,
}

impl PtySession {
    /// 创建新的 PTY 会话
    ///
    /// # 参数
    /// - `id`: 会话 ID
    /// - `generation`: 会话代次
    /// - `options`: 工作目录、尺寸、shell 与历史上限
    /// - `emitter`: 事件发射器
    /// - `on_exit`: 进程自行退出时调用（主动关闭不会调用），返回 `true` 才发射关闭事件
    pub fn spawn(
        id: String,
        generation: u64,
        options: PtySpawnOptions<'_>,
        emitter: DynEmitter,
        on_exit: ExitCallback,
    ) -> Result<Self, TerminalError> {
        tracing::info!(
            "[终端] 创建 PTY 会话 {}, 大小: {}, 目录: {}",
            id,
            options.size,
            options.cwd.display()
        );

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: options.size.rows,
                cols: options.size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;

        let shell = match options.shell {
            Some(shell) => shell.to_string(),
            None => std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string()),
        };
        tracing::debug!("[终端] 使用 shell: {}", shell);

        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", "xterm-256color");
        if options.cwd.is_dir() {
            cmd.cwd(options.cwd);
        } else if let Some(home) = dirs::home_dir() {
            tracing::warn!(
                "[终端] 工作目录 {} 不存在，改用主目录",
                options.cwd.display()
            );
            cmd.cwd(home);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::PtyCreationFailed(e.to_string()))?;

        let status = Arc::new(Mutex::new(SessionStatus::Running));
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let output_buffer = Arc::new(Mutex::new(CircularBuffer::new(options.backlog_max_bytes)));

        let status_clone = status.clone();
        let shutdown_flag_clone = shutdown_flag.clone();
        let output_buffer_clone = output_buffer.clone();
        let id_clone = id.clone();

        // 读取是阻塞的，使用独立线程
        std::thread::spawn(move || {
            let mut buffer = [0u8; READ_CHUNK_SIZE];

            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => {
                        tracing::info!("[终端] 会话 {} 进程已退出", id_clone);
                        *status_clone.lock() = SessionStatus::Done;
                        break;
                    }
                    Ok(n) => {
                        let output_data = &buffer[..n];
                        output_buffer_clone.lock().append(output_data);

                        emitter.emit_output(TerminalOutputEvent {
                            session_id: id_clone.clone(),
                            data: BASE64.encode(output_data),
                        });
                    }
                    Err(e) => {
                        if !shutdown_flag_clone.load(Ordering::SeqCst) {
                            tracing::error!("[终端] 会话 {} 读取错误: {}", id_clone, e);
                            *status_clone.lock() = SessionStatus::Error;
                        }
                        break;
                    }
                }
            }

            if shutdown_flag_clone.load(Ordering::SeqCst) {
                tracing::debug!("[终端] 会话 {} 读取线程随关闭结束", id_clone);
                return;
            }
            if on_exit(generation) {
                emitter.emit_closed(&id_clone);
            }
        });

        tracing::info!("[终端] 会话 {} 已创建 ({})", id, options.size);

        Ok(Self {
            id,
            generation,
            writer: Arc::new(Mutex::new(writer)),
            master: Arc::new(Mutex::new(pair.master)),
            child: Arc::new(Mutex::new(child)),
            status,
            shutdown_flag,
            output_buffer,
        })
    }

    /// 获取会话 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 写入数据到 PTY
    pub fn write(&self, data: &[u8]) -> Result<(), TerminalError> {
        let mut writer = self.writer.lock();
        writer
            .write_all(data)
            .map_err(|e| TerminalError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TerminalError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// 调整 PTY 大小
    pub fn resize(&self, size: TermSize) -> Result<(), TerminalError> {
        let master = self.master.lock();
        master
            .resize(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::ResizeFailed(e.to_string()))?;
        tracing::debug!("[终端] 会话 {} 调整大小为 {}", self.id, size);
        Ok(())
    }

    /// 获取当前状态
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.status() == SessionStatus::Running
    }

    /// 获取输出历史数据（Base64 编码），无历史时返回 `None`
    pub fn output_history(&self) -> Option<String> {
        let buffer = self.output_buffer.lock();
        if buffer.len() == 0 {
            return None;
        }
        Some(BASE64.encode(buffer.snapshot()))
    }

    /// 关闭会话
    pub fn close(&self) -> Result<(), TerminalError> {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        *self.status.lock() = SessionStatus::Done;

        if let Err(e) = self.child.lock().kill() {
            // 进程可能已自行退出
            tracing::debug!("[终端] 会话 {} 结束子进程: {}", self.id, e);
        }

        tracing::info!("[终端] 会话 {} 已关闭", self.id);
        Ok(())
    }
}
