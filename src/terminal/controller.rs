//! 会话控制器
//!
//! 每个标签页一个控制器，以单个 tokio 任务运行，逐个处理事件：
//! 后端事件（输出、关闭）、控制命令（调整大小、终止、卸载）、用户输入、心跳。
//!
//! ## 状态机
//! `Initializing → Attaching → BacklogLoading → Live → Reconnecting → Closed`
//!
//! - 订阅在控制器创建时完成，早于创建/重连调用，避免遗漏早期输出
//! - 历史快照加载完成之前的输出进入 `PendingChunks`，快照渲染后按序刷新
//! - 心跳失败是进入 `Reconnecting` 的唯一触发条件
//! - 只有后端关闭事件或 `terminate()` 进入 `Closed`
//!
//! 等待任何后端调用期间，控制器仍持续处理控制命令与会话事件（见 `drive`），
//! 每次 await 之后都会重新检查 `unmounted` / `closed`。

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::backend::{TermSize, TerminalBackend};
use super::channel::SessionChannel;
use super::codec::ChannelCodec;
use super::emitter::SessionSubscription;
use super::error::TerminalError;
use super::events::{SessionEvent, TerminalInterruptedEvent};
use super::pending::PendingChunks;
use super::surface::{SessionNotice, TerminalSurface};
use crate::session::SessionDescriptor;

/// 默认心跳间隔
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// 默认中断字节（ETX, Ctrl+C）
pub const DEFAULT_INTERRUPT_BYTE: u8 = 0x03;

/// 挂载编号，进程内单调递增
static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// 控制器参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// 心跳间隔
    pub heartbeat_interval: Duration,
    /// 容器尚未布局时使用的尺寸
    pub default_size: TermSize,
    /// 触发中断通知的输入字节
    pub interrupt_byte: u8,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            default_size: TermSize::default(),
            interrupt_byte: DEFAULT_INTERRUPT_BYTE,
        }
    }
}

/// 会话关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloseReason {
    /// 后端报告会话结束
    RemoteExit,
    /// 用户或注册表主动终止
    Terminated,
}

/// 控制器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum SessionPhase {
    Initializing,
    Attaching,
    BacklogLoading,
    Live,
    /// `attempt` 为 0 表示初始连接失败，等待心跳重试
    Reconnecting { attempt: u32 },
    Closed { reason: CloseReason },
}

impl SessionPhase {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// 控制器向多路复用器发出的通知
///
/// `mount_id` 标识发出通知的那一次挂载；同一会话 ID 重新挂载后，
/// 旧挂载遗留在队列中的通知可据此识别。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// 会话进入 `Closed`
    Closed {
        session_id: String,
        mount_id: u64,
        reason: CloseReason,
    },
    /// 用户发送了中断字节
    Interrupted {
        mount_id: u64,
        event: TerminalInterruptedEvent,
    },
}

impl ControllerEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Closed { session_id, .. } => session_id,
            Self::Interrupted { event, .. } => &event.session_id,
        }
    }

    pub fn mount_id(&self) -> u64 {
        match self {
            Self::Closed { mount_id, .. } | Self::Interrupted { mount_id, .. } => *mount_id,
        }
    }
}

/// 控制器状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub phase: SessionPhase,
    pub backlog_loaded: bool,
    pub reconnecting: bool,
    pub closed: bool,
    pub unmounted: bool,
    pub pending_chunks: usize,
    pub size: TermSize,
}

#[derive(Debug)]
enum ControlCommand {
    Resize,
    Terminate,
    Unmount,
}

/// 控制器句柄
///
/// 丢弃句柄等同于卸载。
pub struct SessionHandle {
    session_id: String,
    mount_id: u64,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    unmounted: Arc<AtomicBool>,
    snapshot_rx: watch::Receiver<ControllerSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mount_id(&self) -> u64 {
        self.mount_id
    }

    /// 转发一次按键或粘贴
    pub fn send_input(&self, data: impl Into<Vec<u8>>) {
        if self.unmounted.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.input_tx.send(data.into());
    }

    /// 容器尺寸发生变化
    pub fn notify_resize(&self) {
        let _ = self.control_tx.send(ControlCommand::Resize);
    }

    /// 终止会话（进入 `Closed`）
    pub fn terminate(&self) {
        let _ = self.control_tx.send(ControlCommand::Terminate);
    }

    /// 卸载：立即置位 `unmounted`，随后由任务释放订阅、定时器与呈现面
    pub fn unmount(&self) {
        if !self.unmounted.swap(true, Ordering::SeqCst) {
            tracing::debug!("[终端] 卸载会话控制器 {}", self.session_id);
        }
        let _ = self.control_tx.send(ControlCommand::Unmount);
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// 等待快照满足条件；控制器任务结束且条件仍不满足时返回 `None`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<ControllerSnapshot>
    where
        F: FnMut(&ControllerSnapshot) -> bool,
    {
        let mut rx = self.snapshot_rx.clone();
        let result = rx.wait_for(|snapshot| predicate(snapshot)).await;
        result.ok().map(|snapshot| (*snapshot).clone())
    }

    /// 等待控制器任务结束
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("[终端] 会话控制器 {} 任务异常: {}", self.session_id, e);
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// 单个会话的控制器
pub struct SessionController {
    descriptor: SessionDescriptor,
    mount_id: u64,
    channel: SessionChannel,
    codec: ChannelCodec,
    surface: Box<dyn TerminalSurface>,
    options: ControllerOptions,
    subscription: Option<SessionSubscription>,
    input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    events: mpsc::UnboundedSender<ControllerEvent>,
    snapshot_tx: watch::Sender<ControllerSnapshot>,
    unmounted: Arc<AtomicBool>,
    phase: SessionPhase,
    backlog_loaded: bool,
    pending: PendingChunks,
    reconnecting: bool,
    closed: bool,
    input_enabled: bool,
    size: TermSize,
    released: bool,
}

impl SessionController {
    /// 创建控制器并在当前 tokio 运行时中启动
    ///
    /// 订阅在此处同步完成，早于任何后端调用。
    pub fn spawn(
        descriptor: SessionDescriptor,
        backend: Arc<dyn TerminalBackend>,
        surface: Box<dyn TerminalSurface>,
        options: ControllerOptions,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> SessionHandle {
        let channel = SessionChannel::new(backend, descriptor.id.clone());
        let subscription = channel.subscribe();

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let unmounted = Arc::new(AtomicBool::new(false));

        // 新建会话没有需要回放的历史，输出直接渲染
        let backlog_loaded = !descriptor.pre_existing;
        let size = options.default_size;
        let (snapshot_tx, snapshot_rx) = watch::channel(ControllerSnapshot {
            phase: SessionPhase::Initializing,
            backlog_loaded,
            reconnecting: false,
            closed: false,
            unmounted: false,
            pending_chunks: 0,
            size,
        });

        let session_id = descriptor.id.clone();
        let mount_id = NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed);
        let controller = Self {
            descriptor,
            mount_id,
            channel,
            codec: ChannelCodec::new(),
            surface,
            options,
            subscription: Some(subscription),
            input_rx,
            control_rx,
            events,
            snapshot_tx,
            unmounted: unmounted.clone(),
            phase: SessionPhase::Initializing,
            backlog_loaded,
            pending: PendingChunks::new(),
            reconnecting: false,
            closed: false,
            input_enabled: false,
            size,
            released: false,
        };

        let task = tokio::spawn(controller.run());

        SessionHandle {
            session_id,
            mount_id,
            input_tx,
            control_tx,
            unmounted,
            snapshot_rx,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        tracing::info!(
            "[终端] 挂载会话 {} #{} (已存在: {}, 目录: {})",
            self.descriptor.id,
            self.mount_id,
            self.descriptor.pre_existing,
            self.descriptor.working_directory.display()
        );

        if self.attach().await.is_some() {
            self.event_loop().await;
        }
        self.release();
    }

    // ------------------------------------------------------------------
    // 初始连接
    // ------------------------------------------------------------------

    async fn attach(&mut self) -> Option<()> {
        self.size = self.measure();
        self.set_phase(SessionPhase::Attaching);

        let size = self.size;
        let result = if self.descriptor.pre_existing {
            let channel = self.channel.clone();
            match self.drive(async move { channel.probe(size).await }).await? {
                Ok(()) => {
                    tracing::info!("[终端] 重新连接已存在的会话 {}", self.descriptor.id);
                    Ok(())
                }
                Err(e) => {
                    if e.is_session_not_found() {
                        tracing::info!("[终端] 会话 {} 已不存在，重新创建", self.descriptor.id);
                    } else {
                        tracing::warn!(
                            "[终端] 调整已存在会话 {} 大小失败，改为创建: {}",
                            self.descriptor.id,
                            e
                        );
                    }
                    self.create_session().await?
                }
            }
        } else {
            self.create_session().await?
        };

        if let Err(e) = result {
            tracing::error!("[终端] 会话 {} 初始化失败: {}", self.descriptor.id, e);
            self.surface.show_notice(&SessionNotice::Error(e.to_string()));
            self.set_phase(SessionPhase::Reconnecting { attempt: 0 });
            return Some(());
        }

        self.input_enabled = true;
        self.set_phase(SessionPhase::BacklogLoading);
        self.load_backlog(true).await?;
        self.set_phase(SessionPhase::Live);
        Some(())
    }

    async fn create_session(&mut self) -> Option<Result<(), TerminalError>> {
        let channel = self.channel.clone();
        let cwd = self.descriptor.working_directory.clone();
        let size = self.size;
        self.drive(async move { channel.create(cwd, size).await }).await
    }

    /// 获取并渲染历史快照，然后按序刷新排队输出
    async fn load_backlog(&mut self, initial: bool) -> Option<()> {
        let channel = self.channel.clone();
        match self.drive(async move { channel.fetch_backlog().await }).await? {
            Ok(Some(encoded)) => self.render_encoded(&encoded),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("[终端] 获取会话 {} 历史失败: {}", self.descriptor.id, e);
                if initial {
                    self.surface.show_notice(&SessionNotice::Error(e.to_string()));
                }
            }
        }

        let queued: Vec<String> = self.pending.drain_in_order().collect();
        for chunk in &queued {
            self.render_encoded(chunk);
        }
        self.backlog_loaded = true;
        self.publish();
        Some(())
    }

    // ------------------------------------------------------------------
    // 事件循环
    // ------------------------------------------------------------------

    async fn event_loop(&mut self) {
        let period = self.options.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.is_stopped() {
                break;
            }
            tokio::select! {
                biased;
                command = self.control_rx.recv() => {
                    if !self.on_control(command) {
                        break;
                    }
                }
                event = next_event(&mut self.subscription) => {
                    if !self.on_session_event(event) {
                        break;
                    }
                }
                Some(data) = self.input_rx.recv(), if self.input_enabled => {
                    self.on_input(data).await;
                }
                _ = heartbeat.tick() => {
                    self.on_heartbeat().await;
                }
            }
        }
    }

    /// 等待一个后端调用，同时继续处理控制命令与会话事件
    ///
    /// 控制器被卸载或关闭时放弃该调用并返回 `None`。
    async fn drive<F>(&mut self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::pin!(fut);
        loop {
            if self.is_stopped() {
                return None;
            }
            tokio::select! {
                biased;
                command = self.control_rx.recv() => {
                    if !self.on_control(command) {
                        return None;
                    }
                }
                event = next_event(&mut self.subscription) => {
                    if !self.on_session_event(event) {
                        return None;
                    }
                }
                output = &mut fut => {
                    if self.is_stopped() {
                        return None;
                    }
                    return Some(output);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // 事件处理
    // ------------------------------------------------------------------

    /// 返回 `false` 表示控制器应停止
    fn on_control(&mut self, command: Option<ControlCommand>) -> bool {
        match command {
            Some(ControlCommand::Resize) => {
                self.on_resize();
                true
            }
            Some(ControlCommand::Terminate) => {
                self.enter_closed(CloseReason::Terminated);
                false
            }
            Some(ControlCommand::Unmount) | None => {
                self.unmounted.store(true, Ordering::SeqCst);
                self.publish();
                false
            }
        }
    }

    /// 返回 `false` 表示控制器应停止
    fn on_session_event(&mut self, event: Option<SessionEvent>) -> bool {
        match event {
            Some(SessionEvent::Output(data)) => {
                self.on_output(data);
                true
            }
            Some(SessionEvent::Closed) => {
                self.enter_closed(CloseReason::RemoteExit);
                false
            }
            None => {
                tracing::warn!("[终端] 会话 {} 的事件流已断开", self.descriptor.id);
                self.subscription = None;
                true
            }
        }
    }

    fn on_output(&mut self, data: String) {
        if self.is_stopped() {
            return;
        }
        if !self.backlog_loaded {
            self.pending.enqueue(data);
            self.publish();
            return;
        }
        self.render_encoded(&data);
    }

    async fn on_input(&mut self, data: Vec<u8>) {
        if self.is_stopped() {
            return;
        }
        let encoded = self.codec.encode(&data);
        if let Err(e) = self.channel.write(&encoded).await {
            tracing::error!("[终端] 写入会话 {} 失败: {}", self.descriptor.id, e);
        }

        if data.len() == 1 && data[0] == self.options.interrupt_byte {
            let _ = self
                .events
                .send(ControllerEvent::Interrupted {
                    mount_id: self.mount_id,
                    event: TerminalInterruptedEvent {
                        session_id: self.descriptor.id.clone(),
                    },
                });
        }
    }

    fn on_resize(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.size = self.measure();
        self.publish();

        let channel = self.channel.clone();
        let size = self.size;
        tokio::spawn(async move {
            if let Err(e) = channel.resize(size).await {
                tracing::warn!("[终端] 调整会话 {} 大小失败: {}", channel.session_id(), e);
            }
        });
    }

    async fn on_heartbeat(&mut self) {
        if self.is_stopped() || self.reconnecting {
            return;
        }
        if self.phase.is_reconnecting() {
            self.reconnect().await;
            return;
        }

        let channel = self.channel.clone();
        match self.drive(async move { channel.ping().await }).await {
            None => return,
            Some(Ok(true)) => return,
            Some(Ok(false)) => {
                tracing::warn!("[终端] 心跳：会话 {} 不存在", self.descriptor.id);
            }
            Some(Err(e)) => {
                tracing::warn!("[终端] 心跳失败 {}: {}", self.descriptor.id, e);
            }
        }
        self.reconnect().await;
    }

    async fn reconnect(&mut self) {
        let attempt = match self.phase {
            SessionPhase::Reconnecting { attempt } => attempt + 1,
            _ => 1,
        };
        self.reconnecting = true;
        self.set_phase(SessionPhase::Reconnecting { attempt });
        self.surface.show_notice(&SessionNotice::Disconnected);
        tracing::info!("[终端] 会话 {} 第 {} 次重连", self.descriptor.id, attempt);

        self.size = self.measure();
        match self.create_session().await {
            None => {
                self.reconnecting = false;
                return;
            }
            Some(Err(e)) => {
                tracing::error!("[终端] 会话 {} 重连失败: {}", self.descriptor.id, e);
                self.surface
                    .show_notice(&SessionNotice::ReconnectFailed(e.to_string()));
                self.reconnecting = false;
                self.publish();
                return;
            }
            Some(Ok(())) => {}
        }

        self.backlog_loaded = false;
        self.pending.clear();
        self.publish();
        if self.load_backlog(false).await.is_none() {
            self.reconnecting = false;
            return;
        }

        self.input_enabled = true;
        self.surface.show_notice(&SessionNotice::Reconnected);
        self.reconnecting = false;
        self.set_phase(SessionPhase::Live);
        tracing::info!("[终端] 会话 {} 重连成功", self.descriptor.id);
    }

    fn enter_closed(&mut self, reason: CloseReason) {
        if self.closed {
            return;
        }
        self.closed = true;
        if reason == CloseReason::RemoteExit && !self.unmounted.load(Ordering::SeqCst) {
            self.surface.show_notice(&SessionNotice::Exited);
        }
        self.set_phase(SessionPhase::Closed { reason });
        tracing::info!("[终端] 会话 {} 已关闭 ({:?})", self.descriptor.id, reason);

        let _ = self.events.send(ControllerEvent::Closed {
            session_id: self.descriptor.id.clone(),
            mount_id: self.mount_id,
            reason,
        });
    }

    // ------------------------------------------------------------------
    // 辅助
    // ------------------------------------------------------------------

    fn is_stopped(&self) -> bool {
        self.closed || self.unmounted.load(Ordering::SeqCst)
    }

    fn measure(&mut self) -> TermSize {
        self.surface.measure().fit(self.options.default_size)
    }

    fn render_encoded(&mut self, encoded: &str) {
        if self.unmounted.load(Ordering::SeqCst) {
            return;
        }
        match self.codec.decode(encoded) {
            Ok(bytes) => self.surface.write(&bytes),
            Err(e) => tracing::warn!("[终端] 会话 {} 解码输出失败: {}", self.descriptor.id, e),
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::debug!(
                "[终端] 会话 {}: {:?} -> {:?}",
                self.descriptor.id,
                self.phase,
                phase
            );
        }
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(ControllerSnapshot {
            phase: self.phase,
            backlog_loaded: self.backlog_loaded,
            reconnecting: self.reconnecting,
            closed: self.closed,
            unmounted: self.unmounted.load(Ordering::SeqCst),
            pending_chunks: self.pending.len(),
            size: self.size,
        });
    }

    /// 释放订阅、输入通道与呈现面，可重复调用
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.subscription = None;
        self.input_enabled = false;
        self.input_rx.close();
        self.surface.release();
        self.publish();
        tracing::debug!("[终端] 会话 {} 资源已释放", self.descriptor.id);
    }
}

async fn next_event(subscription: &mut Option<SessionSubscription>) -> Option<SessionEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
