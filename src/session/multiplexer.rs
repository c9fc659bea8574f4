//! 会话多路复用器
//!
//! 为注册表中每个打开的描述符挂载一个会话控制器，并把控制器通知回写到注册表。
//!
//! ## 功能
//! - 启动时恢复所有已持久化的标签页
//! - 新建标签页（ID 为 `terminal-<uuid>`）与挂接外部会话
//! - 后端报告会话结束时从注册表移除（不再发送关闭请求）
//! - 转发中断通知给订阅者
//! - 忽略已被替换的旧挂载遗留的通知（按挂载编号比对）
//! - 退出时卸载所有控制器，后端会话保持运行以便下次重连

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::descriptor::SessionDescriptor;
use super::registry::{CloseOptions, SessionRegistry};
use crate::terminal::{
    CloseReason, ControllerEvent, ControllerOptions, SessionController, SessionHandle,
    SurfaceFactory, TerminalBackend, TerminalInterruptedEvent,
};

/// 中断通知通道容量
const INTERRUPT_CHANNEL_CAPACITY: usize = 64;

/// 会话多路复用器
pub struct SessionMultiplexer {
    registry: SessionRegistry,
    backend: Arc<dyn TerminalBackend>,
    surfaces: Box<dyn SurfaceFactory>,
    options: ControllerOptions,
    handles: HashMap<String, SessionHandle>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    interrupts: broadcast::Sender<TerminalInterruptedEvent>,
}

impl SessionMultiplexer {
    pub fn new(
        registry: SessionRegistry,
        backend: Arc<dyn TerminalBackend>,
        surface_factory: impl SurfaceFactory + 'static,
        options: ControllerOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (interrupts, _) = broadcast::channel(INTERRUPT_CHANNEL_CAPACITY);
        Self {
            registry,
            backend,
            surfaces: Box::new(surface_factory),
            options,
            handles: HashMap::new(),
            events_tx,
            events_rx,
            interrupts,
        }
    }

    /// 为注册表中所有尚未挂载的描述符启动控制器，返回新挂载数量
    pub fn restore(&mut self) -> usize {
        let descriptors: Vec<SessionDescriptor> = self.registry.descriptors().to_vec();
        let mounted = descriptors
            .into_iter()
            .filter(|descriptor| self.mount(descriptor.clone()))
            .count();
        tracing::info!("[多路复用器] 恢复 {} 个标签页", mounted);
        mounted
    }

    /// 新建标签页，返回会话 ID
    pub fn open_tab(
        &mut self,
        title: Option<String>,
        working_directory: impl Into<PathBuf>,
    ) -> String {
        let id = format!("terminal-{}", Uuid::new_v4());
        let descriptor =
            SessionDescriptor::new(id.clone(), title.unwrap_or_default(), working_directory);
        self.registry.open(descriptor);
        self.mount_registered(&id);
        id
    }

    /// 挂接已在后端运行的会话
    pub fn attach_external(
        &mut self,
        id: &str,
        working_directory: impl Into<PathBuf>,
        title: Option<String>,
    ) {
        self.registry.attach_external(id, working_directory, title);
        self.mount_registered(id);
    }

    pub fn activate(&mut self, id: &str) -> bool {
        self.registry.activate(id)
    }

    /// 用户关闭标签页：卸载控制器并请求后端关闭
    pub async fn close_tab(&mut self, id: &str) -> bool {
        if let Some(handle) = self.handles.remove(id) {
            handle.unmount();
        }
        self.registry.close(id, CloseOptions::default()).await
    }

    pub fn handle(&self, id: &str) -> Option<&SessionHandle> {
        self.handles.get(id)
    }

    pub fn active_handle(&self) -> Option<&SessionHandle> {
        self.registry.active_id().and_then(|id| self.handles.get(id))
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn mounted_count(&self) -> usize {
        self.handles.len()
    }

    /// 订阅中断通知
    pub fn subscribe_interrupts(&self) -> broadcast::Receiver<TerminalInterruptedEvent> {
        self.interrupts.subscribe()
    }

    /// 等待下一个控制器通知并应用，返回该通知
    ///
    /// 不可取消：在 `select!` 中请改用 [`Self::recv_event`] 加 [`Self::apply_event`]。
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        let event = self.recv_event().await?;
        self.apply_event(&event).await;
        Some(event)
    }

    /// 接收下一个控制器通知但不应用，可安全用作 `select!` 分支
    pub async fn recv_event(&mut self) -> Option<ControllerEvent> {
        self.events_rx.recv().await
    }

    /// 应用一个控制器通知，返回是否生效
    ///
    /// 通知的挂载编号与当前挂载不一致时忽略。
    pub async fn apply_event(&mut self, event: &ControllerEvent) -> bool {
        let current = self.handles.get(event.session_id()).map(SessionHandle::mount_id);
        if current != Some(event.mount_id()) {
            tracing::debug!(
                "[多路复用器] 忽略会话 {} 旧挂载 #{} 的通知",
                event.session_id(),
                event.mount_id()
            );
            return false;
        }

        match event {
            ControllerEvent::Closed {
                session_id, reason, ..
            } => {
                self.handles.remove(session_id);
                let options = match reason {
                    CloseReason::RemoteExit => CloseOptions::remote(),
                    CloseReason::Terminated => CloseOptions::default(),
                };
                if self.registry.close(session_id, options).await {
                    tracing::info!("[多路复用器] 标签页 {} 已移除 ({:?})", session_id, reason);
                }
            }
            ControllerEvent::Interrupted { event, .. } => {
                tracing::debug!("[多路复用器] 会话 {} 收到中断", event.session_id);
                // 没有订阅者时发送失败，忽略
                let _ = self.interrupts.send(event.clone());
            }
        }
        true
    }

    /// 卸载所有控制器并等待其结束
    pub async fn shutdown(&mut self) {
        let handles: Vec<SessionHandle> = self.handles.drain().map(|(_, handle)| handle).collect();
        tracing::info!("[多路复用器] 卸载 {} 个控制器", handles.len());
        for handle in handles {
            handle.unmount();
            handle.join().await;
        }
    }

    fn mount_registered(&mut self, id: &str) {
        if let Some(descriptor) = self.registry.get(id).cloned() {
            self.mount(descriptor);
        }
    }

    /// 已挂载时返回 `false`
    fn mount(&mut self, descriptor: SessionDescriptor) -> bool {
        if self.handles.contains_key(&descriptor.id) {
            return false;
        }
        let surface = self.surfaces.create(&descriptor);
        let id = descriptor.id.clone();
        let handle = SessionController::spawn(
            descriptor,
            self.backend.clone(),
            surface,
            self.options.clone(),
            self.events_tx.clone(),
        );
        self.handles.insert(id, handle);
        true
    }
}
