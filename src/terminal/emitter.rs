//! 事件发射器
//!
//! 后端通过 `TerminalEventEmitter` 推送输出与关闭事件，`EventBus` 按会话 ID
//! 把事件分发给订阅者。订阅句柄被丢弃时自动注销监听。

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::events::{SessionEvent, TerminalOutputEvent};

/// 事件发射器抽象
pub trait TerminalEventEmitter: Send + Sync {
    /// 发射输出事件
    fn emit_output(&self, event: TerminalOutputEvent);

    /// 发射会话关闭事件
    fn emit_closed(&self, session_id: &str);
}

/// 共享的事件发射器
pub type DynEmitter = Arc<dyn TerminalEventEmitter>;

type Listener = (u64, mpsc::UnboundedSender<SessionEvent>);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: HashMap<String, Vec<Listener>>,
}

/// 进程内事件总线
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅单个会话的事件流
    pub fn subscribe(&self, session_id: &str) -> SessionSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let listener_id = inner.next_id;
        inner
            .listeners
            .entry(session_id.to_string())
            .or_default()
            .push((listener_id, tx));

        tracing::debug!("[事件总线] 订阅会话 {} (监听器 {})", session_id, listener_id);
        SessionSubscription {
            session_id: session_id.to_string(),
            listener_id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 当前会话的监听器数量
    pub fn listener_count(&self, session_id: &str) -> usize {
        self.inner
            .lock()
            .listeners
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn dispatch(&self, session_id: &str, event: SessionEvent) {
        let mut inner = self.inner.lock();
        if let Some(listeners) = inner.listeners.get_mut(session_id) {
            listeners.retain(|(_, tx)| tx.send(event.clone()).is_ok());
            if listeners.is_empty() {
                inner.listeners.remove(session_id);
            }
        }
    }
}

impl TerminalEventEmitter for EventBus {
    fn emit_output(&self, event: TerminalOutputEvent) {
        self.dispatch(&event.session_id, SessionEvent::Output(event.data));
    }

    fn emit_closed(&self, session_id: &str) {
        self.dispatch(session_id, SessionEvent::Closed);
    }
}

/// 会话事件订阅
///
/// 丢弃即注销，对应输出与关闭两类监听的同时解除。
pub struct SessionSubscription {
    session_id: String,
    listener_id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    bus: Weak<Mutex<BusInner>>,
}

impl SessionSubscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 等待下一个事件，总线被释放后返回 `None`
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        if let Some(listeners) = inner.listeners.get_mut(&self.session_id) {
            listeners.retain(|(id, _)| *id != self.listener_id);
            if listeners.is_empty() {
                inner.listeners.remove(&self.session_id);
            }
        }
        tracing::debug!(
            "[事件总线] 注销会话 {} 的监听器 {}",
            self.session_id,
            self.listener_id
        );
    }
}
