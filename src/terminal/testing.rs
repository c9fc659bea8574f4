//! 测试辅助
//!
//! 脚本化的后端与记录型呈现面，供控制器与多路复用器测试使用。

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::backend::{CreateOptions, TermSize, TerminalBackend};
use super::emitter::{EventBus, SessionSubscription, TerminalEventEmitter};
use super::error::TerminalError;
use super::events::TerminalOutputEvent;
use super::surface::{SurfaceMetrics, TerminalSurface};

/// 后端收到的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Create {
        id: String,
        cwd: PathBuf,
        size: TermSize,
    },
    Probe {
        id: String,
        size: TermSize,
    },
    Write {
        id: String,
        data: String,
    },
    Resize {
        id: String,
        size: TermSize,
    },
    FetchBacklog {
        id: String,
    },
    Ping {
        id: String,
    },
    Close {
        id: String,
    },
}

/// 脚本化后端
#[derive(Default)]
pub struct FakeBackend {
    pub bus: EventBus,
    calls: Mutex<Vec<BackendCall>>,
    backlog: Mutex<HashMap<String, String>>,
    ping_results: Mutex<VecDeque<bool>>,
    backlog_gate: Mutex<Option<oneshot::Receiver<()>>>,
    create_failures: AtomicU32,
    probe_not_found: AtomicBool,
    close_fails: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, id: &str) -> Vec<BackendCall> {
        self.calls()
            .into_iter()
            .filter(|call| call_id(call) == id)
            .collect()
    }

    pub fn set_backlog(&self, id: &str, text: &str) {
        self.backlog
            .lock()
            .insert(id.to_string(), super::codec::ChannelCodec::new().encode(text.as_bytes()));
    }

    /// 依次返回的心跳结果，耗尽后恒为 `true`
    pub fn push_ping_results(&self, results: &[bool]) {
        self.ping_results.lock().extend(results.iter().copied());
    }

    /// 下一次 `fetch_backlog` 阻塞到返回的发送端触发
    pub fn gate_backlog(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.backlog_gate.lock() = Some(rx);
        tx
    }

    pub fn fail_next_creates(&self, count: u32) {
        self.create_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_probe_not_found(&self, value: bool) {
        self.probe_not_found.store(value, Ordering::SeqCst);
    }

    pub fn set_close_fails(&self, value: bool) {
        self.close_fails.store(value, Ordering::SeqCst);
    }

    pub fn emit_text(&self, id: &str, text: &str) {
        self.emit_raw(id, &super::codec::ChannelCodec::new().encode(text.as_bytes()));
    }

    pub fn emit_raw(&self, id: &str, data: &str) {
        self.bus.emit_output(TerminalOutputEvent {
            session_id: id.to_string(),
            data: data.to_string(),
        });
    }

    pub fn emit_closed(&self, id: &str) {
        self.bus.emit_closed(id);
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }
}

fn call_id(call: &BackendCall) -> &str {
    match call {
        BackendCall::Create { id, .. }
        | BackendCall::Probe { id, .. }
        | BackendCall::Write { id, .. }
        | BackendCall::Resize { id, .. }
        | BackendCall::FetchBacklog { id }
        | BackendCall::Ping { id }
        | BackendCall::Close { id } => id,
    }
}

#[async_trait]
impl TerminalBackend for FakeBackend {
    async fn create(
        &self,
        session_id: &str,
        options: &CreateOptions,
    ) -> Result<(), TerminalError> {
        self.record(BackendCall::Create {
            id: session_id.to_string(),
            cwd: options.cwd.clone(),
            size: options.size,
        });
        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TerminalError::PtyCreationFailed("spawn refused".to_string()));
        }
        Ok(())
    }

    async fn probe(&self, session_id: &str, size: TermSize) -> Result<(), TerminalError> {
        self.record(BackendCall::Probe {
            id: session_id.to_string(),
            size,
        });
        if self.probe_not_found.load(Ordering::SeqCst) {
            return Err(TerminalError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn write(&self, session_id: &str, data: &str) -> Result<(), TerminalError> {
        self.record(BackendCall::Write {
            id: session_id.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }

    async fn resize(&self, session_id: &str, size: TermSize) -> Result<(), TerminalError> {
        self.record(BackendCall::Resize {
            id: session_id.to_string(),
            size,
        });
        Ok(())
    }

    async fn fetch_backlog(&self, session_id: &str) -> Result<Option<String>, TerminalError> {
        self.record(BackendCall::FetchBacklog {
            id: session_id.to_string(),
        });
        let gate = self.backlog_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(self.backlog.lock().get(session_id).cloned())
    }

    async fn ping(&self, session_id: &str) -> Result<bool, TerminalError> {
        self.record(BackendCall::Ping {
            id: session_id.to_string(),
        });
        Ok(self.ping_results.lock().pop_front().unwrap_or(true))
    }

    async fn close(&self, session_id: &str) -> Result<(), TerminalError> {
        self.record(BackendCall::Close {
            id: session_id.to_string(),
        });
        if self.close_fails.load(Ordering::SeqCst) {
            return Err(TerminalError::Transport("host unreachable".to_string()));
        }
        Ok(())
    }

    fn subscribe(&self, session_id: &str) -> SessionSubscription {
        self.bus.subscribe(session_id)
    }
}

/// 记录写入内容的呈现面
#[derive(Clone, Default)]
pub struct RecordingSurface {
    output: Arc<Mutex<Vec<u8>>>,
    metrics: Arc<Mutex<SurfaceMetrics>>,
    released: Arc<AtomicBool>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn TerminalSurface> {
        Box::new(self.clone())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }

    pub fn set_metrics(&self, metrics: SurfaceMetrics) {
        *self.metrics.lock() = metrics;
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl TerminalSurface for RecordingSurface {
    fn measure(&mut self) -> SurfaceMetrics {
        *self.metrics.lock()
    }

    fn write(&mut self, data: &[u8]) {
        self.output.lock().extend_from_slice(data);
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// 轮询直到条件成立，超时则失败
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached within timeout");
}
