//! 会话注册表
//!
//! 维护有序的会话描述符列表与当前活跃 ID，每次变更后写入持久化存储。
//!
//! ## 功能
//! - 打开（幂等）、激活、关闭、挂接外部会话
//! - 关闭活跃会话时修复活跃 ID（后一个，否则前一个，否则为空）
//! - 启动时从存储恢复，所有恢复的描述符都标记为已存在
//!
//! ## 持久化格式
//! 键 `terminal_page_state`，值为 `{ "descriptors": [...], "activeId": ... }`。
//! 列表为空时删除该键。

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::descriptor::{default_title, SessionDescriptor};
use super::store::{RegistryStore, REGISTRY_STORAGE_KEY};
use crate::terminal::TerminalBackend;

/// 关闭参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseOptions {
    /// 后端已报告会话结束，无需再发送关闭请求
    pub already_terminated_remotely: bool,
}

impl CloseOptions {
    pub fn remote() -> Self {
        Self {
            already_terminated_remotely: true,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    descriptors: Vec<SessionDescriptor>,
    #[serde(default)]
    active_id: Option<String>,
}

/// 会话注册表
pub struct SessionRegistry {
    descriptors: Vec<SessionDescriptor>,
    active_id: Option<String>,
    store: Box<dyn RegistryStore>,
    backend: Arc<dyn TerminalBackend>,
}

impl SessionRegistry {
    /// 创建空注册表（不读取存储）
    pub fn new(store: Box<dyn RegistryStore>, backend: Arc<dyn TerminalBackend>) -> Self {
        Self {
            descriptors: Vec::new(),
            active_id: None,
            store,
            backend,
        }
    }

    /// 从存储恢复
    ///
    /// 状态缺失或损坏时返回空注册表。
    pub fn load(store: Box<dyn RegistryStore>, backend: Arc<dyn TerminalBackend>) -> Self {
        let mut registry = Self::new(store, backend);
        let state = registry.read_state();

        for (index, mut descriptor) in state.descriptors.into_iter().enumerate() {
            if registry.contains(&descriptor.id) {
                tracing::warn!("[会话注册表] 忽略重复的会话 {}", descriptor.id);
                continue;
            }
            descriptor.pre_existing = true;
            descriptor.fill_title(index + 1);
            registry.descriptors.push(descriptor);
        }

        registry.active_id = match state.active_id {
            Some(id) if registry.contains(&id) => Some(id),
            _ => registry.descriptors.first().map(|d| d.id.clone()),
        };

        tracing::info!(
            "[会话注册表] 已恢复 {} 个会话，活跃: {:?}",
            registry.descriptors.len(),
            registry.active_id
        );
        registry
    }

    fn read_state(&self) -> PersistedState {
        let raw = match self.store.load(REGISTRY_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return PersistedState::default(),
            Err(e) => {
                tracing::warn!("[会话注册表] 读取持久化状态失败: {}", e);
                return PersistedState::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("[会话注册表] 持久化状态已损坏，重置为空: {}", e);
                PersistedState::default()
            }
        }
    }

    /// 打开会话并设为活跃
    ///
    /// ID 已存在时只激活，返回 `false`。
    pub fn open(&mut self, mut descriptor: SessionDescriptor) -> bool {
        let id = descriptor.id.clone();
        let added = !self.contains(&id);
        if added {
            descriptor.fill_title(self.descriptors.len() + 1);
            tracing::info!(
                "[会话注册表] 打开会话 {} ({})",
                descriptor.id,
                descriptor.title
            );
            self.descriptors.push(descriptor);
        }
        self.active_id = Some(id);
        self.persist();
        added
    }

    /// 设为活跃，ID 不存在时忽略
    pub fn activate(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            tracing::debug!("[会话注册表] 激活不存在的会话 {}，忽略", id);
            return false;
        }
        if self.active_id.as_deref() != Some(id) {
            self.active_id = Some(id.to_string());
            self.persist();
        }
        true
    }

    /// 挂接一个已在后端运行的会话
    pub fn attach_external(
        &mut self,
        id: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        title: Option<String>,
    ) -> bool {
        let descriptor =
            SessionDescriptor::existing(id, title.unwrap_or_default(), working_directory);
        self.open(descriptor)
    }

    /// 关闭会话，返回是否移除了描述符
    ///
    /// 后端关闭失败只记录日志，本地移除照常进行。
    pub async fn close(&mut self, id: &str, options: CloseOptions) -> bool {
        let Some(index) = self.position(id) else {
            tracing::debug!("[会话注册表] 关闭不存在的会话 {}，忽略", id);
            return false;
        };

        if !options.already_terminated_remotely {
            if let Err(e) = self.backend.close(id).await {
                tracing::warn!("[会话注册表] 关闭后端会话 {} 失败: {}", id, e);
            }
        }

        self.descriptors.remove(index);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = self
                .descriptors
                .get(index)
                .or_else(|| index.checked_sub(1).and_then(|i| self.descriptors.get(i)))
                .map(|d| d.id.clone());
        }

        tracing::info!(
            "[会话注册表] 已关闭会话 {} (远端已结束: {})，活跃: {:?}",
            id,
            options.already_terminated_remotely,
            self.active_id
        );
        self.persist();
        true
    }

    pub fn descriptors(&self) -> &[SessionDescriptor] {
        &self.descriptors
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&SessionDescriptor> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&SessionDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// 下一个默认标题
    pub fn next_title(&self) -> String {
        default_title(self.descriptors.len() + 1)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.id == id)
    }

    fn persist(&self) {
        if self.descriptors.is_empty() {
            if let Err(e) = self.store.clear(REGISTRY_STORAGE_KEY) {
                tracing::warn!("[会话注册表] 清除持久化状态失败: {}", e);
            }
            return;
        }

        let state = PersistedState {
            descriptors: self.descriptors.clone(),
            active_id: self.active_id.clone(),
        };
        let result = serde_json::to_string(&state)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.store
                    .save(REGISTRY_STORAGE_KEY, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            tracing::warn!("[会话注册表] 保存持久化状态失败: {}", e);
        }
    }
}
