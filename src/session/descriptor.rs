//! 会话描述符
//!
//! 标签页的持久身份：ID、标题、工作目录以及是否为已存在的后端会话。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 会话描述符
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    /// 会话 ID，同时作为后端关联键
    pub id: String,
    /// 标签页标题
    #[serde(default)]
    pub title: String,
    /// 会话根目录
    pub working_directory: PathBuf,
    /// 从持久化状态恢复或挂接到已运行的后端会话
    #[serde(default)]
    pub pre_existing: bool,
}

impl SessionDescriptor {
    /// 新建会话
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            working_directory: working_directory.into(),
            pre_existing: false,
        }
    }

    /// 已存在的后端会话，挂载时先尝试重连
    pub fn existing(
        id: impl Into<String>,
        title: impl Into<String>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pre_existing: true,
            ..Self::new(id, title, working_directory)
        }
    }

    /// 标题为空时按位置补全
    pub(crate) fn fill_title(&mut self, position: usize) {
        if self.title.trim().is_empty() {
            self.title = default_title(position);
        }
    }
}

/// 默认标题 `Terminal N`（N 从 1 开始）
pub fn default_title(position: usize) -> String {
    format!("Terminal {}", position)
}
