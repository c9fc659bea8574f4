//! 待渲染输出队列
//!
//! 历史快照加载完成之前到达的实时输出按到达顺序排队，快照渲染后按序取出。

use std::collections::vec_deque::Drain;
use std::collections::VecDeque;

/// 未解码输出块的先进先出队列
#[derive(Debug, Default)]
pub struct PendingChunks {
    chunks: VecDeque<String>,
}

impl PendingChunks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, chunk: String) {
        self.chunks.push_back(chunk);
    }

    /// 按到达顺序取出全部排队块
    pub fn drain_in_order(&mut self) -> Drain<'_, String> {
        self.chunks.drain(..)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
