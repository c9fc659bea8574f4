//! 通道编解码
//!
//! 后端通道只可靠地传输文本，终端输入输出统一使用标准 Base64 编码。

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::error::TerminalError;

/// Base64 通道编解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCodec;

impl ChannelCodec {
    pub fn new() -> Self {
        Self
    }

    /// 编码任意字节
    pub fn encode(&self, bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    /// 解码通道文本
    pub fn decode(&self, text: &str) -> Result<Vec<u8>, TerminalError> {
        BASE64
            .decode(text)
            .map_err(|e| TerminalError::Base64DecodeFailed(e.to_string()))
    }
}
