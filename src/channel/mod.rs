//! 控制通道：与控制面之间的双向消息传输
//!
//! 同步核心只依赖 `ControlChannel::send`；连接、分帧、重连等由具体实现负责。

pub mod stdio;

use async_trait::async_trait;

use crate::core::ChannelError;
use crate::protocol::OutboundMessage;

pub use stdio::{serve_lines, JsonLinesChannel, StdioChannel};

/// 出站消息发送端；失败只上报，不在本层重试
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError>;
}
