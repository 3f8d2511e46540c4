//! JSON Lines 传输：每行一个 `{"type": ..., "message": {...}}` 信封
//!
//! `berth` 二进制用 stdin/stdout 作为控制通道；测试里换成内存读写端。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::channel::ControlChannel;
use crate::core::ChannelError;
use crate::ingest::PayloadHandler;
use crate::protocol::{decode_line, InboundMessage, OutboundMessage};

/// 把出站消息逐行写入任意 AsyncWrite
pub struct JsonLinesChannel<W> {
    writer: Mutex<W>,
}

pub type StdioChannel = JsonLinesChannel<tokio::io::Stdout>;

impl StdioChannel {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> JsonLinesChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> ControlChannel for JsonLinesChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// 逐行读取入站消息，载荷交给 PayloadHandler；读到 EOF、收到 CloseMessage 或取消时返回
pub async fn serve_lines<R>(
    reader: R,
    handler: Arc<PayloadHandler>,
    token: CancellationToken,
) -> Result<(), ChannelError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("Control channel reached end of input");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        match decode_line(&line) {
            Ok(InboundMessage::Payload(payload)) => {
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    result = handler.submit(payload) => {
                        if result.is_err() {
                            return Err(ChannelError::Closed);
                        }
                    }
                }
            }
            Ok(InboundMessage::Heartbeat(hb)) => {
                tracing::debug!("Heartbeat received (healthy: {})", hb.healthy);
            }
            Ok(InboundMessage::Close(close)) => {
                tracing::info!(
                    "Control plane closed the channel: {}",
                    close.message.unwrap_or_default()
                );
                return Ok(());
            }
            Ok(InboundMessage::ServerException(e))
            | Ok(InboundMessage::BadRequest(e))
            | Ok(InboundMessage::InvalidCluster(e)) => {
                tracing::warn!(
                    "Control plane reported an error: {}",
                    e.message.unwrap_or_default()
                );
            }
            Err(e) => {
                tracing::warn!("Dropping undecodable message: {}", e);
            }
        }
    }
}
