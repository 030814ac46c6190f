//! 浏览器 native messaging 宿主循环。
//!
//! 每条消息由 4 字节小端长度前缀与 UTF-8 JSON 组成。响应按请求顺序写回。

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use submission_relay::{OutboundResponse, RouterHandle};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, warn};

/// 浏览器发往宿主的单条消息上限。
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .little_endian()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// 读取消息直到输入结束，每条消息写回一条响应。
pub async fn serve<R, W>(reader: R, writer: W, router: RouterHandle) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedRead::new(reader, codec());
    let mut sink = FramedWrite::new(writer, codec());
    let mut handled = 0_u64;

    while let Some(frame) = frames.next().await {
        let frame = frame.context("failed to read native message frame")?;

        let response = match std::str::from_utf8(&frame) {
            Ok(raw) => {
                debug!(len = frame.len(), "native message received");
                router
                    .request_json(raw)
                    .await
                    .context("relay router stopped")?
            }
            Err(err) => {
                warn!(error = %err, "native message is not valid UTF-8");
                OutboundResponse::error(format!("invalid message: {err}"))
            }
        };

        let payload = serde_json::to_vec(&response).context("failed to encode response")?;
        sink.send(Bytes::from(payload))
            .await
            .context("failed to write native message response")?;
        handled += 1;
    }

    info!(handled, "native messaging input closed");
    Ok(())
}
