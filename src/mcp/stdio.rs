//! Newline-delimited JSON-RPC transport over stdin/stdout.
//!
//! Each request runs on its own task so a tool call waiting on the plugin does
//! not hold up `ping` or other calls. Replies funnel through one writer task,
//! one JSON document per line.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::mcp::rpc::{json_rpc_error, PARSE_ERROR};
use crate::mcp::server::handle_json_rpc_value;
use crate::mcp::McpState;

/// Lines above this size are dropped without parsing.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Reads requests from `reader` until EOF or `shutdown`, answering on `writer`.
///
/// Returns the writer task, which finishes once every in-flight request has
/// replied.
pub async fn serve<R, W>(
    state: McpState,
    mut reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> std::io::Result<JoinHandle<std::io::Result<()>>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (replies, outbox) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(write_replies(writer, outbox));
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("stdio transport: shutdown signal received");
                break;
            }
            result = read_bounded_line(&mut reader, &mut line, MAX_MESSAGE_BYTES) => result?,
        };

        match read {
            LineRead::Eof => {
                debug!("stdio transport: stdin closed");
                break;
            }
            LineRead::TooLarge => {
                warn!(
                    max_bytes = MAX_MESSAGE_BYTES,
                    "stdio transport: message exceeded size limit, skipping"
                );
                continue;
            }
            LineRead::Line => {}
        }

        let Some(message) = decode_line(&line) else {
            continue;
        };

        let payload = match message {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "stdio transport: unparseable message");
                let _ = replies.send(json_rpc_error(None, PARSE_ERROR, "Parse error"));
                continue;
            }
        };

        let state = state.clone();
        let replies = replies.clone();
        tokio::spawn(async move {
            if let Some(reply) = handle_json_rpc_value(&state, payload).await {
                let _ = replies.send(reply);
            }
        });
    }

    Ok(writer_task)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Line,
    TooLarge,
    Eof,
}

/// Reads one line into `buf` without ever holding more than `max_bytes` of it.
///
/// An oversized line is discarded through its terminating newline so the next
/// read starts on a fresh message. Input ending without a newline still counts
/// as a line.
async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if buf.is_empty() {
                LineRead::Eof
            } else {
                LineRead::Line
            });
        }

        let (chunk_len, complete) = match available.iter().position(|&byte| byte == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if buf.len() + chunk_len > max_bytes {
            reader.consume(chunk_len);
            buf.clear();
            if !complete {
                discard_until_newline(reader).await?;
            }
            return Ok(LineRead::TooLarge);
        }

        buf.extend_from_slice(&available[..chunk_len]);
        reader.consume(chunk_len);
        if complete {
            return Ok(LineRead::Line);
        }
    }
}

async fn discard_until_newline<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }

        match available.iter().position(|&byte| byte == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

/// `None` for lines that are skipped outright: blank or not UTF-8.
fn decode_line(raw: &[u8]) -> Option<Result<Value, serde_json::Error>> {
    let Ok(text) = std::str::from_utf8(raw) else {
        warn!(len = raw.len(), "stdio transport: invalid UTF-8, skipping");
        return None;
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(serde_json::from_str(trimmed))
}

async fn write_replies<W>(
    mut writer: W,
    mut outbox: mpsc::UnboundedReceiver<Value>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = outbox.recv().await {
        let mut encoded = serde_json::to_vec(&reply).map_err(std::io::Error::other)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }

    Ok(())
}
