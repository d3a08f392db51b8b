//! Transport Loop
//!
//! Reads newline-delimited frames from the inbound stream and writes frames
//! to the outbound stream. Responses to the bridge's own reverse calls are
//! settled inline; inbound requests and notifications are dispatched on
//! their own tasks so a handler waiting on a reverse call never blocks the
//! reader. All writes go through [`FrameWriter`], one whole frame at a time.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::correlation::CorrelationTable;
use crate::dispatch::{Dispatcher, InboundMethod};
use crate::protocol::{decode_bytes, encode, Message};

/// Serialized writer for the outbound stream
pub struct FrameWriter {
    inner: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl FrameWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Mutex::new(Box::new(writer)),
        }
    }

    /// Write and flush one frame. Concurrent senders queue on the lock, so
    /// frames never interleave.
    pub async fn send(&self, message: &Message) -> io::Result<()> {
        let line = encode(message).map_err(io::Error::other)?;
        debug!("→ {}", line.trim_end());

        let mut writer = self.inner.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }
}

/// Why [`serve`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Inbound stream closed
    Eof,
    /// Host sent `skill/shutdown`
    Shutdown,
}

/// Drive the bridge until EOF or shutdown
pub async fn serve<R>(
    reader: R,
    writer: Arc<FrameWriter>,
    table: Arc<CorrelationTable>,
    dispatcher: Arc<Dispatcher>,
) -> io::Result<ServeOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut in_flight: JoinSet<()> = JoinSet::new();

    info!("Skill bridge ready, waiting for host messages...");

    let outcome = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!("Host disconnected (EOF)");
                break ServeOutcome::Eof;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Inbound read failed: {}", e);
                break ServeOutcome::Eof;
            }
        }
        reap(&mut in_flight);

        let message = match decode_bytes(&buf) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                let frame = String::from_utf8_lossy(&buf);
                warn!(error = %e, frame = %frame.trim(), "Dropping undecodable frame");
                continue;
            }
        };

        debug!("← {}", String::from_utf8_lossy(&buf).trim());

        match message {
            Message::Response(response) => {
                table.settle(response);
            }
            Message::Request(request) => {
                if InboundMethod::parse(&request.method) == InboundMethod::Shutdown {
                    info!("Shutdown requested");
                    let response = dispatcher.handle_request(request).await;
                    if let Err(e) = writer.send(&response.into()).await {
                        error!("Failed to write shutdown ack: {}", e);
                    }
                    break ServeOutcome::Shutdown;
                }
                let dispatcher = dispatcher.clone();
                let writer = writer.clone();
                in_flight.spawn(async move {
                    let id = request.id.clone();
                    let response = dispatcher.handle_request(request).await;
                    if let Err(e) = writer.send(&response.into()).await {
                        error!(%id, "Failed to write response: {}", e);
                    }
                });
            }
            Message::Notification(notification) => {
                if InboundMethod::parse(&notification.method) == InboundMethod::Shutdown {
                    info!("Shutdown notification received");
                    break ServeOutcome::Shutdown;
                }
                let dispatcher = dispatcher.clone();
                in_flight.spawn(async move {
                    dispatcher.handle_notification(notification).await;
                });
            }
        }
    };

    // no response can arrive any more
    let rejected = table.close();
    if rejected > 0 {
        info!(rejected, "Rejected outstanding reverse calls");
    }

    match outcome {
        ServeOutcome::Shutdown => {
            if !in_flight.is_empty() {
                info!(tasks = in_flight.len(), "Abandoning in-flight handlers");
            }
            in_flight.shutdown().await;
        }
        ServeOutcome::Eof => {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    error!("Dispatch task failed: {}", e);
                }
            }
        }
    }

    Ok(outcome)
}

fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.try_join_next() {
        if let Err(e) = joined {
            error!("Dispatch task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ReverseClient, DEFAULT_TIMEOUT};
    use crate::error::ReverseCallError;
    use crate::protocol::{RequestId, Response};
    use crate::skill::SkillDefinition;
    use serde_json::json;
    use tokio::io::AsyncBufReadExt;

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (out, host) = tokio::io::duplex(1024 * 1024);
        let writer = Arc::new(FrameWriter::new(out));

        let mut tasks = JoinSet::new();
        for i in 0..50 {
            let writer = writer.clone();
            tasks.spawn(async move {
                let big = "x".repeat(4096);
                let response = Response::success(RequestId::Number(i), json!({ "blob": big }));
                writer.send(&response.into()).await.unwrap();
            });
        }
        while tasks.join_next().await.is_some() {}
        drop(writer);

        let mut lines = BufReader::new(host).lines();
        let mut count = 0;
        while let Some(line) = lines.next_line().await.unwrap() {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(value["result"]["blob"].as_str().unwrap().len(), 4096);
            count += 1;
        }
        assert_eq!(count, 50);
    }

    #[tokio::test]
    async fn test_shutdown_cleans_up_when_ack_cannot_be_written() {
        let (out, host) = tokio::io::duplex(1024);
        drop(host);
        let writer = Arc::new(FrameWriter::new(out));
        let table = Arc::new(CorrelationTable::new());
        let client = ReverseClient::new(table.clone(), writer.clone(), DEFAULT_TIMEOUT);
        let dispatcher = Arc::new(Dispatcher::new(
            SkillDefinition::new("idle", "Does nothing"),
            client,
            None,
        ));
        let (_, pending) = table.register("state/get");

        let input = &b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"skill/shutdown\"}\n"[..];
        let outcome = serve(input, writer, table.clone(), dispatcher).await.unwrap();

        assert_eq!(outcome, ServeOutcome::Shutdown);
        assert!(table.is_closed());
        assert!(matches!(pending.await.unwrap(), Err(ReverseCallError::TransportClosed)));
    }
}
