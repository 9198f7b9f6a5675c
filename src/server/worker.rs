//! Per-connection read loop.
//!
//! # Responsibilities
//! - Decode one record at a time and hand it to the gateway
//! - Answer strictly in arrival order, one response per record
//! - Remember the identity a client authenticated as on this connection
//! - Abandon in-flight work when the connection breaks; a peer that only
//!   shuts its write side still gets its pending answer

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::protocol::{envelope, FrameError, MessageFramer};

/// Serve one connection until the peer closes it, the channel breaks, or shutdown.
pub async fn serve_connection<S>(
    stream: S,
    gateway: Arc<Gateway>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), GatewayError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut framer = MessageFramer::new(reader, writer, gateway.max_frame_bytes());
    let mut session_user: Option<String> = None;

    loop {
        let read = tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("Shutdown requested, closing connection");
                return Ok(());
            }
            read = framer.read_message() => read,
        };

        let raw = match read {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(()),
            Err(FrameError::TooLarge { limit }) => {
                return Err(GatewayError::Protocol(format!("record exceeds {limit} bytes")));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(request) = decode(&raw) else {
            tracing::debug!(bytes = raw.len(), "Rejecting malformed record");
            let mut response = envelope::invalid_json();
            envelope::stamp(&mut response, session_user.as_deref(), Utc::now());
            framer.write_message(&response).await?;
            continue;
        };

        let cancellation = CancellationToken::new();
        let ctx = {
            let handled = gateway.handle(request, session_user.as_deref(), cancellation.clone());
            tokio::pin!(handled);
            let mut watch_peer = true;
            loop {
                tokio::select! {
                    ctx = &mut handled => break ctx,
                    peer = framer.peer_closed(), if watch_peer => {
                        watch_peer = false;
                        match peer {
                            // Pipelined bytes stay buffered for the next read.
                            Ok(false) => {}
                            // Write side shut: no more requests, but this one is still answered.
                            Ok(true) => tracing::debug!("Peer finished sending"),
                            Err(e) => {
                                tracing::debug!(error = %e, "Connection lost during request, cancelling");
                                cancellation.cancel();
                            }
                        }
                    }
                }
            }
        };

        if cancellation.is_cancelled() {
            return Ok(());
        }

        if session_user.is_none() {
            session_user = ctx.user().map(str::to_string);
        }

        let user = ctx.user().map(str::to_string);
        let mut response = ctx.into_result();
        envelope::stamp(&mut response, user.as_deref(), Utc::now());
        framer.write_message(&response).await?;
    }
}

/// A record is usable only if it is a JSON object.
fn decode(raw: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::store::{ConnectorRegistry, MemoryConnectorFactory, MemoryStore};
    use serde_json::json;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn gateway(config: &GatewayConfig) -> Arc<Gateway> {
        let store = MemoryStore::new();
        store.insert("test", "orders", decode(br#"{"id": 1}"#).unwrap());
        let factory = MemoryConnectorFactory::new(Arc::new(store));
        Arc::new(Gateway::new(config, Arc::new(ConnectorRegistry::new(Arc::new(factory)))))
    }

    #[tokio::test]
    async fn half_closed_peer_still_gets_response() {
        let (client, server) = duplex(4096);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = tokio::spawn(serve_connection(
            server,
            gateway(&GatewayConfig::default()),
            shutdown_rx,
        ));

        let (read, mut write) = tokio::io::split(client);
        let request = json!({
            "user": "alice", "password": "alice-pass", "type": "query", "collection": "orders"
        });
        write.write_all(format!("{request}\n").as_bytes()).await.unwrap();
        write.shutdown().await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let response: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(response["status"], "success");
        assert_eq!(response["data"], json!([{"id": 1}]));
        assert!(lines.next_line().await.unwrap().is_none());
        assert!(worker.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn oversized_record_closes_without_response() {
        let mut config = GatewayConfig::default();
        config.validation.max_frame_bytes = 16;
        let (client, server) = duplex(4096);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = tokio::spawn(serve_connection(server, gateway(&config), shutdown_rx));

        let (read, mut write) = tokio::io::split(client);
        write.write_all(format!("{}\n", "x".repeat(64)).as_bytes()).await.unwrap();

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
        let mut lines = BufReader::new(read).lines();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[test]
    fn only_objects_decode() {
        assert!(decode(br#"{"type":"auth"}"#).is_some());
        assert!(decode(b"[1,2]").is_none());
        assert!(decode(b"{not json").is_none());
        assert!(decode(b"").is_none());
    }
}
