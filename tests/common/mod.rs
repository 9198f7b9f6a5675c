//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use query_gateway::config::GatewayConfig;
use query_gateway::net::Listener;
use query_gateway::observability::audit::TracingAuditSink;
use query_gateway::pipeline::stages::{Clock, ManualClock};
use query_gateway::store::{ConnectorFactory, ConnectorRegistry, MemoryConnectorFactory, MemoryStore};
use query_gateway::{Gateway, GatewayServer, Shutdown};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Plaintext config on an ephemeral port.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.insecure_plaintext = true;
    config.timeouts.shutdown_grace_secs = 2;
    config
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Store with a few orders and users in the default database.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.insert("test", "orders", object(json!({"id": 1, "status": "open"})));
    store.insert("test", "orders", object(json!({"id": 2, "status": "closed"})));
    store.insert("test", "users", object(json!({"name": "alice"})));
    Arc::new(store)
}

pub fn memory_registry() -> Arc<ConnectorRegistry> {
    let factory: Arc<dyn ConnectorFactory> = Arc::new(MemoryConnectorFactory::new(seeded_store()));
    Arc::new(ConnectorRegistry::new(factory))
}

/// A running in-process gateway.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: Arc<ConnectorRegistry>,
    pub task: JoinHandle<()>,
}

impl TestGateway {
    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Trigger shutdown and wait for the server to finish draining.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    start_gateway_with(config, memory_registry(), Arc::new(ManualClock::new())).await
}

pub async fn start_gateway_with(
    config: GatewayConfig,
    registry: Arc<ConnectorRegistry>,
    clock: Arc<dyn Clock>,
) -> TestGateway {
    let gateway = Arc::new(Gateway::with_components(
        &config,
        Arc::clone(&registry),
        Arc::new(TracingAuditSink),
        clock,
    ));
    let server = GatewayServer::new(&config, gateway).unwrap();

    let tcp = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let task = tokio::spawn(async move {
        server.run(listener, &server_shutdown).await.unwrap();
    });

    TestGateway {
        addr,
        shutdown,
        registry,
        task,
    }
}

/// Line-oriented client speaking the gateway protocol.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    pub async fn send_raw(&mut self, line: &[u8]) {
        self.writer.write_all(line).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn send(&mut self, request: Value) {
        self.send_raw(&serde_json::to_vec(&request).unwrap()).await;
    }

    /// Next response, or `None` once the gateway closed the connection.
    pub async fn recv(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for response")
            .unwrap_or(0);
        (read > 0).then(|| serde_json::from_str(&line).unwrap())
    }

    pub async fn request(&mut self, request: Value) -> Value {
        self.send(request).await;
        self.recv().await.expect("connection closed")
    }

    /// Shut the write side only; the gateway sees end of input.
    pub async fn finish_writing(&mut self) {
        self.writer.shutdown().await.unwrap();
    }

    /// Drop the connection with a reset instead of an orderly close.
    #[allow(deprecated)]
    pub fn abort(self) {
        let stream = self.reader.into_inner().reunite(self.writer).unwrap();
        stream.set_linger(Some(Duration::ZERO)).unwrap();
    }

    pub fn into_parts(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}

pub fn alice_query(collection: &str) -> Value {
    json!({
        "user": "alice", "password": "alice-pass",
        "type": "query", "collection": collection, "action": "find", "filter": "{}"
    })
}
