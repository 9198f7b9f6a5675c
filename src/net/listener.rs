//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind: {0}")]
    Bind(std::io::Error),

    #[error("failed to accept: {0}")]
    Accept(std::io::Error),

    #[error("listener closed")]
    Closed,
}

/// A bounded TCP listener that limits concurrent connections.
///
/// When the limit is reached, `accept` waits until a slot is released.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Ok(Self::with_limit(listener, config.max_connections))
    }

    /// Wrap an already bound listener.
    pub fn from_tcp(listener: TcpListener, max_connections: usize) -> Self {
        Self::with_limit(listener, max_connections)
    }

    fn with_limit(inner: TcpListener, max_connections: usize) -> Self {
        if let Ok(local_addr) = inner.local_addr() {
            tracing::info!(address = %local_addr, max_connections, "Listener bound");
        }
        Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Slot first, then the socket.
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection slot. Released when dropped, even if the handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener = Listener::from_tcp(tcp, 2);
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn invalid_bind_address_is_rejected() {
        let config = ListenerConfig {
            bind_address: "not-an-address".into(),
            ..ListenerConfig::default()
        };
        assert!(matches!(Listener::bind(&config).await, Err(ListenerError::Bind(_))));
    }
}
