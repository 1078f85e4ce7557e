//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind listen sockets synchronously during router configuration
//! - Adopt them onto the event loop once it is running
//! - Enforce the connection budget via a shared semaphore

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection budget was closed during shutdown.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Connection budget closed"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bind `addr` without a runtime. The socket is left non-blocking so it
/// can later be handed to [`Listener::from_std`].
pub fn bind_std(addr: SocketAddr) -> Result<std::net::TcpListener, ListenerError> {
    let listener = std::net::TcpListener::bind(addr).map_err(ListenerError::Bind)?;
    listener.set_nonblocking(true).map_err(ListenerError::Bind)?;
    Ok(listener)
}

/// A bound listener whose accepts are limited by a shared budget.
///
/// A permit is acquired before each accept, so once the budget is spent
/// new peers wait in the kernel backlog.
pub struct Listener {
    name: String,
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Adopt a socket from [`bind_std`]. Must be called inside the
    /// event loop's runtime.
    pub fn from_std(
        name: &str,
        listener: std::net::TcpListener,
        connection_limit: Arc<Semaphore>,
    ) -> Result<Self, ListenerError> {
        let inner = TcpListener::from_std(listener).map_err(ListenerError::Bind)?;

        tracing::info!(
            listener = name,
            address = ?inner.local_addr().ok(),
            available_permits = connection_limit.available_permits(),
            "Listener accepting"
        );

        Ok(Self {
            name: name.to_string(),
            inner,
            connection_limit,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = ConnectionPermit::acquire(&self.connection_limit).await?;
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            listener = %self.name,
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, permit))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

/// A slot in the connection budget, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPermit {
    /// Wait for a free slot in `limit`.
    pub async fn acquire(limit: &Arc<Semaphore>) -> Result<Self, ListenerError> {
        let permit = Arc::clone(limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        Ok(Self { _permit: permit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_std_reports_address_in_use() {
        let first = bind_std("127.0.0.1:0".parse().unwrap()).unwrap();
        let taken = first.local_addr().unwrap();

        let err = bind_std(taken).unwrap_err();
        assert!(matches!(err, ListenerError::Bind(_)));
        assert!(err.to_string().starts_with("Failed to bind"));
    }

    #[tokio::test]
    async fn permits_bound_concurrent_accepts() {
        let limit = Arc::new(Semaphore::new(1));
        let std_listener = bind_std("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = Listener::from_std("test", std_listener, Arc::clone(&limit)).unwrap();
        let addr = listener.local_addr().unwrap();

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let (_s1, _, permit) = listener.accept().await.unwrap();
        assert_eq!(limit.available_permits(), 0);

        let _c2 = TcpStream::connect(addr).await.unwrap();
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), listener.accept()).await;
        assert!(blocked.is_err());

        drop(permit);
        let second =
            tokio::time::timeout(std::time::Duration::from_secs(2), listener.accept()).await;
        assert!(second.unwrap().is_ok());
    }

    #[tokio::test]
    async fn closed_budget_fails_acquire() {
        let limit = Arc::new(Semaphore::new(1));
        limit.close();
        assert!(matches!(
            ConnectionPermit::acquire(&limit).await,
            Err(ListenerError::Closed)
        ));
    }
}
