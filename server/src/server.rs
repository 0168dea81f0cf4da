use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};

use crate::broadcast::BroadcastMessage;
use crate::config::BROADCAST_CHANNEL_CAPACITY;
use crate::error::ServerError;
use crate::handler::ClientHandler;
use crate::state::RelayState;

/// TCP front of the relay: accepts connections, assigns client ids,
/// and spawns one [`ClientHandler`] task per connection against the
/// shared state.
pub struct RelayServer {
    state: Arc<RwLock<RelayState>>,
    next_client_id: AtomicU64,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl RelayServer {
    #[must_use]
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(RelayState::new())),
            next_client_id: AtomicU64::new(1),
            broadcast_tx,
        }
    }

    /// Binds the given port and serves connections until the listener
    /// fails.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    pub async fn run(&self, port: u16) -> Result<(), ServerError> {
        let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        info!("relay listening on {}", listener.local_addr()?);

        loop {
            let (socket, peer_addr) = listener.accept().await?;
            self.accept(socket, peer_addr).await;
        }
    }

    /// Binds an address and serves in a background task, returning the
    /// bound address. Used by integration tests with port 0.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    pub async fn bind(self: Arc<Self>, addr: &str) -> Result<SocketAddr, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("relay listening on {}", local_addr);

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer_addr)) => self.accept(socket, peer_addr).await,
                    Err(e) => {
                        error!("accept error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    async fn accept(&self, socket: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        info!("[{}] new connection, client {}", peer_addr, id);

        // Register before the handler runs so the client is addressable
        // from its first packet onward.
        self.state.write().await.connect(id);

        let state = self.state.clone();
        let broadcast_tx = self.broadcast_tx.clone();
        tokio::spawn(async move {
            let mut handler = ClientHandler::new(id, socket, peer_addr, state, broadcast_tx);
            if let Err(e) = handler.handle().await {
                error!("[{}] handler error: {}", peer_addr, e);
            }
        });
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}
