//! Client registry
//!
//! Tracks connected clients and enforces the connection limit. The lock is
//! only held to insert, remove or count, never across I/O.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Shared handle to the set of connected clients
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashSet<SocketAddr>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client unless `max_clients` are already connected.
    pub async fn try_register(&self, addr: SocketAddr, max_clients: usize) -> bool {
        let mut clients = self.clients.lock().await;
        if clients.len() >= max_clients {
            return false;
        }
        clients.insert(addr);
        true
    }

    pub async fn unregister(&self, addr: &SocketAddr) {
        self.clients.lock().await.remove(addr);
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registration_respects_limit() {
        let registry = ClientRegistry::new();
        let first: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        let second: SocketAddr = "127.0.0.1:4002".parse().unwrap();

        assert!(registry.try_register(first, 1).await);
        assert!(!registry.try_register(second, 1).await);
        assert_eq!(registry.len().await, 1);

        registry.unregister(&first).await;
        assert!(registry.is_empty().await);
        assert!(registry.try_register(second, 1).await);
    }
}
