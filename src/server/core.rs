use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::client::{ClientRegistry, handle_client};
use crate::config::NetworkConfig;
use crate::error::ServerError;
use crate::protocol::responses::{self, format_response};
use crate::storage::Storage;

pub struct Server {
    registry: ClientRegistry,
    listener: TcpListener,
    storage: Arc<Storage>,
    config: Arc<NetworkConfig>,
}

impl Server {
    /// Bind the listener. Port 0 picks a free port, see `local_addr`.
    pub async fn bind(config: NetworkConfig, storage: Arc<Storage>) -> Result<Self, ServerError> {
        let addr = config.socket_addr();

        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!("Failed to bind to {}: {}", addr, source);
                return Err(ServerError::Bind { addr, source });
            }
        };
        info!("Server bound to {}", listener.local_addr()?);

        Ok(Self {
            registry: ClientRegistry::new(),
            listener,
            storage,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is cancelled.
    pub async fn start(&self) {
        info!(
            "Starting RAX upload server on {} (max {} clients, root {})",
            self.config.socket_addr(),
            self.config.max_clients,
            self.storage.root().display()
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = self.registry.clone();
                    let storage = Arc::clone(&self.storage);
                    let config = Arc::clone(&self.config);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_new_client(stream, addr, storage, registry, config).await
                        {
                            warn!("Failed to handle client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Greets a new client, registers it, and runs its session.
async fn handle_new_client(
    mut stream: TcpStream,
    client_addr: SocketAddr,
    storage: Arc<Storage>,
    registry: ClientRegistry,
    config: Arc<NetworkConfig>,
) -> Result<(), std::io::Error> {
    if !registry.try_register(client_addr, config.max_clients).await {
        warn!("Refusing {}: {} clients connected", client_addr, config.max_clients);
        let reply = format_response(
            responses::SERVICE_UNAVAILABLE,
            "Too many connections. Try again later.",
        );
        stream.write_all(reply.as_bytes()).await?;
        return Ok(()); // Close connection
    }

    info!(
        "Client connected: {} ({}/{} clients)",
        client_addr,
        registry.len().await,
        config.max_clients
    );

    let greeting = format_response(responses::READY, "Welcome to RAX Upload Server");
    let greeted = stream.write_all(greeting.as_bytes()).await;

    if greeted.is_ok() {
        handle_client(stream, client_addr, storage, registry.clone(), config).await;
    }

    registry.unregister(&client_addr).await;
    greeted
}
