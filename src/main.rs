//! RAX Upload Server - Entry Point
//!
//! Accepts file uploads over a line protocol and keeps them under a single
//! storage root with generated names.

use log::{error, info};
use std::sync::Arc;

use rax_upload_server::utils::setup_logging;
use rax_upload_server::{Server, ServerConfig, ServerError, Storage};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    setup_logging();

    info!("Launching upload server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let settings = config.storage.to_settings()?;
    let storage = Arc::new(Storage::open(&settings).await?);

    let server = Server::bind(config.network, storage).await?;
    server.start().await;

    Ok(())
}
