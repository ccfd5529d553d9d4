use log::{debug, error, info};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::client::{ClientRegistry, ClientSession};
use crate::config::NetworkConfig;
use crate::protocol::responses::{self, format_response};
use crate::protocol::{CommandContext, CommandStatus, handle_command, parse_command};
use crate::storage::Storage;

/// Handles a client connection using the Tokio async runtime.
///
/// - Reads length-limited command lines through a BufReader.
/// - Dispatches commands using `handle_command`; upload payloads are read
///   from the same buffered reader so no bytes are lost between them.
/// - Closes the connection on QUIT, on I/O errors, or after an idle timeout.
pub async fn handle_client(
    stream: TcpStream,
    client_addr: SocketAddr,
    storage: Arc<Storage>,
    registry: ClientRegistry,
    config: Arc<NetworkConfig>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut session = ClientSession::new(client_addr);
    let ctx = CommandContext {
        storage: storage.as_ref(),
        registry: &registry,
        idle_timeout: config.connection_timeout(),
    };
    let max_len = config.max_command_length;
    let mut line = Vec::new();

    loop {
        line.clear();

        let read = timeout(
            config.connection_timeout(),
            (&mut reader)
                .take(max_len as u64 + 1)
                .read_until(b'\n', &mut line),
        )
        .await;

        let n = match read {
            Err(_) => {
                info!("Client {} idle for too long", client_addr);
                let reply = format_response(
                    responses::SERVICE_UNAVAILABLE,
                    "Idle timeout; closing connection",
                );
                let _ = write_half.write_all(reply.as_bytes()).await;
                break;
            }
            Ok(Err(e)) => {
                error!("Failed to read from {}: {}", client_addr, e);
                break;
            }
            Ok(Ok(0)) => {
                info!("Connection closed by client {}", client_addr);
                break;
            }
            Ok(Ok(n)) => n,
        };

        // Enforce command length limit
        if n > max_len {
            if line.last() != Some(&b'\n') {
                if let Err(e) = discard_line(&mut reader).await {
                    error!("Failed to read from {}: {}", client_addr, e);
                    break;
                }
            }
            let reply = format_response(responses::UNKNOWN_COMMAND, "Command too long");
            if write_half.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
            continue;
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            let reply = format_response(responses::UNKNOWN_COMMAND, "Command is not valid UTF-8");
            if write_half.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
            continue;
        };

        let command = parse_command(text);
        info!("Received from {}: {:?}", client_addr, command);

        match handle_command(&command, &mut session, &mut reader, &mut write_half, ctx).await {
            Ok(CommandStatus::CloseConnection) => {
                info!("Closing connection to {}", client_addr);
                break;
            }
            Ok(CommandStatus::Success) => {}
            Ok(CommandStatus::Failure(reason)) => {
                debug!("Command from {} failed: {}", client_addr, reason);
            }
            Err(e) => {
                error!("Connection to {} failed: {}", client_addr, e);
                break;
            }
        }
    }

    let _ = write_half.shutdown().await;
    info!("Client {} disconnected: {}", client_addr, session.summary());
}

/// Skip the remainder of an overlong line without buffering it.
async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = buf.len();
        reader.consume(len);
    }
}
