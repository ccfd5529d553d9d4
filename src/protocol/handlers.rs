//! Command handlers
//!
//! Maps parsed commands onto storage gateway calls and writes the replies.
//! Upload and download payloads travel on the same connection, framed by the
//! size announced in the preceding reply or command.

use std::io;
use std::time::Duration;

use chrono::SecondsFormat;
use log::{error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::client::{ClientRegistry, ClientSession};
use crate::error::StorageError;
use crate::error::handlers::{error_to_reply, handle_error};
use crate::protocol::responses::{self, format_response};
use crate::protocol::{Command, CommandStatus};
use crate::storage::settings::BLOCKED_EXTENSIONS;
use crate::storage::{Storage, StoredFile};
use crate::utils::IdleTimeout;

/// Shared services a command may use
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub storage: &'a Storage,
    pub registry: &'a ClientRegistry,
    /// Longest pause allowed while a payload is in transit
    pub idle_timeout: Duration,
}

/// Dispatches a received command to its corresponding handler.
///
/// # Arguments
///
/// * `command` - The parsed command.
/// * `session` - Counters of the connection that sent it.
/// * `reader` - Connection input, used for upload payloads.
/// * `writer` - Connection output, used for replies and download payloads.
/// * `ctx` - Storage gateway, client registry and payload idle timeout.
///
/// # Returns
///
/// * `CommandStatus` - Outcome of the command. An `Err` means the connection
///   itself failed and should be dropped.
pub async fn handle_command<R, W>(
    command: &Command,
    session: &mut ClientSession,
    reader: &mut R,
    writer: &mut W,
    ctx: CommandContext<'_>,
) -> io::Result<CommandStatus>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    session.record_command();

    let status = match command {
        Command::Upload { size, name } => {
            handle_cmd_upload(session, reader, writer, ctx, *size, name).await?
        }
        Command::Download(name) => handle_cmd_download(session, writer, ctx, name).await?,
        Command::Delete(name) => handle_cmd_delete(writer, ctx.storage, name).await?,
        Command::List => handle_cmd_list(writer, ctx.storage).await?,
        Command::Info => handle_cmd_info(writer, ctx).await?,
        Command::Noop => reply(writer, responses::OK, "OK", CommandStatus::Success).await?,
        Command::Quit => {
            reply(writer, responses::GOODBYE, "Goodbye", CommandStatus::CloseConnection).await?
        }
        Command::Malformed(reason) => {
            let message = format!("Syntax error: {reason}");
            reply(
                writer,
                responses::SYNTAX_ERROR,
                &message,
                CommandStatus::Failure(reason.to_string()),
            )
            .await?
        }
        Command::Unknown => {
            reply(
                writer,
                responses::UNKNOWN_COMMAND,
                "Unknown command",
                CommandStatus::Failure("Unknown command".into()),
            )
            .await?
        }
    };

    writer.flush().await?;
    Ok(status)
}

async fn reply<W>(
    writer: &mut W,
    code: u16,
    message: &str,
    status: CommandStatus,
) -> io::Result<CommandStatus>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(format_response(code, message).as_bytes()).await?;
    Ok(status)
}

async fn reply_error<W>(writer: &mut W, err: StorageError) -> io::Result<CommandStatus>
where
    W: AsyncWrite + Unpin,
{
    handle_error(&err);
    writer.write_all(error_to_reply(&err).as_bytes()).await?;
    Ok(CommandStatus::Failure(err.to_string()))
}

/// Handles UPLOAD: checks size and name, invites the payload, then stores it.
///
/// The payload is always consumed in full so the next command line is read
/// from the right place, even when storing fails part way. A client that
/// stalls mid-payload is disconnected and its partial file removed.
async fn handle_cmd_upload<R, W>(
    session: &mut ClientSession,
    reader: &mut R,
    writer: &mut W,
    ctx: CommandContext<'_>,
    size: u64,
    name: &str,
) -> io::Result<CommandStatus>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let storage = ctx.storage;

    // 1. Refuse before the client sends anything
    if let Err(e) = storage.preflight(name, Some(size)) {
        return reply_error(writer, e).await;
    }

    // 2. Invite the payload
    let ready = format!("Ready to receive {size} bytes");
    writer
        .write_all(format_response(responses::DATA_FOLLOWS, &ready).as_bytes())
        .await?;
    writer.flush().await?;

    // 3. Store exactly `size` bytes from the connection
    let mut payload = IdleTimeout::new((&mut *reader).take(size), ctx.idle_timeout);
    let result = storage.write(name, &mut payload, Some(size)).await;

    if let Err(StorageError::StorageIo(e)) = &result {
        if e.kind() == io::ErrorKind::TimedOut {
            warn!("Upload from {} stalled: {}", session.addr(), e);
            writer
                .write_all(
                    format_response(responses::SERVICE_UNAVAILABLE, "Transfer timed out")
                        .as_bytes(),
                )
                .await?;
            return Ok(CommandStatus::CloseConnection);
        }
    }

    let skipped = tokio::io::copy(&mut payload, &mut tokio::io::sink()).await?;
    if skipped > 0 {
        info!(
            "Discarded {} unread payload bytes from {}",
            skipped,
            session.addr()
        );
    }

    // 4. Report
    match result {
        Ok(file) => {
            session.record_upload(file.size);
            info!(
                "Client {} uploaded {:?} as {} ({} bytes)",
                session.addr(),
                file.original_name.as_deref().unwrap_or(""),
                file.stored_name,
                file.size
            );
            let message = format!("{} {}", file.stored_name, file.size);
            reply(
                writer,
                responses::TRANSFER_COMPLETE,
                &message,
                CommandStatus::Success,
            )
            .await
        }
        Err(e) => reply_error(writer, e).await,
    }
}

/// Handles DOWNLOAD: announces the size, then streams the file in chunks.
///
/// A client that stops reading fails the write with `TimedOut`, which drops
/// the connection.
async fn handle_cmd_download<W>(
    session: &mut ClientSession,
    writer: &mut W,
    ctx: CommandContext<'_>,
    name: &str,
) -> io::Result<CommandStatus>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = match ctx.storage.read(name).await {
        Ok(stream) => stream,
        Err(e) => return reply_error(writer, e).await,
    };
    let mut writer = IdleTimeout::new(writer, ctx.idle_timeout);

    let announced = stream.size();
    let header = format!("{announced} bytes");
    writer
        .write_all(format_response(responses::DATA_FOLLOWS, &header).as_bytes())
        .await?;

    let mut sent = 0u64;
    loop {
        match stream.next_chunk().await {
            Ok(Some(chunk)) => {
                writer.write_all(&chunk).await?;
                sent += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(e) => {
                // The size was already promised; the stream cannot be resynchronized
                error!(
                    "Read of {} failed after {} bytes for {}: {}",
                    stream.name(),
                    sent,
                    session.addr(),
                    e
                );
                return Ok(CommandStatus::CloseConnection);
            }
        }
    }

    if sent != announced {
        error!(
            "{} changed while being sent to {} ({} of {} bytes)",
            stream.name(),
            session.addr(),
            sent,
            announced
        );
        return Ok(CommandStatus::CloseConnection);
    }

    session.record_download(sent);
    info!(
        "Client {} downloaded {} ({} bytes)",
        session.addr(),
        stream.name(),
        sent
    );

    reply(
        &mut writer,
        responses::TRANSFER_COMPLETE,
        "Transfer complete",
        CommandStatus::Success,
    )
    .await
}

/// Handles DELETE: removes a stored file.
async fn handle_cmd_delete<W>(writer: &mut W, storage: &Storage, name: &str) -> io::Result<CommandStatus>
where
    W: AsyncWrite + Unpin,
{
    match storage.delete(name).await {
        Ok(()) => {
            let message = format!("Deleted {name}");
            reply(
                writer,
                responses::FILE_ACTION_OK,
                &message,
                CommandStatus::Success,
            )
            .await
        }
        Err(e) => reply_error(writer, e).await,
    }
}

/// Format: "name|size|extension|created"
fn format_entry(file: &StoredFile) -> String {
    format!(
        "{}|{}|{}|{}\r\n",
        file.stored_name,
        file.size,
        file.extension,
        file.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Handles LIST: sends one line per stored file.
async fn handle_cmd_list<W>(writer: &mut W, storage: &Storage) -> io::Result<CommandStatus>
where
    W: AsyncWrite + Unpin,
{
    let files = match storage.list().await {
        Ok(files) => files,
        Err(e) => return reply_error(writer, e).await,
    };

    let header = format!("{} entries", files.len());
    let mut listing = format_response(responses::DATA_FOLLOWS, &header);
    for file in &files {
        listing.push_str(&format_entry(file));
    }
    listing.push_str(&format_response(responses::TRANSFER_COMPLETE, "End of list"));

    writer.write_all(listing.as_bytes()).await?;
    Ok(CommandStatus::Success)
}

/// Handles INFO: limits and current usage.
async fn handle_cmd_info<W>(writer: &mut W, ctx: CommandContext<'_>) -> io::Result<CommandStatus>
where
    W: AsyncWrite + Unpin,
{
    let files = match ctx.storage.list().await {
        Ok(files) => files,
        Err(e) => return reply_error(writer, e).await,
    };
    let total_bytes: u64 = files.iter().map(|file| file.size).sum();
    let allowed: Vec<&str> = ctx.storage.allowed_extensions().iter().collect();

    let message = format!(
        "max_file_size={} allowed={} blocked={} files={} bytes={} clients={}",
        ctx.storage.size_limit().bytes(),
        allowed.join(","),
        BLOCKED_EXTENSIONS.join(","),
        files.len(),
        total_bytes,
        ctx.registry.len().await
    );
    reply(
        writer,
        responses::SYSTEM_STATUS,
        &message,
        CommandStatus::Success,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AllowedExtensionSet, SizeLimit, StorageSettings};

    async fn storage(dir: &tempfile::TempDir, limit: u64) -> Storage {
        let settings = StorageSettings::new(
            dir.path(),
            SizeLimit::new(limit).unwrap(),
            AllowedExtensionSet::new(["png", "txt"]).unwrap(),
        );
        Storage::open(&settings).await.unwrap()
    }

    async fn run(storage: &Storage, line: &str, input: &[u8]) -> (CommandStatus, String) {
        let registry = ClientRegistry::new();
        let mut session = ClientSession::new("127.0.0.1:5555".parse().unwrap());
        let mut reader = input;
        let mut output = Vec::new();
        let ctx = CommandContext {
            storage,
            registry: &registry,
            idle_timeout: Duration::from_secs(5),
        };
        let command = crate::protocol::parse_command(line);
        let status = handle_command(&command, &mut session, &mut reader, &mut output, ctx)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&output).into_owned())
    }

    #[tokio::test]
    async fn upload_reply_carries_stored_name() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024).await;

        let (status, output) = run(&storage, "UPLOAD 5 notes.txt", b"hello").await;
        assert_eq!(status, CommandStatus::Success);

        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("150 Ready to receive 5 bytes"));
        let done = lines.next().unwrap();
        assert!(done.starts_with("226 "));
        assert!(done.ends_with(".txt 5"));
    }

    #[tokio::test]
    async fn oversized_upload_is_refused_before_payload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 4).await;

        let (status, output) = run(&storage, "UPLOAD 5 notes.txt", b"hello").await;
        assert!(matches!(status, CommandStatus::Failure(_)));
        assert_eq!(output, "552 File too large (maximum 4 bytes)\r\n");
    }

    #[tokio::test]
    async fn short_payload_is_reported_as_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024).await;

        let (status, output) = run(&storage, "UPLOAD 10 notes.txt", b"short").await;
        assert!(matches!(status, CommandStatus::Failure(_)));
        assert!(output.ends_with("451 Requested action aborted: local error\r\n"));
        assert!(storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn traversal_download_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024).await;

        let (_, output) = run(&storage, "DOWNLOAD ../../etc/passwd", b"").await;
        assert_eq!(output, "553 Invalid name (TraversalAttempt)\r\n");
    }

    #[tokio::test]
    async fn quit_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024).await;

        let (status, output) = run(&storage, "QUIT", b"").await;
        assert_eq!(status, CommandStatus::CloseConnection);
        assert_eq!(output, "221 Goodbye\r\n");
    }

    #[tokio::test]
    async fn info_reports_limits() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024).await;

        let (_, output) = run(&storage, "INFO", b"").await;
        assert_eq!(
            output,
            "211 max_file_size=1024 allowed=png,txt blocked=exe,sh,bat,cmd,com,pif,scr,vbs,js files=0 bytes=0 clients=0\r\n"
        );
    }

    #[tokio::test]
    async fn stalled_upload_closes_connection_and_removes_partial_file() {
        use tokio::io::AsyncWriteExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir, 1024).await;
        let registry = ClientRegistry::new();
        let mut session = ClientSession::new("127.0.0.1:5556".parse().unwrap());
        let ctx = CommandContext {
            storage: &storage,
            registry: &registry,
            idle_timeout: Duration::from_millis(200),
        };

        // Client sends 3 of the 10 announced bytes and then goes quiet
        let (mut client, mut reader) = tokio::io::duplex(64);
        client.write_all(b"abc").await.unwrap();

        let mut output = Vec::new();
        let command = crate::protocol::parse_command("UPLOAD 10 notes.txt");
        let status = handle_command(&command, &mut session, &mut reader, &mut output, ctx)
            .await
            .unwrap();

        assert_eq!(status, CommandStatus::CloseConnection);
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("150 "));
        assert!(output.ends_with("421 Transfer timed out\r\n"));
        assert_eq!(std::fs::read_dir(storage.root()).unwrap().count(), 0);
        drop(client);
    }
}
