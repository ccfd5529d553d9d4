//! Client session
//!
//! Per-connection counters, owned by the connection's task.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// State of one connected client
#[derive(Debug)]
pub struct ClientSession {
    addr: SocketAddr,
    connected_at: Instant,
    commands: u64,
    uploads: u64,
    downloads: u64,
    bytes_received: u64,
    bytes_sent: u64,
}

impl ClientSession {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connected_at: Instant::now(),
            commands: 0,
            uploads: 0,
            downloads: 0,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn record_command(&mut self) {
        self.commands += 1;
    }

    pub fn record_upload(&mut self, bytes: u64) {
        self.uploads += 1;
        self.bytes_received += bytes;
    }

    pub fn record_download(&mut self, bytes: u64) {
        self.downloads += 1;
        self.bytes_sent += bytes;
    }

    /// One-line summary for the disconnect log
    pub fn summary(&self) -> String {
        format!(
            "{} commands, {} uploads ({} bytes), {} downloads ({} bytes) in {:.1}s",
            self.commands,
            self.uploads,
            self.bytes_received,
            self.downloads,
            self.bytes_sent,
            self.duration().as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut session = ClientSession::new("127.0.0.1:4000".parse().unwrap());
        session.record_command();
        session.record_command();
        session.record_upload(10);
        session.record_download(4);
        session.record_download(6);

        let summary = session.summary();
        assert!(summary.starts_with("2 commands, 1 uploads (10 bytes), 2 downloads (10 bytes)"));
    }
}
