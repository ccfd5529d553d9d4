//! Reply handling
//!
//! Defines reply codes and formatting. Codes follow the FTP conventions
//! (1xx preliminary, 2xx completion, 4xx transient, 5xx permanent).

pub const DATA_FOLLOWS: u16 = 150;
pub const OK: u16 = 200;
pub const SYSTEM_STATUS: u16 = 211;
pub const READY: u16 = 220;
pub const GOODBYE: u16 = 221;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const FILE_ACTION_OK: u16 = 250;
pub const SERVICE_UNAVAILABLE: u16 = 421;
pub const LOCAL_ERROR: u16 = 451;
pub const UNKNOWN_COMMAND: u16 = 500;
pub const SYNTAX_ERROR: u16 = 501;
pub const FILE_NOT_FOUND: u16 = 550;
pub const ACCESS_DENIED: u16 = 551;
pub const SIZE_EXCEEDED: u16 = 552;
pub const NAME_NOT_ALLOWED: u16 = 553;

/// Format a reply line
pub fn format_response(code: u16, message: &str) -> String {
    format!("{} {}\r\n", code, message)
}
