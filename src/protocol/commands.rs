//! Module `commands`
//!
//! Defines the command parsing logic and the data structures used to
//! represent commands and the outcome of executing them.

/// A command parsed from a client line.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Store `size` bytes that follow under a generated name derived from `name`
    Upload { size: u64, name: String },
    /// Stream a stored file back to the client
    Download(String),
    Delete(String),
    List,
    Info,
    Noop,
    Quit,
    /// Known command with missing or malformed arguments
    Malformed(&'static str),
    Unknown,
}

/// Represents the outcome status of executing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Parses a raw command line into a `Command`.
///
/// Verbs are case-insensitive. `UPLOAD` takes the size first so the name may
/// contain spaces.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim_end_matches(['\r', '\n']).trim_start();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim();

    match cmd.as_str() {
        "UPLOAD" => parse_upload(arg),
        "DOWNLOAD" | "GET" if !arg.is_empty() => Command::Download(arg.to_string()),
        "DELETE" | "DEL" if !arg.is_empty() => Command::Delete(arg.to_string()),
        "DOWNLOAD" | "GET" | "DELETE" | "DEL" => Command::Malformed("missing file name"),
        "LIST" => Command::List,
        "INFO" => Command::Info,
        "NOOP" => Command::Noop,
        "QUIT" | "Q" => Command::Quit,
        _ => Command::Unknown,
    }
}

fn parse_upload(arg: &str) -> Command {
    let mut parts = arg.splitn(2, char::is_whitespace);
    let size = parts.next().unwrap_or("");
    let name = parts.next().unwrap_or("");

    let Ok(size) = size.parse::<u64>() else {
        return Command::Malformed("size must be a non-negative integer");
    };
    if name.trim().is_empty() {
        return Command::Malformed("missing file name");
    }

    Command::Upload {
        size,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_with_spaces_in_name() {
        assert_eq!(
            parse_command("UPLOAD 12 my holiday photo.jpg\r\n"),
            Command::Upload {
                size: 12,
                name: "my holiday photo.jpg".into()
            }
        );
    }

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(parse_command("list"), Command::List);
        assert_eq!(parse_command("Download abc.png"), Command::Download("abc.png".into()));
        assert_eq!(parse_command("del abc.png"), Command::Delete("abc.png".into()));
        assert_eq!(parse_command("q"), Command::Quit);
    }

    #[test]
    fn malformed_upload_arguments() {
        assert!(matches!(parse_command("UPLOAD"), Command::Malformed(_)));
        assert!(matches!(parse_command("UPLOAD abc a.png"), Command::Malformed(_)));
        assert!(matches!(parse_command("UPLOAD -1 a.png"), Command::Malformed(_)));
        assert!(matches!(parse_command("UPLOAD 10"), Command::Malformed(_)));
    }

    #[test]
    fn missing_names_are_malformed() {
        assert!(matches!(parse_command("DOWNLOAD"), Command::Malformed(_)));
        assert!(matches!(parse_command("DELETE   "), Command::Malformed(_)));
    }

    #[test]
    fn unknown_commands() {
        assert_eq!(parse_command("STOR a.png"), Command::Unknown);
        assert_eq!(parse_command(""), Command::Unknown);
    }
}
