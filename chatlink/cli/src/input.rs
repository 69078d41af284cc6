//! Line input parsing
//!
//! Anything that does not start with `/` is chat text and is passed through
//! untouched.

use std::io::{self, BufRead};

use tokio::sync::mpsc;

/// One line typed by the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Chat text to send
    Chat(String),
    /// `/stats`
    Stats,
    /// `/connect`
    Connect,
    /// `/reconnect`
    Reconnect,
    /// `/disconnect`
    Disconnect,
    /// `/ping`
    Ping,
    /// `/quit` or `/exit`
    Quit,
    /// `/help`
    Help,
    /// Unrecognised slash command
    Unknown(String),
}

/// Slash commands shown by `/help`
pub const HELP: &str = "commands: /stats /connect /reconnect /disconnect /ping /quit";

impl Input {
    /// Classify a line
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Self::Chat(line.to_string());
        };

        match command.to_ascii_lowercase().as_str() {
            "stats" => Self::Stats,
            "connect" => Self::Connect,
            "reconnect" => Self::Reconnect,
            "disconnect" => Self::Disconnect,
            "ping" => Self::Ping,
            "quit" | "exit" => Self::Quit,
            "help" | "?" => Self::Help,
            _ => Self::Unknown(trimmed.to_string()),
        }
    }
}

/// Read lines on a dedicated OS thread and forward them
///
/// A blocking read parked on this thread does not hold up runtime shutdown.
/// The channel closes at end of input or after the first read error.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::UnboundedReceiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_chat_text_is_verbatim() {
        assert_eq!(
            Input::parse("  hello world "),
            Input::Chat("  hello world ".to_string())
        );
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(Input::parse("/stats"), Input::Stats);
        assert_eq!(Input::parse(" /Reconnect "), Input::Reconnect);
        assert_eq!(Input::parse("/exit"), Input::Quit);
        assert_eq!(
            Input::parse("/bogus"),
            Input::Unknown("/bogus".to_string())
        );
    }

    #[tokio::test]
    async fn test_line_reader_forwards_until_eof() {
        let mut lines = spawn_line_reader(Cursor::new("hello\n/stats\n\nlast")).unwrap();

        let mut seen = Vec::new();
        while let Some(line) = lines.recv().await {
            seen.push(line.unwrap());
        }
        assert_eq!(seen, vec!["hello", "/stats", "", "last"]);
    }
}
