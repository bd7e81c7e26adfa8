//! Newline-delimited message transport.
//!
//! MCP's stdio transport carries one UTF-8 JSON-RPC message per line: the
//! client writes to our stdin, we answer on stdout, and stderr is left to
//! logging. [`LineTransport`] works over any async reader/writer pair so the
//! bridge can also be driven from in-memory pipes.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// The transport used by the `bridge` subcommand.
pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

/// Reads lines from `R` and writes JSON lines to `W`.
#[derive(Debug)]
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over `reader` and `writer`.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Returns the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Reads the next line without its terminator. `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the line is not UTF-8.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Serialises `message` onto a single line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        debug_assert!(!json.contains('\n'));

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{RequestId, Response};
    use serde_json::json;

    #[tokio::test]
    async fn reads_lines_without_terminators() {
        let input: &[u8] = b"first\r\nsecond\nlast";
        let mut transport = LineTransport::new(BufReader::new(input), Vec::new());

        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writes_one_line_per_message() {
        let mut transport = LineTransport::new(BufReader::new(&b""[..]), Vec::new());
        let response = Response::result(
            RequestId::Number(1),
            json!({"text": "multi\nline", "nested": {"key": "value"}}),
        );
        transport.write_message(&response).await.unwrap();
        transport.write_message(&json!({"second": true})).await.unwrap();

        let written = String::from_utf8(transport.writer).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["result"]["text"], "multi\nline");
    }
}
