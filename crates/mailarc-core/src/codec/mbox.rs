//! Mbox framing: writer for exports, streaming reader for imports.
//!
//! Uses the classic `mboxo` dialect: a `From ` line starts each message
//! and body lines that would collide with the postmark get a `>` quote.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Frame one raw message for appending to an mbox file.
#[must_use]
pub fn encode_message(envelope_from: &str, date: DateTime<Utc>, raw: &[u8]) -> Vec<u8> {
    let postmark = format!(
        "From {envelope_from} {}\n",
        date.format("%a %b %e %H:%M:%S %Y")
    );

    let mut out = Vec::with_capacity(postmark.len() + raw.len() + 2);
    out.extend_from_slice(postmark.as_bytes());
    for line in split_lines(raw) {
        if needs_quote(line) {
            out.push(b'>');
        }
        out.extend_from_slice(line);
    }
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    // Blank separator line before the next postmark.
    out.push(b'\n');
    out
}

/// Streaming mbox splitter. Never holds more than one message in memory.
pub struct MboxReader<R> {
    reader: R,
    current: Option<Vec<u8>>,
    line: Vec<u8>,
    bytes_read: u64,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> MboxReader<R> {
    /// Wrap a buffered reader positioned at the start of an mbox file.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            current: None,
            line: Vec::new(),
            bytes_read: 0,
            finished: false,
        }
    }

    /// Bytes consumed from the underlying reader so far.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next message, `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub async fn next_message(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line).await?;
            if n == 0 {
                self.finished = true;
                return Ok(self.current.take().map(finalize));
            }
            self.bytes_read += n as u64;

            if self.line.starts_with(b"From ") {
                let previous = self.current.replace(Vec::new());
                if let Some(message) = previous {
                    return Ok(Some(finalize(message)));
                }
            } else if let Some(message) = self.current.as_mut() {
                message.extend_from_slice(unquote(&self.line));
            } else {
                // Content before any postmark: tolerate it as a message.
                self.current = Some(unquote(&self.line).to_vec());
            }
        }
    }
}

/// Split into lines, keeping the line endings.
fn split_lines(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    raw.split_inclusive(|&b| b == b'\n')
}

/// A body line needs quoting when it would read as a postmark, quoted
/// or already-quoted forms included.
fn needs_quote(line: &[u8]) -> bool {
    let stripped = strip_quotes(line);
    stripped.starts_with(b"From ")
}

/// Strip one level of `>` quoting from a quoted postmark line.
fn unquote(line: &[u8]) -> &[u8] {
    if line.starts_with(b">") && strip_quotes(line).starts_with(b"From ") {
        &line[1..]
    } else {
        line
    }
}

fn strip_quotes(line: &[u8]) -> &[u8] {
    let quotes = line.iter().take_while(|&&b| b == b'>').count();
    &line[quotes..]
}

/// Drop the trailing blank separator line the framing added.
fn finalize(mut message: Vec<u8>) -> Vec<u8> {
    if message.ends_with(b"\r\n\r\n") {
        message.truncate(message.len() - 2);
    } else if message.ends_with(b"\n\n") {
        message.truncate(message.len() - 1);
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    const FIRST: &[u8] = b"Message-ID: <1@x>\nSubject: one\n\nFrom the very start.\nbody one\n";
    const SECOND: &[u8] = b"Message-ID: <2@x>\nSubject: two\n\n>From already quoted\n";

    fn mbox_bytes() -> Vec<u8> {
        let mut bytes = encode_message("alice@example.com", Utc::now(), FIRST);
        bytes.extend(encode_message("bob@example.com", Utc::now(), SECOND));
        bytes
    }

    #[test]
    fn postmark_collisions_are_quoted() {
        let framed = encode_message("a@x", Utc::now(), FIRST);
        let text = String::from_utf8(framed).unwrap();
        assert!(text.contains("\n>From the very start.\n"));
        // Only the first line is a real postmark.
        assert_eq!(text.matches("\nFrom ").count(), 0);
        assert!(text.starts_with("From a@x "));
    }

    #[tokio::test]
    async fn round_trip_restores_message_bytes() {
        let bytes = mbox_bytes();
        let mut reader = MboxReader::new(BufReader::new(bytes.as_slice()));

        let first = reader.next_message().await.unwrap().unwrap();
        assert_eq!(first, FIRST);
        let second = reader.next_message().await.unwrap().unwrap();
        assert_eq!(second, SECOND);
        assert!(reader.next_message().await.unwrap().is_none());
        assert_eq!(reader.bytes_read(), bytes.len() as u64);
    }

    #[tokio::test]
    async fn empty_input_yields_no_messages() {
        let mut reader = MboxReader::new(BufReader::new(&b""[..]));
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_leading_postmark_is_tolerated() {
        let mut reader = MboxReader::new(BufReader::new(&b"Subject: stray\n\nhello\n"[..]));
        let message = reader.next_message().await.unwrap().unwrap();
        assert!(message.starts_with(b"Subject: stray"));
        assert!(reader.next_message().await.unwrap().is_none());
    }
}
