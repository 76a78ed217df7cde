//! Serial RFID readers
//!
//! Protocol:
//! - ASCII, one tag per line terminated by CR/LF
//! - Full tags are 16 characters (`999_000000001007`), shorter reads are
//!   delivered as incomplete
//! - `?<code>` lines are reader errors
//!
//! Reads arrive in arbitrary chunks, so bytes are buffered until a line ends.

use crate::domain::types::{RfidRead, RfidReader};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

/// Length of a complete tag string
const TAG_LEN: usize = 16;

/// Discard a partial line that grows beyond this without a terminator
const MAX_LINE_LEN: usize = 128;

/// Delay before reopening a failed port
const REOPEN_DELAY: Duration = Duration::from_secs(5);

/// One decoded reader line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderLine {
    Tag { tag: String, complete: bool },
    Error(i32),
}

fn parse_line(line: &str) -> Option<ReaderLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(code) = line.strip_prefix('?') {
        return Some(ReaderLine::Error(code.trim().parse().unwrap_or(-1)));
    }
    Some(ReaderLine::Tag { tag: line.to_string(), complete: line.len() >= TAG_LEN })
}

/// Reader error codes as documented for the reader firmware
pub fn error_str(code: i32) -> &'static str {
    match code {
        1 => "Invalid command",
        2 => "Invalid command parameter",
        3 => "Command not recognized",
        4 => "Unable to access EEPROM",
        5 => "Command buffer overflow",
        6 => "Invalid tag data",
        _ => "Unknown error",
    }
}

/// Accumulates serial bytes and yields complete lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ReaderLine> {
        let mut lines = Vec::new();
        for &b in chunk {
            if b == b'\n' || b == b'\r' {
                if !self.buf.is_empty() {
                    let text = String::from_utf8_lossy(&self.buf).into_owned();
                    lines.extend(parse_line(&text));
                    self.buf.clear();
                }
                continue;
            }
            if self.buf.len() >= MAX_LINE_LEN {
                debug!(discarded = self.buf.len(), "rfid_line_overflow");
                self.buf.clear();
            }
            self.buf.push(b);
        }
        lines
    }
}

/// Listens to one reader and forwards its tag reads
pub struct RfidListener {
    reader: RfidReader,
    device: String,
    baud: u32,
    tx: mpsc::Sender<RfidRead>,
    decoder: LineDecoder,
}

impl RfidListener {
    pub fn new(reader: RfidReader, device: &str, baud: u32, tx: mpsc::Sender<RfidRead>) -> Self {
        Self { reader, device: device.to_string(), baud, tx, decoder: LineDecoder::new() }
    }

    /// Turn decoded lines into reads; reader errors are logged and dropped
    fn forward(&self, lines: Vec<ReaderLine>) -> bool {
        for line in lines {
            match line {
                ReaderLine::Tag { tag, complete } => {
                    info!(reader = %self.reader, tag = %tag, complete = complete, "rfid_tag_read");
                    let read = RfidRead { reader: self.reader, tag, complete };
                    if let Err(e) = self.tx.try_send(read) {
                        warn!(reader = %self.reader, error = %e, "rfid_read_dropped");
                        if matches!(e, mpsc::error::TrySendError::Closed(_)) {
                            return false;
                        }
                    }
                }
                ReaderLine::Error(code) => {
                    warn!(reader = %self.reader, code = code, message = error_str(code), "rfid_reader_error");
                }
            }
        }
        true
    }

    /// Read until shutdown, reopening the port after failures
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(reader = %self.reader, device = %self.device, baud = self.baud, "rfid_listener_started");

        loop {
            let port = tokio_serial::new(&self.device, self.baud)
                .timeout(Duration::from_millis(100))
                .open_native_async();

            let mut port = match port {
                Ok(p) => {
                    info!(reader = %self.reader, device = %self.device, "rfid_port_opened");
                    p
                }
                Err(e) => {
                    error!(reader = %self.reader, device = %self.device, error = %e, "rfid_port_open_failed");
                    tokio::select! {
                        _ = shutdown.changed() => {
                            info!(reader = %self.reader, "rfid_shutdown");
                            return;
                        }
                        _ = tokio::time::sleep(REOPEN_DELAY) => continue,
                    }
                }
            };

            let mut buf = [0u8; 64];
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(reader = %self.reader, "rfid_shutdown");
                            return;
                        }
                    }
                    result = port.read(&mut buf) => {
                        match result {
                            Ok(0) => {}
                            Ok(n) => {
                                let lines = self.decoder.push(&buf[..n]);
                                if !self.forward(lines) {
                                    info!(reader = %self.reader, "rfid_channel_closed");
                                    return;
                                }
                            }
                            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                            Err(e) => {
                                warn!(reader = %self.reader, error = %e, "rfid_read_error");
                                break;
                            }
                        }
                    }
                }
            }

            self.decoder = LineDecoder::new();
            tokio::time::sleep(REOPEN_DELAY).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("999_000000001007\r"),
            Some(ReaderLine::Tag { tag: "999_000000001007".to_string(), complete: true })
        );
        assert_eq!(
            parse_line("999_0000"),
            Some(ReaderLine::Tag { tag: "999_0000".to_string(), complete: false })
        );
        assert_eq!(parse_line("?3"), Some(ReaderLine::Error(3)));
        assert_eq!(parse_line("  "), None);
    }

    #[test]
    fn test_decoder_joins_chunks() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"999_0000").is_empty());
        let lines = decoder.push(b"00001007\r\n?1\r\n");
        assert_eq!(
            lines,
            vec![
                ReaderLine::Tag { tag: "999_000000001007".to_string(), complete: true },
                ReaderLine::Error(1),
            ]
        );
        assert!(decoder.push(b"\r\n").is_empty());
    }

    #[test]
    fn test_decoder_discards_runaway_line() {
        let mut decoder = LineDecoder::new();
        decoder.push(&[b'x'; MAX_LINE_LEN + 10]);
        let lines = decoder.push(b"\n");
        assert_eq!(lines, vec![ReaderLine::Tag { tag: "x".repeat(10), complete: false }]);
    }

    #[tokio::test]
    async fn test_forward_sends_reads() {
        let (tx, mut rx) = mpsc::channel(4);
        let listener = RfidListener::new(RfidReader::Outer, "/dev/null", 9600, tx);
        let ok = listener.forward(vec![
            ReaderLine::Error(6),
            ReaderLine::Tag { tag: "999_000000001007".to_string(), complete: true },
        ]);
        assert!(ok);
        let read = rx.recv().await.unwrap();
        assert_eq!(read.reader, RfidReader::Outer);
        assert_eq!(read.tag, "999_000000001007");
        assert!(read.complete);
        assert!(rx.try_recv().is_err());
    }
}
