//! Newline-delimited framing for producer connections.
//!
//! Bytes accumulate until a `\n` arrives; each complete line is yielded with
//! its terminator (and one trailing `\r`) removed. A producer that sends more
//! than `max_line_bytes` without a terminator is cut off.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Default cap on buffered bytes without a line terminator (20 MB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 20_000_000;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("more than {max} bytes buffered without a line terminator")]
    LineTooLong { max: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_bytes: usize,
    /// Bytes before this offset are known not to contain `\n`.
    scanned: usize,
}

impl LineCodec {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes,
            scanned: 0,
        }
    }

    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        let newline = buf[self.scanned..].iter().position(|b| *b == b'\n');
        let Some(offset) = newline else {
            if buf.len() > self.max_line_bytes {
                return Err(CodecError::LineTooLong {
                    max: self.max_line_bytes,
                });
            }
            self.scanned = buf.len();
            return Ok(None);
        };

        let end = self.scanned + offset;
        self.scanned = 0;
        let line = buf.split_to(end);
        buf.advance(1);

        let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }

    /// An unterminated final line is dropped rather than treated as an error.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
        let line = self.decode(buf)?;
        if line.is_none() {
            buf.clear();
            self.scanned = 0;
        }
        Ok(line)
    }
}
