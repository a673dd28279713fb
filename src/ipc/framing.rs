//! Length-prefixed framing shared by agent sockets, driver sockets and trace files.
//!
//! ```text
//! <decimal length>\n<payload bytes>
//! ```
//!
//! The receiver accepts either `\n` or `\r` as the header terminator. There is
//! no magic number, version field or checksum; integrity relies on the
//! underlying reliable stream.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Maximum number of header bytes scanned before a terminator must appear.
pub const MAX_HEADER_SIZE: usize = 128;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Frame header exceeds {max} bytes without a terminator")]
    HeaderOverflow { max: usize },

    #[error("Invalid frame length: {0:?}")]
    InvalidLength(String),

    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// True when the stream ended cleanly between frames.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, FrameError::PeerClosed)
    }
}

/// Encode a single frame into a byte vector.
pub fn encode_frame(message: &[u8]) -> Vec<u8> {
    let header = message.len().to_string();
    let mut buf = Vec::with_capacity(header.len() + 1 + message.len());
    buf.extend_from_slice(header.as_bytes());
    buf.push(b'\n');
    buf.extend_from_slice(message);
    buf
}

/// Write one frame and flush.
pub fn send_frame<W: Write + ?Sized>(writer: &mut W, message: &[u8]) -> Result<(), FrameError> {
    writer.write_all(message.len().to_string().as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(message)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame.
///
/// The header is consumed one byte at a time so that no payload bytes are
/// read past the frame boundary; callers may hand an unbuffered socket in.
pub fn recv_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let len = read_header(reader)?;

    let mut payload = Vec::new();
    payload
        .try_reserve_exact(len)
        .map_err(|e| FrameError::Io(io::Error::new(io::ErrorKind::OutOfMemory, e)))?;

    let got = Read::take(&mut *reader, len as u64).read_to_end(&mut payload)?;
    if got != len {
        return Err(FrameError::Truncated { expected: len, got });
    }
    Ok(payload)
}

fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<usize, FrameError> {
    let mut header = Vec::with_capacity(16);
    let mut byte = [0u8; 1];

    loop {
        let n = match reader.read(&mut byte) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            if header.is_empty() {
                return Err(FrameError::PeerClosed);
            }
            return Err(FrameError::Truncated {
                expected: header.len() + 1,
                got: header.len(),
            });
        }
        if byte[0] == b'\n' || byte[0] == b'\r' {
            break;
        }
        if header.len() >= MAX_HEADER_SIZE {
            return Err(FrameError::HeaderOverflow { max: MAX_HEADER_SIZE });
        }
        header.push(byte[0]);
    }

    parse_length(&header)
}

fn parse_length(header: &[u8]) -> Result<usize, FrameError> {
    let text = String::from_utf8_lossy(header);
    if header.is_empty() || !header.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::InvalidLength(text.into_owned()));
    }
    text.parse::<usize>()
        .map_err(|_| FrameError::InvalidLength(text.into_owned()))
}
