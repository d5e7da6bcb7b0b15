//! Destination header framing.
//!
//! Sent by the client right after the TLS handshake:
//!
//! ```text
//! +---------+----------------+-------------+-----------------+
//! | hostLen | host           | port (BE)   | payload ...     |
//! | 1 byte  | hostLen bytes  | 2 bytes     | tunneled stream |
//! +---------+----------------+-------------+-----------------+
//! ```
//!
//! Bytes that arrive past the port in the same read are the start of the
//! tunneled stream and are handed back as [`Header::leftover`].

use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Largest possible header: length byte, 255 host bytes, port.
pub const MAX_HEADER_LEN: usize = 1 + u8::MAX as usize + 2;

/// Size of each read while assembling the header.
const READ_CHUNK: usize = 1024;

/// A fully parsed destination header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Raw host bytes, not validated.
    pub host: Bytes,
    pub port: u16,
    /// Tunnel payload that arrived together with the header.
    pub leftover: Bytes,
}

impl Header {
    pub fn new(host: impl Into<Bytes>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            leftover: Bytes::new(),
        }
    }

    /// Host for display purposes; invalid UTF-8 is replaced.
    pub fn host_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.host)
    }

    /// Encode the header frame (without leftover) as a client would send it.
    ///
    /// Hosts longer than 255 bytes cannot be framed and are rejected.
    pub fn encode(&self) -> Option<Bytes> {
        let host_len = u8::try_from(self.host.len()).ok()?;
        let mut buf = BytesMut::with_capacity(1 + self.host.len() + 2);
        buf.put_u8(host_len);
        buf.put_slice(&self.host);
        buf.put_u16(self.port);
        Some(buf.freeze())
    }
}

/// Where the parser is in assembling a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    AwaitingLength,
    AwaitingBody { host_len: u8 },
    Complete,
    Failed,
}

/// Incremental header parser.
///
/// Bytes may be fed in arbitrary chunks; field boundaries need not line up
/// with chunk boundaries.
#[derive(Debug)]
pub struct HeaderParser {
    state: HeaderState,
    buf: BytesMut,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    pub fn new() -> Self {
        Self {
            state: HeaderState::AwaitingLength,
            buf: BytesMut::new(),
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }

    /// Bytes accumulated so far.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append a delivery and return the header once it is complete.
    ///
    /// Once a header has been returned (or the parser has failed) further
    /// input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Header> {
        if matches!(self.state, HeaderState::Complete | HeaderState::Failed) {
            return None;
        }

        // Size the buffer once instead of growing it per delivery.
        let want = match self.state {
            HeaderState::AwaitingBody { host_len } => frame_len(host_len),
            _ => chunk.first().map_or(1, |&len| frame_len(len)),
        };
        self.buf.reserve(want.saturating_sub(self.buf.len()));
        self.buf.extend_from_slice(chunk);

        if self.state == HeaderState::AwaitingLength {
            match self.buf.first() {
                Some(&host_len) => self.state = HeaderState::AwaitingBody { host_len },
                None => return None,
            }
        }

        let HeaderState::AwaitingBody { host_len } = self.state else {
            return None;
        };
        let needed = frame_len(host_len);
        if self.buf.len() < needed {
            return None;
        }

        let mut frame = self.buf.split_to(needed);
        frame.advance(1);
        let host = frame.split_to(host_len as usize).freeze();
        let port = frame.get_u16();
        let leftover = std::mem::take(&mut self.buf).freeze();

        self.state = HeaderState::Complete;
        Some(Header {
            host,
            port,
            leftover,
        })
    }

    /// Mark the client as gone before the header finished.
    pub fn fail(&mut self) -> Error {
        let received = self.buf.len();
        self.state = HeaderState::Failed;
        self.buf = BytesMut::new();
        Error::IncompleteHeader { received }
    }
}

fn frame_len(host_len: u8) -> usize {
    1 + host_len as usize + 2
}

/// Read from `reader` until a complete header has been assembled.
///
/// EOF or a read error before then yields [`Error::IncompleteHeader`].
pub async fn read_header<R>(reader: &mut R) -> Result<Header>
where
    R: AsyncRead + Unpin,
{
    let mut parser = HeaderParser::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return Err(parser.fail()),
            Ok(n) => n,
        };
        if let Some(header) = parser.feed(&chunk[..n]) {
            return Ok(header);
        }
    }
}
