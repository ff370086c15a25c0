//! Length-prefixed framing over a byte stream.
//!
//! Wire format: 10 ASCII decimal digits, zero-padded, giving the payload
//! length, immediately followed by that many payload bytes. TCP has no
//! message boundaries, so a reader always reassembles the full payload
//! (looping over short reads) before anything looks at it.
//!
//! Sync functions serve the blocking client; the `_async` variants serve the
//! tokio relay. Both share prefix encoding and parsing.

use std::io::{self, Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{decode_envelope, encode_envelope, DecodeError, Envelope};
use crate::types::FRAME_PREFIX_LEN;

/// Largest length representable in the prefix (10 decimal digits).
pub const MAX_PREFIX_VALUE: u64 = 9_999_999_999;

/// Errors that end a framed connection.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// Stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    Closed,
    #[error("invalid length prefix {0:?}")]
    InvalidPrefix(String),
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge { len: u64, max: u64 },
    #[error("incomplete data: expected {expected} bytes, received {received}")]
    Incomplete { expected: usize, received: usize },
    #[error("payload decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("payload encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// True for read timeouts surfaced by a socket with a receive timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FramingError::Io(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut
        )
    }
}

/// Encode the 10-digit prefix for a payload of `len` bytes.
pub fn encode_prefix(len: usize) -> Result<[u8; FRAME_PREFIX_LEN], FramingError> {
    let len = len as u64;
    if len > MAX_PREFIX_VALUE {
        return Err(FramingError::TooLarge {
            len,
            max: MAX_PREFIX_VALUE,
        });
    }
    let mut out = [b'0'; FRAME_PREFIX_LEN];
    let mut v = len;
    for slot in out.iter_mut().rev() {
        *slot = b'0' + (v % 10) as u8;
        v /= 10;
    }
    Ok(out)
}

/// Parse a prefix and check it against `max_len`.
pub fn parse_prefix(prefix: &[u8; FRAME_PREFIX_LEN], max_len: usize) -> Result<usize, FramingError> {
    if !prefix.iter().all(u8::is_ascii_digit) {
        return Err(FramingError::InvalidPrefix(
            String::from_utf8_lossy(prefix).into_owned(),
        ));
    }
    let len = prefix
        .iter()
        .fold(0u64, |acc, &b| acc * 10 + (b - b'0') as u64);
    if len > max_len as u64 {
        return Err(FramingError::TooLarge {
            len,
            max: max_len as u64,
        });
    }
    Ok(len as usize)
}

/// Prefix and payload in one buffer, so a frame goes out in a single write.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let prefix = encode_prefix(payload.len())?;
    let mut buf = Vec::with_capacity(FRAME_PREFIX_LEN + payload.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(payload);
    Ok(buf)
}

// ============== Blocking ==============

/// Read until `buf` is full or the stream ends. Returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FramingError> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one complete frame payload.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, FramingError> {
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    let got = read_full(reader, &mut prefix)?;
    if got == 0 {
        return Err(FramingError::Closed);
    }
    if got < FRAME_PREFIX_LEN {
        return Err(FramingError::Incomplete {
            expected: FRAME_PREFIX_LEN,
            received: got,
        });
    }

    let len = parse_prefix(&prefix, max_len)?;
    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload)?;
    if got != len {
        return Err(FramingError::Incomplete {
            expected: len,
            received: got,
        });
    }
    Ok(payload)
}

/// Encode an envelope and write it as one frame.
pub fn send_envelope<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<(), FramingError> {
    let payload = encode_envelope(envelope)?;
    write_frame(writer, &payload)
}

/// Read one frame and decode it as an envelope.
pub fn recv_envelope<R: Read>(reader: &mut R, max_len: usize) -> Result<Envelope, FramingError> {
    let payload = read_frame(reader, max_len)?;
    Ok(decode_envelope(&payload)?)
}

// ============== Async ==============

async fn read_full_async<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Write one frame and flush.
pub async fn write_frame_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FramingError> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one complete frame payload.
pub async fn read_frame_async<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Vec<u8>, FramingError> {
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    let got = read_full_async(reader, &mut prefix).await?;
    if got == 0 {
        return Err(FramingError::Closed);
    }
    if got < FRAME_PREFIX_LEN {
        return Err(FramingError::Incomplete {
            expected: FRAME_PREFIX_LEN,
            received: got,
        });
    }

    let len = parse_prefix(&prefix, max_len)?;
    let mut payload = vec![0u8; len];
    let got = read_full_async(reader, &mut payload).await?;
    if got != len {
        return Err(FramingError::Incomplete {
            expected: len,
            received: got,
        });
    }
    Ok(payload)
}

pub async fn send_envelope_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
) -> Result<(), FramingError> {
    let payload = encode_envelope(envelope)?;
    write_frame_async(writer, &payload).await
}

pub async fn recv_envelope_async<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Envelope, FramingError> {
    let payload = read_frame_async(reader, max_len).await?;
    Ok(decode_envelope(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ControlSignal, StateSnapshot};
    use crate::types::DEFAULT_MAX_FRAME_LEN;
    use std::io::Cursor;

    /// Hands out at most `chunk` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn prefix_is_ten_zero_padded_digits() {
        assert_eq!(&encode_prefix(0).unwrap(), b"0000000000");
        assert_eq!(&encode_prefix(1234).unwrap(), b"0000001234");
        assert_eq!(&encode_prefix(9_999_999_999).unwrap(), b"9999999999");
    }

    #[test]
    fn frame_layout_matches_wire_format() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(frame, b"0000000005hello".to_vec());
    }

    #[test]
    fn roundtrip_various_sizes() {
        for len in [0usize, 1, 9, 10, 11, 4096, 65_537, 1_000_000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut buf = Vec::new();
            write_frame(&mut buf, &payload).unwrap();
            let got = read_frame(&mut Cursor::new(buf), DEFAULT_MAX_FRAME_LEN).unwrap();
            assert_eq!(got.len(), len);
            assert_eq!(got, payload);
        }
    }

    #[test]
    fn one_byte_reads_reassemble_the_same_message() {
        let payload = encode_envelope(&Envelope::State(StateSnapshot::standard())).unwrap();
        let frame = encode_frame(&payload).unwrap();

        let whole = read_frame(&mut Cursor::new(frame.clone()), DEFAULT_MAX_FRAME_LEN).unwrap();
        let mut trickle = Trickle {
            data: frame,
            pos: 0,
            chunk: 1,
        };
        let pieces = read_frame(&mut trickle, DEFAULT_MAX_FRAME_LEN).unwrap();
        assert_eq!(whole, pieces);
        assert_eq!(pieces, payload);
    }

    #[test]
    fn back_to_back_frames_keep_boundaries() {
        let mut buf = Vec::new();
        send_envelope(&mut buf, &Envelope::control(ControlSignal::Waiting)).unwrap();
        send_envelope(&mut buf, &Envelope::control(ControlSignal::Started)).unwrap();
        send_envelope(&mut buf, &Envelope::State(StateSnapshot::standard())).unwrap();

        let mut trickle = Trickle {
            data: buf,
            pos: 0,
            chunk: 7,
        };
        assert_eq!(
            recv_envelope(&mut trickle, DEFAULT_MAX_FRAME_LEN).unwrap(),
            Envelope::control(ControlSignal::Waiting)
        );
        assert_eq!(
            recv_envelope(&mut trickle, DEFAULT_MAX_FRAME_LEN).unwrap(),
            Envelope::control(ControlSignal::Started)
        );
        assert_eq!(
            recv_envelope(&mut trickle, DEFAULT_MAX_FRAME_LEN).unwrap(),
            Envelope::State(StateSnapshot::standard())
        );
        assert!(matches!(
            recv_envelope(&mut trickle, DEFAULT_MAX_FRAME_LEN),
            Err(FramingError::Closed)
        ));
    }

    #[test]
    fn rejects_non_numeric_prefix() {
        let mut cursor = Cursor::new(b"00000x0005hello".to_vec());
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(err, FramingError::InvalidPrefix(_)));

        // Signs and padding spaces are not digits either.
        let mut cursor = Cursor::new(b"+000000005hello".to_vec());
        assert!(matches!(
            read_frame(&mut cursor, DEFAULT_MAX_FRAME_LEN),
            Err(FramingError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn rejects_oversized_length_before_allocating() {
        let mut cursor = Cursor::new(b"9999999999".to_vec());
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(
            err,
            FramingError::TooLarge {
                len: 9_999_999_999,
                ..
            }
        ));
    }

    #[test]
    fn truncated_payload_is_incomplete() {
        let mut cursor = Cursor::new(b"0000000010short".to_vec());
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(
            err,
            FramingError::Incomplete {
                expected: 10,
                received: 5
            }
        ));
    }

    #[test]
    fn truncated_prefix_is_incomplete_not_closed() {
        let mut cursor = Cursor::new(b"00000".to_vec());
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(
            err,
            FramingError::Incomplete {
                expected: 10,
                received: 5
            }
        ));

        let mut empty = Cursor::new(Vec::new());
        assert!(matches!(
            read_frame(&mut empty, DEFAULT_MAX_FRAME_LEN),
            Err(FramingError::Closed)
        ));
    }

    #[test]
    fn malformed_payload_is_decode_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"{not json").unwrap();
        let err = recv_envelope(&mut Cursor::new(buf), DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(err, FramingError::Decode(_)));
    }

    #[tokio::test]
    async fn async_roundtrip_over_duplex_with_small_buffer() {
        // An 8-byte duplex buffer forces many partial reads and writes.
        let (mut a, mut b) = tokio::io::duplex(8);
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
        let expected = payload.clone();

        let writer = tokio::spawn(async move {
            write_frame_async(&mut a, &payload).await.unwrap();
        });
        let got = read_frame_async(&mut b, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        writer.await.unwrap();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn async_envelope_and_clean_close() {
        let (mut a, mut b) = tokio::io::duplex(256);
        send_envelope_async(&mut a, &Envelope::control(ControlSignal::Heartbeat))
            .await
            .unwrap();
        drop(a);

        assert_eq!(
            recv_envelope_async(&mut b, DEFAULT_MAX_FRAME_LEN).await.unwrap(),
            Envelope::control(ControlSignal::Heartbeat)
        );
        assert!(matches!(
            read_frame_async(&mut b, DEFAULT_MAX_FRAME_LEN).await,
            Err(FramingError::Closed)
        ));
    }
}
