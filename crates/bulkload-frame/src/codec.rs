use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a single little-endian `u32` payload length.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size: 1 GiB, the largest row a writer may ship.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024 * 1024;

/// One decoded unit of a framed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A record payload.
    Record(Bytes),
    /// The zero-length end-of-stream marker.
    End,
}

impl Frame {
    /// The total wire size of this frame (prefix + payload).
    pub fn wire_size(&self) -> usize {
        match self {
            Frame::Record(payload) => LENGTH_PREFIX_SIZE + payload.len(),
            Frame::End => LENGTH_PREFIX_SIZE,
        }
    }
}

/// Encode a record payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length       │ Payload          │
/// │ (4B LE, > 0) │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode the end-of-stream marker.
pub fn encode_terminator(dst: &mut BytesMut) {
    dst.put_u32_le(0);
}

/// Decode a length prefix.
pub fn decode_length(prefix: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_le_bytes(prefix)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
    let payload_len = decode_length(prefix) as usize;

    if payload_len == 0 {
        src.advance(LENGTH_PREFIX_SIZE);
        return Ok(Some(Frame::End));
    }
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    if src.len() < LENGTH_PREFIX_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(Frame::Record(src.split_to(payload_len).freeze())))
}

/// Configuration for frame writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 GiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_record() {
        let mut buf = BytesMut::new();
        encode_frame(b"row-bytes", &mut buf).unwrap();
        assert_eq!(buf.len(), LENGTH_PREFIX_SIZE + 9);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame, Frame::Record(Bytes::from_static(b"row-bytes")));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_terminator_decodes_as_end() {
        let mut buf = BytesMut::new();
        encode_frame(b"AB", &mut buf).unwrap();
        encode_terminator(&mut buf);

        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap(),
            Some(Frame::Record(_))
        ));
        assert_eq!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap(),
            Some(Frame::End)
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_frame(b"", &mut buf),
            Err(FrameError::EmptyPayload)
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_prefix() {
        let mut buf = BytesMut::from(&[0x05, 0x00][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(LENGTH_PREFIX_SIZE + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(64);
        let result = decode_frame(&mut buf, 16);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { size: 64, max: 16 })));
    }

    #[test]
    fn test_length_prefix_is_little_endian() {
        let mut buf = BytesMut::new();
        encode_frame(&[0xAA; 258], &mut buf).unwrap();
        assert_eq!(&buf[..LENGTH_PREFIX_SIZE], &[0x02, 0x01, 0x00, 0x00]);
        assert_eq!(decode_length([0x02, 0x01, 0x00, 0x00]), 258);
    }

    #[test]
    fn test_frame_wire_size() {
        assert_eq!(
            Frame::Record(Bytes::from_static(b"test")).wire_size(),
            LENGTH_PREFIX_SIZE + 4
        );
        assert_eq!(Frame::End.wire_size(), LENGTH_PREFIX_SIZE);
    }
}
