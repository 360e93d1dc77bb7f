//! Wire format for stream transports.
//!
//! Frame format: `[length:4][kind:1][type:4][correlation:8][payload:N]`
//!
//! - **length**: Size of everything after the length prefix (little-endian u32)
//! - **kind**: [`FrameKind`] code
//! - **type**: Message-type identifier (little-endian u32)
//! - **correlation**: Request/response correlation (little-endian u64)
//! - **payload**: Opaque serialized message
//!
//! In-process transports pass [`Frame`] values directly and never use this
//! encoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared_types::{Frame, FrameKind, MessageTypeId, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Length prefix size.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Header size after the prefix: 1 (kind) + 4 (type) + 8 (correlation).
pub const HEADER_SIZE: usize = 13;

/// Total bytes a frame occupies on the wire.
#[must_use]
pub fn encoded_len(frame: &Frame) -> usize {
    LENGTH_PREFIX_SIZE + HEADER_SIZE + frame.payload.len()
}

/// Append one encoded frame to `buf`.
///
/// # Errors
///
/// Returns `FrameTooLarge` if the payload exceeds `max_frame_size`.
pub fn encode_frame(
    frame: &Frame,
    buf: &mut BytesMut,
    max_frame_size: usize,
) -> Result<(), TransportError> {
    let size = frame.payload.len();
    if size > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }
    let body_len = u32::try_from(HEADER_SIZE + size).map_err(|_| {
        TransportError::FrameTooLarge {
            size,
            max: max_frame_size,
        }
    })?;

    buf.reserve(encoded_len(frame));
    buf.put_u32_le(body_len);
    buf.put_u8(frame.kind as u8);
    buf.put_u32_le(frame.message_type.get());
    buf.put_u64_le(frame.correlation_id);
    buf.extend_from_slice(&frame.payload);
    Ok(())
}

/// Decode a frame body (everything after the length prefix).
///
/// # Errors
///
/// Returns `MalformedFrame` for short bodies or unknown kinds.
pub fn decode_body(mut body: Bytes) -> Result<Frame, TransportError> {
    if body.len() < HEADER_SIZE {
        return Err(TransportError::MalformedFrame(format!(
            "body of {} bytes is shorter than the {HEADER_SIZE}-byte header",
            body.len()
        )));
    }

    let code = body.get_u8();
    let kind = FrameKind::from_code(code)
        .ok_or_else(|| TransportError::MalformedFrame(format!("unknown frame kind {code:#04x}")))?;
    let message_type = MessageTypeId(body.get_u32_le());
    let correlation_id = body.get_u64_le();

    Ok(Frame {
        kind,
        message_type,
        correlation_id,
        payload: body,
    })
}

/// Read one frame from a byte stream.
///
/// Not cancel-safe: dropping the future mid-frame loses stream alignment, so
/// callers only cancel it when abandoning the connection.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Frame, TransportError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;
    let body_len = u32::from_le_bytes(prefix) as usize;

    if body_len < HEADER_SIZE {
        return Err(TransportError::MalformedFrame(format!(
            "length {body_len} is shorter than the header"
        )));
    }
    let payload_len = body_len - HEADER_SIZE;
    if payload_len > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size: payload_len,
            max: max_frame_size,
        });
    }

    let mut body = BytesMut::zeroed(body_len);
    reader.read_exact(&mut body).await?;
    decode_body(body.freeze())
}
