//! # Frames
//!
//! The unit carried by every transport. Payloads are opaque to the core and
//! are produced/consumed only through the serialization registry.
//!
//! `Bytes` payloads are reference counted, so one serialized broadcast frame
//! is shared by every subscriber connection without copying.

use crate::entities::MessageTypeId;
use bytes::Bytes;

/// Kind tag, first byte of the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Role exchange, only valid before application traffic.
    Greeting = 0x01,
    /// Pub/sub message (either direction).
    Message = 0x02,
    /// Request awaiting a correlated reply.
    Request = 0x03,
    /// Successful reply.
    Response = 0x04,
    /// Failed reply; payload is a UTF-8 reason, `message_type` an
    /// [`ErrorCode`].
    Error = 0x05,
}

impl FrameKind {
    /// Decode the kind byte.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Greeting),
            0x02 => Some(Self::Message),
            0x03 => Some(Self::Request),
            0x04 => Some(Self::Response),
            0x05 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Why a request failed, carried in the `message_type` slot of an `Error`
/// frame. Only the server core writes codes other than `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Handler error, missing handler or lost worker.
    Failed = 0,
    /// A service queue could not take the request in time.
    QueueFull = 1,
}

impl ErrorCode {
    /// Decode the code; unknown values read as `Failed`.
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::QueueFull,
            _ => Self::Failed,
        }
    }
}

/// One wire/channel unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Kind tag.
    pub kind: FrameKind,
    /// Message-type identifier of the payload (0 for greeting/error frames).
    pub message_type: MessageTypeId,
    /// Request/response correlation (0 when unused).
    pub correlation_id: u64,
    /// Serialized payload.
    pub payload: Bytes,
}

impl Frame {
    /// Pub/sub message frame.
    #[must_use]
    pub fn message(message_type: MessageTypeId, payload: Bytes) -> Self {
        Self {
            kind: FrameKind::Message,
            message_type,
            correlation_id: 0,
            payload,
        }
    }

    /// Request frame.
    #[must_use]
    pub fn request(message_type: MessageTypeId, correlation_id: u64, payload: Bytes) -> Self {
        Self {
            kind: FrameKind::Request,
            message_type,
            correlation_id,
            payload,
        }
    }

    /// Response frame.
    #[must_use]
    pub fn response(message_type: MessageTypeId, correlation_id: u64, payload: Bytes) -> Self {
        Self {
            kind: FrameKind::Response,
            message_type,
            correlation_id,
            payload,
        }
    }

    /// Error reply carrying a human-readable reason.
    #[must_use]
    pub fn error(correlation_id: u64, reason: &str) -> Self {
        Self::error_with_code(correlation_id, ErrorCode::Failed, reason)
    }

    /// Error reply with an explicit [`ErrorCode`].
    #[must_use]
    pub fn error_with_code(correlation_id: u64, code: ErrorCode, reason: &str) -> Self {
        Self {
            kind: FrameKind::Error,
            message_type: MessageTypeId(code as u32),
            correlation_id,
            payload: Bytes::copy_from_slice(reason.as_bytes()),
        }
    }

    /// Greeting frame with a fixed-size payload.
    #[must_use]
    pub fn greeting(payload: Bytes) -> Self {
        Self {
            kind: FrameKind::Greeting,
            message_type: MessageTypeId(0),
            correlation_id: 0,
            payload,
        }
    }

    /// Reason text of an error frame.
    #[must_use]
    pub fn error_reason(&self) -> Option<String> {
        (self.kind == FrameKind::Error)
            .then(|| String::from_utf8_lossy(&self.payload).into_owned())
    }

    /// Code of an error frame.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        (self.kind == FrameKind::Error).then(|| ErrorCode::from_code(self.message_type.get()))
    }
}
