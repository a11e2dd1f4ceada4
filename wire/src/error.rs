// Wire-level error type.
//
// The compositor and wm both need to turn a bad frame into an ERROR
// reply without tearing down the whole process, so this stays a plain
// enum with an error code mapping rather than an opaque anyhow::Error.
// Everything above the wire boundary (session/client/event-loop code)
// is free to wrap these in anyhow via `?`.

use thiserror::Error;

/// Error codes carried on the wire in an ERROR reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Invalid = 1,
    NoSurface = 2,
    ShmOpen = 3,
    ShmMap = 4,
}

impl ErrorCode {
    pub fn from_u16(v: u16) -> Option<ErrorCode> {
        match v {
            1 => Some(ErrorCode::Invalid),
            2 => Some(ErrorCode::NoSurface),
            3 => Some(ErrorCode::ShmOpen),
            4 => Some(ErrorCode::ShmMap),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed frame: {0}")]
    Invalid(&'static str),

    #[error("operation referenced unknown surface {0}")]
    NoSurface(u32),

    #[error("failed to open shared memory region")]
    ShmOpen,

    #[error("failed to map shared memory region")]
    ShmMap,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ProtoError {
    /// The wire error code this maps to, if any (transport errors never
    /// reach the wire - the connection is already gone).
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ProtoError::Invalid(_) => Some(ErrorCode::Invalid),
            ProtoError::NoSurface(_) => Some(ErrorCode::NoSurface),
            ProtoError::ShmOpen => Some(ErrorCode::ShmOpen),
            ProtoError::ShmMap => Some(ErrorCode::ShmMap),
            ProtoError::Transport(_) => None,
        }
    }
}
