//! Transport error type

use thiserror::Error;

use crate::surface_proto::Opcode;

pub type Result<T> = std::result::Result<T, IpcError>;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("socket call failed: {0}")]
    Sys(#[from] nix::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("compositor refused {opcode:?} (status {status})")]
    Refused { opcode: Opcode, status: u32 },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("{width} pixel rows at {cpp} bytes per pixel overflow the row pitch")]
    PitchOverflow { width: u32, cpp: u32 },

    #[error("reply announced {announced} descriptors but carried {received}")]
    FdCountMismatch { announced: u32, received: usize },
}
