//! Error taxonomy of the buffer-exchange core
//!
//! Nothing in this crate retries. Every failure is handed back to the
//! embedding windowing layer, which decides what the frame or surface
//! outcome is.

use area_ipc::IpcError;
use thiserror::Error;

use crate::attachment::Attachment;
use crate::channel::ProtocolGeneration;
use crate::surface::SurfaceId;

pub type Result<T> = std::result::Result<T, SurfaceError>;

#[derive(Debug, Error)]
pub enum SurfaceError {
    /// Allocator or memory exhaustion; surface creation unwinds.
    #[error("allocation failed: {0}")]
    Alloc(&'static str),

    #[error("protocol contract violated: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The compositor was unreachable or declined the request.
    #[error("remote call failed: {0}")]
    Remote(#[from] IpcError),

    #[error("rendering driver failed to create a drawable")]
    Drawable,

    #[error("native window is not valid")]
    BadNativeWindow,

    #[error("{what} is not supported by the {generation} protocol")]
    Unsupported {
        what: &'static str,
        generation: ProtocolGeneration,
    },

    #[error("buffer list capacity of {capacity} exceeded")]
    CapacityExceeded { capacity: usize },

    #[error("colour attachment {0:?} requested before it was populated")]
    UnpopulatedColourSlot(Attachment),

    #[error("window surface has no back colour buffer")]
    MissingBackBuffer,

    #[error("attachment index {0} is out of range")]
    UnknownAttachment(u32),

    #[error("attachment array of {len} entries is not a list of pairs")]
    UnpairedAttachment { len: usize },

    #[error("no live surface {0}")]
    UnknownSurface(SurfaceId),
}

/// Ways the compositor can break the buffer-exchange contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error(
        "{what} carried {data} data items and {fds} descriptors, expected {expected_data} and {expected_fds}"
    )]
    ItemCount {
        what: &'static str,
        data: usize,
        fds: usize,
        expected_data: usize,
        expected_fds: usize,
    },

    #[error("PRIME buffers advertised without a render device descriptor")]
    MissingDevice,
}
