//! Remote Buffer Channel
//!
//! Obtains the identity of the next colour buffer from the compositor. The
//! two protocol generations share one contract and are selected once per
//! display by the capability descriptor:
//!
//! - name/stride: one data item (the buffer name), no descriptors
//! - PRIME: one descriptor, no data items, optionally the surface geometry
//!
//! Any other item count is rejected before the package is used. Nothing is
//! retried; a failed refresh fails the swap or creation in progress.

mod name;
mod prime;

use std::fmt;
use std::os::fd::OwnedFd;

use area_ipc::BufferPackage;

use crate::error::{ProtocolViolation, Result};
use crate::native::NativeWindow;

pub use name::NameChannel;
pub use prime::PrimeChannel;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Buffer-exchange protocol generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolGeneration {
    /// Shared buffer names plus stride.
    NameStride,
    /// PRIME descriptors plus stride and optional geometry.
    Prime,
}

impl fmt::Display for ProtocolGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameStride => f.write_str("name/stride"),
            Self::Prime => f.write_str("PRIME"),
        }
    }
}

/// Identity of the colour buffer the compositor handed out.
#[derive(Debug)]
pub enum BufferIdentity {
    Name {
        name: u32,
        stride: u32,
    },
    Prime {
        fd: OwnedFd,
        stride: u32,
        /// `None` when the compositor did not report geometry
        geometry: Option<Geometry>,
    },
}

pub trait RemoteBufferChannel: fmt::Debug + Send + Sync {
    fn generation(&self) -> ProtocolGeneration;

    /// Advance the window's buffer queue and return the new colour buffer.
    fn refresh_colour_buffer(&self, window: &dyn NativeWindow) -> Result<BufferIdentity>;

    fn set_swap_interval(&self, window: &dyn NativeWindow, interval: i32) -> Result<()>;

    /// Whether the front colour slot is kept locally.
    fn tracks_front_buffer(&self) -> bool;
}

/// The channel implementation for `generation`.
pub fn channel_for(generation: ProtocolGeneration) -> Box<dyn RemoteBufferChannel> {
    match generation {
        ProtocolGeneration::NameStride => Box::new(NameChannel),
        ProtocolGeneration::Prime => Box::new(PrimeChannel),
    }
}

fn check_item_count(
    package: &BufferPackage,
    expected_data: usize,
    expected_fds: usize,
) -> std::result::Result<(), ProtocolViolation> {
    if package.data.len() == expected_data && package.fds.len() == expected_fds {
        return Ok(());
    }
    Err(ProtocolViolation::ItemCount {
        what: "buffer package",
        data: package.data.len(),
        fds: package.fds.len(),
        expected_data,
        expected_fds,
    })
}
