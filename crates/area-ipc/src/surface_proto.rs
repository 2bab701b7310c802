//! Low-level binary protocol for the surface buffer-exchange path.
//!
//! This module defines the C-compatible records exchanged between an EGL
//! client and the compositor over a SOCK_SEQPACKET Unix domain socket.
//!
//! # Protocol Overview
//!
//! 1. **Request**: a single `RequestHeader`, no payload, no descriptors.
//! 2. **Reply**:
//!    - Header: `ReplyHeader`
//!    - Payload: `[u32; data_items]`
//!    - Ancillary Data (SCM_RIGHTS): `[RawFd; fd_items]` (device fd, dma-bufs)
//!
//! Every request gets exactly one reply carrying the request's sequence number.

use std::mem;
use std::os::fd::OwnedFd;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

/// Upper bound on payload words in one reply.
pub const MAX_DATA_ITEMS: usize = 16;
/// Upper bound on descriptors in one reply.
pub const MAX_FD_ITEMS: usize = 4;

/// `DRM_FORMAT_ARGB8888` ("AR24").
pub const FORMAT_ARGB8888: u32 = fourcc(b'A', b'R', b'2', b'4');
/// `DRM_FORMAT_XRGB8888` ("XR24").
pub const FORMAT_XRGB8888: u32 = fourcc(b'X', b'R', b'2', b'4');

pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// Request opcodes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Device descriptor, capability flags and optional platform data.
    GetPlatform = 1,
    /// Current width/height/format of a surface.
    GetSurfaceParameters = 2,
    /// Hand the previous buffer to the compositor and get the next one.
    AdvanceBuffer = 3,
    /// `arg` carries the requested interval.
    SetSwapInterval = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::GetPlatform),
            2 => Ok(Self::GetSurfaceParameters),
            3 => Ok(Self::AdvanceBuffer),
            4 => Ok(Self::SetSwapInterval),
            other => Err(other),
        }
    }
}

/// Reply status codes.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    /// The compositor understood the request and declined it.
    Refused = 1,
    UnknownSurface = 2,
    BadRequest = 3,
}

impl Status {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::Refused),
            2 => Some(Self::UnknownSurface),
            3 => Some(Self::BadRequest),
            _ => None,
        }
    }
}

bitflags! {
    /// Capabilities advertised in the platform reply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PlatformFlags: u32 {
        /// Colour buffers are handed out as PRIME descriptors instead of names.
        const PRIME_BUFFERS = 1 << 0;
        /// The compositor honours swap interval requests.
        const SWAP_INTERVAL = 1 << 1;
    }
}

/// Header of every request.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RequestHeader {
    /// Magic number to verify protocol sync
    pub magic: u32,
    pub opcode: u32,
    /// Sequence number (monotonic counter per connection)
    pub sequence: u32,
    /// Compositor-side surface id; zero for display-level requests
    pub surface: u32,
    /// Opcode-specific argument
    pub arg: i32,
}

/// Header of every reply.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ReplyHeader {
    pub magic: u32,
    pub opcode: u32,
    pub sequence: u32,
    pub status: u32,
    /// Number of `u32` payload words following this header
    pub data_items: u32,
    /// Number of file descriptors attached via ancillary data
    pub fd_items: u32,
    /// Row stride in bytes of the buffer being described
    pub stride: u32,
    /// Zero when the compositor does not report geometry
    pub width: u32,
    pub height: u32,
    /// DRM fourcc
    pub format: u32,
    /// `PlatformFlags` for `GetPlatform`, zero otherwise
    pub flags: u32,
}

impl RequestHeader {
    pub const MAGIC: u32 = 0x4745_5241; // "AREG" in ASCII

    pub fn new(opcode: Opcode, sequence: u32, surface: u32, arg: i32) -> Self {
        Self {
            magic: Self::MAGIC,
            opcode: opcode as u32,
            sequence,
            surface,
            arg,
        }
    }

    /// Size of the header in bytes
    pub const fn size() -> usize {
        mem::size_of::<Self>()
    }
}

impl ReplyHeader {
    pub const MAGIC: u32 = 0x5045_5241; // "AREP" in ASCII

    /// Empty reply to `request` with the given status.
    pub fn for_request(request: &RequestHeader, status: Status) -> Self {
        Self {
            magic: Self::MAGIC,
            opcode: request.opcode,
            sequence: request.sequence,
            status: status as u32,
            ..Self::default()
        }
    }

    /// Size of the header in bytes
    pub const fn size() -> usize {
        mem::size_of::<Self>()
    }
}

/// Decoded `GetPlatform` reply.
#[derive(Debug)]
pub struct PlatformPackage {
    pub flags: PlatformFlags,
    /// Platform data words. Non-empty means the compositor shares its own
    /// buffer allocator with the client.
    pub data: Vec<u32>,
    /// Render device descriptors; at most one is ever sent.
    pub fds: Vec<OwnedFd>,
}

/// Decoded `GetSurfaceParameters` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceParameters {
    pub width: u32,
    pub height: u32,
    pub format: u32,
}

/// Decoded `AdvanceBuffer` reply.
///
/// The name/stride generation sends the buffer name as the single data item;
/// the PRIME generation sends one descriptor and no data. Item counts are
/// checked by the consumer, not here.
#[derive(Debug)]
pub struct BufferPackage {
    pub data: Vec<u32>,
    pub fds: Vec<OwnedFd>,
    pub stride: u32,
    /// Zero on compositors that predate geometry reporting
    pub width: u32,
    pub height: u32,
}
