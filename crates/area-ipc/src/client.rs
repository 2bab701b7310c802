//! Blocking client side of the surface protocol.

use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::Path;
use std::sync::Mutex;

use nix::sys::socket::{connect, socket, AddressFamily, SockFlag, SockType, UnixAddr};
use tracing::{debug, info};

use crate::error::{IpcError, Result};
use crate::surface_proto::{
    BufferPackage, Opcode, PlatformFlags, PlatformPackage, ReplyHeader, RequestHeader, Status,
    SurfaceParameters,
};
use crate::transport::{recv_message, send_message, Received};

/// Connection to the compositor.
///
/// Every call is a blocking round trip. Calls from several threads are
/// serialized so replies are never interleaved.
#[derive(Debug)]
pub struct CompositorConnection {
    socket: Mutex<ConnectionState>,
}

#[derive(Debug)]
struct ConnectionState {
    fd: OwnedFd,
    sequence: u32,
}

impl CompositorConnection {
    /// Wrap an already connected SOCK_SEQPACKET socket.
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            socket: Mutex::new(ConnectionState { fd, sequence: 0 }),
        }
    }

    /// Connect to the compositor socket at `path`.
    pub fn connect(path: &Path) -> Result<Self> {
        info!("Connecting to compositor at {:?}", path);

        let fd = socket(
            AddressFamily::Unix,
            SockType::SeqPacket,
            SockFlag::SOCK_CLOEXEC,
            None,
        )?;
        let addr = UnixAddr::new(path)?;
        connect(fd.as_raw_fd(), &addr)?;

        Ok(Self::from_fd(fd))
    }

    fn round_trip(&self, opcode: Opcode, surface: u32, arg: i32) -> Result<Received<ReplyHeader>> {
        let mut state = self
            .socket
            .lock()
            .map_err(|_| IpcError::Malformed("connection lock poisoned".into()))?;
        state.sequence = state.sequence.wrapping_add(1);
        let request = RequestHeader::new(opcode, state.sequence, surface, arg);

        send_message(state.fd.as_fd(), &request, &[], &[])?;
        let reply = recv_message::<ReplyHeader>(state.fd.as_fd())?.ok_or(IpcError::Closed)?;
        let header = reply.header;

        if header.magic != ReplyHeader::MAGIC {
            return Err(IpcError::Malformed(format!("bad reply magic {:#x}", header.magic)));
        }
        if header.sequence != request.sequence || header.opcode != request.opcode {
            return Err(IpcError::Malformed(format!(
                "reply {}/{} does not answer request {}/{}",
                header.opcode, header.sequence, request.opcode, request.sequence
            )));
        }
        if reply.fds.len() != header.fd_items as usize {
            return Err(IpcError::FdCountMismatch {
                announced: header.fd_items,
                received: reply.fds.len(),
            });
        }
        if reply.data.len() != header.data_items as usize {
            return Err(IpcError::Malformed(format!(
                "reply announced {} data items but carried {}",
                header.data_items,
                reply.data.len()
            )));
        }
        if Status::from_raw(header.status) != Some(Status::Ok) {
            debug!(?opcode, status = header.status, "request refused");
            return Err(IpcError::Refused {
                opcode,
                status: header.status,
            });
        }

        Ok(reply)
    }

    pub fn platform(&self) -> Result<PlatformPackage> {
        let reply = self.round_trip(Opcode::GetPlatform, 0, 0)?;
        Ok(PlatformPackage {
            flags: PlatformFlags::from_bits_truncate(reply.header.flags),
            data: reply.data,
            fds: reply.fds,
        })
    }

    pub fn surface_parameters(&self, surface: u32) -> Result<SurfaceParameters> {
        let reply = self.round_trip(Opcode::GetSurfaceParameters, surface, 0)?;
        Ok(SurfaceParameters {
            width: reply.header.width,
            height: reply.header.height,
            format: reply.header.format,
        })
    }

    pub fn advance_buffer(&self, surface: u32) -> Result<BufferPackage> {
        let reply = self.round_trip(Opcode::AdvanceBuffer, surface, 0)?;
        Ok(BufferPackage {
            data: reply.data,
            fds: reply.fds,
            stride: reply.header.stride,
            width: reply.header.width,
            height: reply.header.height,
        })
    }

    pub fn set_swap_interval(&self, surface: u32, interval: i32) -> Result<()> {
        self.round_trip(Opcode::SetSwapInterval, surface, interval)?;
        Ok(())
    }
}
