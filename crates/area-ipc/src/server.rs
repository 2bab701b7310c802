//! In-process loopback compositor.
//!
//! Serves the surface protocol on one connection with memfd-backed colour
//! buffers. Used by `area-egl-loopback` and by the tests of both crates to
//! exercise real SCM_RIGHTS round trips without a display server.

use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::error::{IpcError, Result};
use crate::shm::{aligned_pitch, create_memfd};
use crate::surface_proto::{
    Opcode, PlatformFlags, ReplyHeader, RequestHeader, Status, FORMAT_ARGB8888,
};
use crate::transport::{recv_message, send_message, seqpacket_pair};

const BYTES_PER_PIXEL: u32 = 4;
const PITCH_ALIGN: u32 = 64;

fn ring_stride(width: u32) -> Result<u32> {
    aligned_pitch(width, BYTES_PER_PIXEL, PITCH_ALIGN).ok_or(IpcError::PitchOverflow {
        width,
        cpp: BYTES_PER_PIXEL,
    })
}

/// How colour buffers are identified to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferProtocol {
    /// A numeric name as the single data item.
    Name,
    /// A dma-buf style descriptor as the single ancillary fd.
    Prime,
}

#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    pub protocol: BufferProtocol,
    /// Colour buffers cycled per surface
    pub ring_size: usize,
    /// Report zero width/height in buffer packages, like pre-geometry ABIs
    pub omit_geometry: bool,
    /// Advertise a compositor-owned allocator in the platform data
    pub share_allocator: bool,
    pub honour_swap_interval: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            protocol: BufferProtocol::Prime,
            ring_size: 3,
            omit_geometry: false,
            share_allocator: false,
            honour_swap_interval: true,
        }
    }
}

/// Counters reported when the client hangs up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: u32,
    pub advances: u32,
    pub refused: u32,
}

#[derive(Debug)]
struct RingBuffer {
    name: u32,
    memory: OwnedFd,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledResize {
    after: u32,
    width: u32,
    height: u32,
}

#[derive(Debug)]
struct RemoteSurface {
    width: u32,
    height: u32,
    stride: u32,
    swap_interval: i32,
    ring: Vec<RingBuffer>,
    next: usize,
    advances: u32,
    resize: Option<ScheduledResize>,
}

/// Compositor half of a loopback connection.
#[derive(Debug)]
pub struct LoopbackCompositor {
    socket: OwnedFd,
    options: LoopbackOptions,
    device: OwnedFd,
    surfaces: HashMap<u32, RemoteSurface>,
    next_name: u32,
}

impl LoopbackCompositor {
    pub fn new(socket: OwnedFd, options: LoopbackOptions) -> Result<Self> {
        let device = create_memfd(c"area-loopback-device", 0)?;
        Ok(Self {
            socket,
            options,
            device,
            surfaces: HashMap::new(),
            next_name: 1,
        })
    }

    /// Register a window surface the client can address by `id`.
    pub fn add_surface(&mut self, id: u32, width: u32, height: u32) -> Result<()> {
        let stride = ring_stride(width)?;
        let ring = self.build_ring(stride, height)?;
        self.surfaces.insert(
            id,
            RemoteSurface {
                width,
                height,
                stride,
                swap_interval: 1,
                ring,
                next: 0,
                advances: 0,
                resize: None,
            },
        );
        debug!("Loopback surface {} registered at {}x{}", id, width, height);
        Ok(())
    }

    /// Resize surface `id` once it has handed out `after` buffers.
    pub fn schedule_resize(&mut self, id: u32, after: u32, width: u32, height: u32) -> bool {
        match self.surfaces.get_mut(&id) {
            Some(surface) => {
                surface.resize = Some(ScheduledResize { after, width, height });
                true
            }
            None => false,
        }
    }

    /// Run on its own thread until the client hangs up.
    pub fn spawn(self) -> JoinHandle<Result<ServeStats>> {
        thread::spawn(move || self.serve())
    }

    /// Answer requests until the client hangs up.
    pub fn serve(mut self) -> Result<ServeStats> {
        info!("Loopback compositor serving ({:?} buffers)", self.options.protocol);
        let mut stats = ServeStats::default();

        loop {
            let received = match recv_message::<RequestHeader>(self.socket.as_fd()) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(IpcError::Malformed(reason)) => {
                    // The header could not be read, so the reply echoes nothing.
                    warn!("Malformed request: {}", reason);
                    stats.requests += 1;
                    stats.refused += 1;
                    self.reply_status(&RequestHeader::default(), Status::BadRequest)?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            stats.requests += 1;

            let status = self.handle(&received.header, &mut stats)?;
            if status != Status::Ok {
                stats.refused += 1;
            }
        }

        info!(
            "Loopback client hung up after {} requests ({} buffers)",
            stats.requests, stats.advances
        );
        Ok(stats)
    }

    fn handle(&mut self, request: &RequestHeader, stats: &mut ServeStats) -> Result<Status> {
        if request.magic != RequestHeader::MAGIC {
            return self.reply_status(request, Status::BadRequest);
        }
        let Ok(opcode) = Opcode::try_from(request.opcode) else {
            return self.reply_status(request, Status::BadRequest);
        };

        match opcode {
            Opcode::GetPlatform => {
                let mut reply = ReplyHeader::for_request(request, Status::Ok);
                let mut flags = PlatformFlags::empty();
                if self.options.protocol == BufferProtocol::Prime {
                    flags |= PlatformFlags::PRIME_BUFFERS;
                }
                if self.options.honour_swap_interval {
                    flags |= PlatformFlags::SWAP_INTERVAL;
                }
                reply.flags = flags.bits();

                let data: &[u32] = if self.options.share_allocator { &[1] } else { &[] };
                reply.data_items = data.len() as u32;
                reply.fd_items = 1;
                send_message(self.socket.as_fd(), &reply, data, &[self.device.as_fd()])?;
                Ok(Status::Ok)
            }
            Opcode::GetSurfaceParameters => {
                let Some(surface) = self.surfaces.get(&request.surface) else {
                    return self.reply_status(request, Status::UnknownSurface);
                };
                let mut reply = ReplyHeader::for_request(request, Status::Ok);
                reply.width = surface.width;
                reply.height = surface.height;
                reply.stride = surface.stride;
                reply.format = FORMAT_ARGB8888;
                send_message(self.socket.as_fd(), &reply, &[], &[])?;
                Ok(Status::Ok)
            }
            Opcode::AdvanceBuffer => {
                if !self.surfaces.contains_key(&request.surface) {
                    return self.reply_status(request, Status::UnknownSurface);
                }
                self.apply_due_resize(request.surface)?;
                stats.advances += 1;

                let protocol = self.options.protocol;
                let omit_geometry = self.options.omit_geometry;
                let Some(surface) = self.surfaces.get_mut(&request.surface) else {
                    return self.reply_status(request, Status::UnknownSurface);
                };
                surface.advances += 1;
                let index = surface.next;
                surface.next = (surface.next + 1) % surface.ring.len();

                let mut reply = ReplyHeader::for_request(request, Status::Ok);
                reply.stride = surface.stride;
                reply.format = FORMAT_ARGB8888;
                if !omit_geometry {
                    reply.width = surface.width;
                    reply.height = surface.height;
                }

                let buffer = &surface.ring[index];
                let (data, fds): (Vec<u32>, Vec<BorrowedFd<'_>>) = match protocol {
                    BufferProtocol::Name => (vec![buffer.name], vec![]),
                    BufferProtocol::Prime => (vec![], vec![buffer.memory.as_fd()]),
                };
                reply.data_items = data.len() as u32;
                reply.fd_items = fds.len() as u32;
                send_message(self.socket.as_fd(), &reply, &data, &fds)?;
                Ok(Status::Ok)
            }
            Opcode::SetSwapInterval => {
                if !self.options.honour_swap_interval {
                    return self.reply_status(request, Status::Refused);
                }
                let Some(surface) = self.surfaces.get_mut(&request.surface) else {
                    return self.reply_status(request, Status::UnknownSurface);
                };
                surface.swap_interval = request.arg.max(0);
                debug!(
                    "Loopback surface {} swap interval {}",
                    request.surface, surface.swap_interval
                );
                self.reply_status(request, Status::Ok)
            }
        }
    }

    fn apply_due_resize(&mut self, id: u32) -> Result<()> {
        let due = match self.surfaces.get(&id) {
            Some(surface) => surface
                .resize
                .filter(|resize| surface.advances >= resize.after),
            None => None,
        };
        let Some(resize) = due else {
            return Ok(());
        };

        let stride = ring_stride(resize.width)?;
        let ring = self.build_ring(stride, resize.height)?;
        if let Some(surface) = self.surfaces.get_mut(&id) {
            info!(
                "Loopback surface {} resized {}x{} -> {}x{}",
                id, surface.width, surface.height, resize.width, resize.height
            );
            surface.width = resize.width;
            surface.height = resize.height;
            surface.stride = stride;
            surface.ring = ring;
            surface.next = 0;
            surface.resize = None;
        }
        Ok(())
    }

    fn build_ring(&mut self, stride: u32, height: u32) -> Result<Vec<RingBuffer>> {
        let size = u64::from(stride) * u64::from(height);
        let mut ring = Vec::with_capacity(self.options.ring_size.max(1));
        for _ in 0..self.options.ring_size.max(1) {
            let memory = create_memfd(c"area-loopback-buffer", size)?;
            ring.push(RingBuffer {
                name: self.next_name,
                memory,
            });
            self.next_name += 1;
        }
        Ok(ring)
    }

    fn reply_status(&self, request: &RequestHeader, status: Status) -> Result<Status> {
        let reply = ReplyHeader::for_request(request, status);
        send_message(self.socket.as_fd(), &reply, &[], &[])?;
        Ok(status)
    }
}

/// Start a loopback compositor thread serving `surfaces` (`(id, width, height)`)
/// and return the client end of the connection.
pub fn spawn_loopback(
    options: LoopbackOptions,
    surfaces: &[(u32, u32, u32)],
) -> Result<(OwnedFd, JoinHandle<Result<ServeStats>>)> {
    let (client, server) = seqpacket_pair()?;
    let mut compositor = LoopbackCompositor::new(server, options)?;
    for &(id, width, height) in surfaces {
        compositor.add_surface(id, width, height)?;
    }
    Ok((client, compositor.spawn()))
}
