//! Buffer Descriptor Table
//!
//! Per-surface table of buffer slots indexed by attachment kind. Colour slots
//! are populated at surface creation and only ever refreshed from the
//! compositor; auxiliary slots are allocated on first request and live until
//! the surface is destroyed or resized.

use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd};

use tracing::{debug, trace};

use crate::allocator::{Allocation, LocalAllocator};
use crate::attachment::{Attachment, AttachmentRequest, DriBuffer, ATTACHMENT_COUNT};
use crate::channel::{BufferIdentity, Geometry};
use crate::error::{Result, SurfaceError};

/// Most buffers one get-buffers call may hand to the rendering driver.
pub const MAX_BUFFERS: usize = 5;

/// Fixed-capacity result of a get-buffers call.
#[derive(Clone, Copy)]
pub struct BufferList {
    geometry: Geometry,
    buffers: [DriBuffer; MAX_BUFFERS],
    len: usize,
}

impl BufferList {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            buffers: [DriBuffer::placeholder(Attachment::FrontLeft, 0); MAX_BUFFERS],
            len: 0,
        }
    }

    /// Append a buffer, failing instead of truncating once full.
    pub fn push(&mut self, buffer: DriBuffer) -> Result<()> {
        if self.len == MAX_BUFFERS {
            return Err(SurfaceError::CapacityExceeded {
                capacity: MAX_BUFFERS,
            });
        }
        self.buffers[self.len] = buffer;
        self.len += 1;
        Ok(())
    }

    pub fn as_slice(&self) -> &[DriBuffer] {
        &self.buffers[..self.len]
    }

    pub fn get(&self, attachment: Attachment) -> Option<&DriBuffer> {
        self.as_slice().iter().find(|b| b.attachment == attachment)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Surface geometry at the time of the call.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }
}

impl fmt::Debug for BufferList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferList")
            .field("geometry", &self.geometry)
            .field("buffers", &self.as_slice())
            .finish()
    }
}

#[derive(Debug)]
enum Backing {
    /// Identity comes from the compositor. Holds the PRIME descriptor, if
    /// any, until the next refresh replaces it.
    Remote { _descriptor: Option<OwnedFd> },
    /// Allocated locally, released when the slot is dropped.
    Local { _allocation: Allocation },
}

#[derive(Debug)]
pub struct BufferSlot {
    buffer: DriBuffer,
    backing: Backing,
}

impl BufferSlot {
    pub fn buffer(&self) -> &DriBuffer {
        &self.buffer
    }

    pub fn is_locally_allocated(&self) -> bool {
        matches!(self.backing, Backing::Local { .. })
    }
}

#[derive(Debug)]
pub struct SlotTable {
    slots: [Option<BufferSlot>; ATTACHMENT_COUNT],
}

impl SlotTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, attachment: Attachment) -> Option<&BufferSlot> {
        self.slots[attachment.index()].as_ref()
    }

    /// Number of populated slots.
    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Install a placeholder colour slot whose identity arrives with the
    /// first refresh.
    pub fn populate_colour(&mut self, attachment: Attachment, cpp: u32) {
        debug_assert!(attachment.is_colour());
        self.slots[attachment.index()] = Some(BufferSlot {
            buffer: DriBuffer::placeholder(attachment, cpp),
            backing: Backing::Remote { _descriptor: None },
        });
    }

    /// Install a freshly received identity in the back colour slot.
    ///
    /// Returns the geometry carried by the identity, if any. A PRIME
    /// descriptor replaces (and closes) the previous one.
    pub fn apply_identity(&mut self, identity: BufferIdentity) -> Result<Option<Geometry>> {
        let slot = self.slots[Attachment::BackLeft.index()]
            .as_mut()
            .ok_or(SurfaceError::MissingBackBuffer)?;

        match identity {
            BufferIdentity::Name { name, stride } => {
                slot.buffer.name = name;
                slot.buffer.fd = None;
                slot.buffer.pitch = stride;
                slot.backing = Backing::Remote { _descriptor: None };
                trace!(name, stride, "back buffer refreshed by name");
                Ok(None)
            }
            BufferIdentity::Prime {
                fd,
                stride,
                geometry,
            } => {
                slot.buffer.name = 0;
                slot.buffer.fd = Some(fd.as_raw_fd());
                slot.buffer.pitch = stride;
                slot.backing = Backing::Remote {
                    _descriptor: Some(fd),
                };
                trace!(fd = ?slot.buffer.fd, stride, "back buffer refreshed by descriptor");
                Ok(geometry)
            }
        }
    }

    /// Copy the back slot's metadata into the front slot.
    ///
    /// The front buffer is never independently current: it is a stale
    /// mirror of whatever the back buffer was before the swap.
    pub fn mirror_back_into_front(&mut self) {
        let Some(back) = self.get(Attachment::BackLeft).map(|slot| slot.buffer) else {
            return;
        };
        if let Some(front) = self.slots[Attachment::FrontLeft.index()].as_mut() {
            front.buffer = DriBuffer {
                attachment: Attachment::FrontLeft,
                ..back
            };
        }
    }

    /// Drop every auxiliary slot, releasing its allocation. Returns how many
    /// were released.
    pub fn release_auxiliary(&mut self) -> usize {
        let mut released = 0;
        for attachment in Attachment::ALL.into_iter().filter(|a| !a.is_colour()) {
            if self.slots[attachment.index()].take().is_some() {
                released += 1;
            }
        }
        released
    }

    /// Resolve `requests` into the driver-facing buffer list.
    ///
    /// Missing auxiliary slots are allocated at `geometry`; kinds that cannot
    /// be allocated are left out rather than failing the call. Requesting a
    /// colour slot that was never populated is a contract violation, as is a
    /// window surface without a back buffer.
    pub fn buffers_for(
        &mut self,
        requests: &[AttachmentRequest],
        geometry: Geometry,
        allocator: Option<&LocalAllocator>,
    ) -> Result<BufferList> {
        let mut list = BufferList::new(geometry);

        for request in requests {
            let index = request.attachment.index();
            if self.slots[index].is_none() {
                if request.attachment.is_colour() {
                    return Err(SurfaceError::UnpopulatedColourSlot(request.attachment));
                }

                let allocation = allocator
                    .and_then(|allocator| allocator.allocate(*request, geometry.width, geometry.height));
                let Some(allocation) = allocation else {
                    debug!("No backing for {:?}, leaving it out", request.attachment);
                    continue;
                };
                self.slots[index] = Some(BufferSlot {
                    buffer: allocation.dri_buffer(request.attachment),
                    backing: Backing::Local {
                        _allocation: allocation,
                    },
                });
            }

            if let Some(slot) = &self.slots[index] {
                list.push(slot.buffer)?;
            }
        }

        if self.get(Attachment::BackLeft).is_none() {
            return Err(SurfaceError::MissingBackBuffer);
        }

        Ok(list)
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}
