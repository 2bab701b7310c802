//! Local Allocator Adapter
//!
//! Wraps an optional GPU buffer-object manager. Allocations and
//! allocator-native surface objects come back as owning guards, so every
//! handle is released exactly once no matter which path drops it: surface
//! destruction, a geometry change, or an unwinding surface creation.

use std::collections::HashMap;
use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex};

use area_ipc::shm::{aligned_pitch, create_memfd};
use bitflags::bitflags;
use tracing::{debug, warn};

use crate::attachment::{Attachment, AttachmentRequest, DriBuffer};
use crate::surface::SurfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorSurfaceId(pub u64);

bitflags! {
    /// Intended use of allocator-native surfaces (GBM `BO_USE_*` values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const SCANOUT   = 1 << 0;
        const CURSOR    = 1 << 1;
        const RENDERING = 1 << 2;
        const LINEAR    = 1 << 4;
    }
}

/// A buffer object freshly created by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedBuffer {
    pub handle: AllocationHandle,
    /// Name the rendering driver resolves the buffer by
    pub name: u32,
    pub pitch: u32,
    pub cpp: u32,
}

/// Parameters of an allocator-native surface object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorSurfaceDesc {
    /// Surface the object belongs to. An identifier only, never dereferenced.
    pub owner: SurfaceId,
    pub width: u32,
    pub height: u32,
    /// DRM fourcc
    pub format: u32,
    pub usage: BufferUsage,
}

/// External GPU buffer-object manager.
///
/// Shared by every surface of a display and only called from the rendering
/// thread, but implementations must tolerate being reached through an `Arc`.
pub trait BufferAllocator: fmt::Debug + Send + Sync {
    /// Allocate an auxiliary buffer. `None` means the kind cannot be backed.
    fn allocate(
        &self,
        attachment: Attachment,
        bits_per_pixel: u32,
        width: u32,
        height: u32,
    ) -> Option<AllocatedBuffer>;

    fn release(&self, handle: AllocationHandle);

    fn create_surface(&self, desc: &AllocatorSurfaceDesc) -> Option<AllocatorSurfaceId>;

    /// Record new dimensions after the compositor resized the surface.
    fn resize_surface(&self, _surface: AllocatorSurfaceId, _width: u32, _height: u32) {}

    fn destroy_surface(&self, surface: AllocatorSurfaceId);
}

/// Display-wide handle on the allocator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalAllocator {
    inner: Arc<dyn BufferAllocator>,
}

impl LocalAllocator {
    pub fn new(inner: Arc<dyn BufferAllocator>) -> Self {
        Self { inner }
    }

    pub fn allocate(
        &self,
        request: AttachmentRequest,
        width: u32,
        height: u32,
    ) -> Option<Allocation> {
        let buffer = self.inner.allocate(
            request.attachment,
            request.bits_per_pixel,
            width,
            height,
        )?;
        Some(Allocation {
            buffer,
            allocator: Arc::clone(&self.inner),
        })
    }

    pub fn create_surface(&self, desc: AllocatorSurfaceDesc) -> Option<AllocatorSurface> {
        let id = self.inner.create_surface(&desc)?;
        Some(AllocatorSurface {
            id,
            desc,
            allocator: Arc::clone(&self.inner),
        })
    }
}

/// An auxiliary buffer owned by a surface slot. Released on drop.
pub struct Allocation {
    buffer: AllocatedBuffer,
    allocator: Arc<dyn BufferAllocator>,
}

impl Allocation {
    pub fn handle(&self) -> AllocationHandle {
        self.buffer.handle
    }

    pub fn dri_buffer(&self, attachment: Attachment) -> DriBuffer {
        DriBuffer {
            attachment,
            name: self.buffer.name,
            fd: None,
            pitch: self.buffer.pitch,
            cpp: self.buffer.cpp,
            flags: 0,
        }
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.allocator.release(self.buffer.handle);
    }
}

/// Allocator-native representation of a surface. Destroyed on drop.
pub struct AllocatorSurface {
    id: AllocatorSurfaceId,
    desc: AllocatorSurfaceDesc,
    allocator: Arc<dyn BufferAllocator>,
}

impl AllocatorSurface {
    pub fn id(&self) -> AllocatorSurfaceId {
        self.id
    }

    pub fn desc(&self) -> &AllocatorSurfaceDesc {
        &self.desc
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.desc.width = width;
        self.desc.height = height;
        self.allocator.resize_surface(self.id, width, height);
    }
}

impl fmt::Debug for AllocatorSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorSurface")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

impl Drop for AllocatorSurface {
    fn drop(&mut self) {
        self.allocator.destroy_surface(self.id);
    }
}

const SHM_PITCH_ALIGN: u32 = 64;

#[derive(Debug)]
struct ShmBuffer {
    _memory: OwnedFd,
    size: u64,
}

#[derive(Debug, Default)]
struct ShmState {
    next_id: u64,
    used_bytes: u64,
    buffers: HashMap<AllocationHandle, ShmBuffer>,
    surfaces: HashMap<AllocatorSurfaceId, AllocatorSurfaceDesc>,
}

impl ShmState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Buffer allocator backed by memfd objects.
///
/// Stands in for a GPU buffer-object manager when the render device is not
/// directly usable, e.g. under the loopback compositor.
#[derive(Debug)]
pub struct ShmAllocator {
    /// Render device the allocator was opened on, when it owns one.
    device: Option<OwnedFd>,
    budget: Option<u64>,
    state: Mutex<ShmState>,
}

impl ShmAllocator {
    pub fn new() -> Self {
        Self {
            device: None,
            budget: None,
            state: Mutex::new(ShmState::default()),
        }
    }

    /// Allocator opened on its own (duplicated) render device descriptor.
    pub fn with_device(device: OwnedFd) -> Self {
        Self {
            device: Some(device),
            ..Self::new()
        }
    }

    /// Fail allocations that would take the live total above `bytes`.
    pub fn with_budget(mut self, bytes: u64) -> Self {
        self.budget = Some(bytes);
        self
    }

    pub fn owns_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().map(|s| s.buffers.len()).unwrap_or(0)
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.lock().map(|s| s.surfaces.len()).unwrap_or(0)
    }

    pub fn surface_desc(&self, surface: AllocatorSurfaceId) -> Option<AllocatorSurfaceDesc> {
        self.state.lock().ok()?.surfaces.get(&surface).copied()
    }
}

impl Default for ShmAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferAllocator for ShmAllocator {
    fn allocate(
        &self,
        attachment: Attachment,
        bits_per_pixel: u32,
        width: u32,
        height: u32,
    ) -> Option<AllocatedBuffer> {
        let cpp = bits_per_pixel.div_ceil(8);
        if cpp == 0 || width == 0 || height == 0 {
            warn!(
                "Refusing {:?} allocation of {}x{} at {} bpp",
                attachment, width, height, bits_per_pixel
            );
            return None;
        }

        let Some(pitch) = aligned_pitch(width, cpp, SHM_PITCH_ALIGN) else {
            warn!(
                "{:?} row of {} pixels at {} bpp overflows the pitch",
                attachment, width, bits_per_pixel
            );
            return None;
        };
        let size = u64::from(pitch) * u64::from(height);
        let mut state = self.state.lock().ok()?;
        if let Some(budget) = self.budget {
            if state.used_bytes + size > budget {
                warn!(
                    "{:?} allocation of {} bytes exceeds the {} byte budget",
                    attachment, size, budget
                );
                return None;
            }
        }

        let memory = match create_memfd(c"area-egl-aux", size) {
            Ok(memory) => memory,
            Err(e) => {
                warn!("memfd allocation for {:?} failed: {}", attachment, e);
                return None;
            }
        };

        let handle = AllocationHandle(state.next_id());
        let Ok(name) = u32::try_from(handle.0) else {
            warn!("Buffer name space exhausted at {:?}", handle);
            return None;
        };
        state.used_bytes += size;
        state.buffers.insert(handle, ShmBuffer { _memory: memory, size });
        debug!(
            "Allocated {:?} {}x{} pitch {} as {:?}",
            attachment, width, height, pitch, handle
        );

        Some(AllocatedBuffer {
            handle,
            name,
            pitch,
            cpp,
        })
    }

    fn release(&self, handle: AllocationHandle) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match state.buffers.remove(&handle) {
            Some(buffer) => {
                state.used_bytes -= buffer.size;
                debug!("Released {:?}", handle);
            }
            None => warn!("Release of unknown {:?}", handle),
        }
    }

    fn create_surface(&self, desc: &AllocatorSurfaceDesc) -> Option<AllocatorSurfaceId> {
        let mut state = self.state.lock().ok()?;
        let id = AllocatorSurfaceId(state.next_id());
        state.surfaces.insert(id, *desc);
        debug!("Created allocator surface {:?} for {:?}", id, desc.owner);
        Some(id)
    }

    fn resize_surface(&self, surface: AllocatorSurfaceId, width: u32, height: u32) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(desc) = state.surfaces.get_mut(&surface) {
                desc.width = width;
                desc.height = height;
            }
        }
    }

    fn destroy_surface(&self, surface: AllocatorSurfaceId) {
        if let Ok(mut state) = self.state.lock() {
            if state.surfaces.remove(&surface).is_none() {
                warn!("Destroy of unknown allocator surface {:?}", surface);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use area_ipc::surface_proto::FORMAT_ARGB8888;

    fn adapter() -> (Arc<ShmAllocator>, LocalAllocator) {
        let shm = Arc::new(ShmAllocator::new());
        let local = LocalAllocator::new(shm.clone());
        (shm, local)
    }

    #[test]
    fn test_allocation_released_on_drop() {
        let (shm, local) = adapter();
        let depth = local
            .allocate(AttachmentRequest::new(Attachment::Depth, 24), 100, 10)
            .unwrap();
        assert_eq!(shm.live_buffers(), 1);

        let buffer = depth.dri_buffer(Attachment::Depth);
        assert_eq!(buffer.cpp, 3);
        assert_eq!(buffer.pitch, 320);
        assert_ne!(buffer.name, 0);

        drop(depth);
        assert_eq!(shm.live_buffers(), 0);
    }

    #[test]
    fn test_budget_rejects_oversized_allocation() {
        let shm = Arc::new(ShmAllocator::new().with_budget(4096));
        let local = LocalAllocator::new(shm.clone());
        let request = AttachmentRequest::new(Attachment::Stencil, 8);

        let small = local.allocate(request, 64, 64).unwrap();
        assert!(local.allocate(request, 64, 1).is_none());
        drop(small);
        assert!(local.allocate(request, 64, 1).is_some());
    }

    #[test]
    fn test_zero_sized_allocation_fails_harmlessly() {
        let (shm, local) = adapter();
        assert!(local
            .allocate(AttachmentRequest::new(Attachment::Depth, 32), 0, 10)
            .is_none());
        assert_eq!(shm.live_buffers(), 0);
    }

    #[test]
    fn test_overflowing_pitch_fails_harmlessly() {
        let (shm, local) = adapter();
        assert!(local
            .allocate(AttachmentRequest::new(Attachment::Depth, 32), 0x4000_0000, 2)
            .is_none());
        assert_eq!(shm.live_buffers(), 0);
    }

    #[test]
    fn test_exhausted_name_space_fails_harmlessly() {
        let (shm, local) = adapter();
        shm.state.lock().unwrap().next_id = u64::from(u32::MAX);
        assert!(local
            .allocate(AttachmentRequest::new(Attachment::Depth, 32), 16, 16)
            .is_none());
        assert_eq!(shm.live_buffers(), 0);
    }

    #[test]
    fn test_allocator_surface_lifecycle() {
        let (shm, local) = adapter();
        let desc = AllocatorSurfaceDesc {
            owner: SurfaceId(3),
            width: 800,
            height: 600,
            format: FORMAT_ARGB8888,
            usage: BufferUsage::SCANOUT | BufferUsage::RENDERING,
        };

        let mut surface = local.create_surface(desc).unwrap();
        assert_eq!(shm.live_surfaces(), 1);

        surface.resize(1024, 768);
        let recorded = shm.surface_desc(surface.id()).unwrap();
        assert_eq!((recorded.width, recorded.height), (1024, 768));
        assert_eq!(recorded.owner, SurfaceId(3));

        drop(surface);
        assert_eq!(shm.live_surfaces(), 0);
    }
}
