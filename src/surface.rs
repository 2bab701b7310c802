//! Window Surface
//!
//! Binds one compositor window to the rendering driver. Creation is
//! all-or-nothing: every resource acquired before a failing step is
//! released before the error is returned. The guards in `allocator` and
//! `slots` do that release, so a partially built `Surface` is simply
//! dropped.

use std::fmt;
use std::sync::Arc;

use area_ipc::surface_proto::FORMAT_ARGB8888;
use tracing::{debug, info, warn};

use crate::allocator::{AllocatorSurface, AllocatorSurfaceDesc, BufferUsage};
use crate::attachment::{Attachment, AttachmentRequest, DriBuffer};
use crate::channel::{Geometry, ProtocolGeneration};
use crate::display::DisplayContext;
use crate::driver::{DrawableConfig, DrawableId, DrawableTarget, RenderingDriver};
use crate::error::{Result, SurfaceError};
use crate::native::NativeWindow;
use crate::slots::{BufferList, SlotTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

#[derive(Debug)]
pub struct Surface {
    id: SurfaceId,
    geometry: Geometry,
    slots: SlotTable,
    allocator_surface: Option<AllocatorSurface>,
    drawable: Option<DrawableId>,
    window: Arc<dyn NativeWindow>,
    context: Arc<DisplayContext>,
    references: u32,
}

impl Surface {
    pub(crate) fn create(
        id: SurfaceId,
        context: Arc<DisplayContext>,
        window: Arc<dyn NativeWindow>,
        driver: &mut dyn RenderingDriver,
    ) -> Result<Self> {
        if !window.is_valid() {
            return Err(SurfaceError::BadNativeWindow);
        }

        let params = window.surface_parameters()?;
        let cpp = context.bits_per_pixel.div_ceil(8);
        let mut slots = SlotTable::new();
        slots.populate_colour(Attachment::BackLeft, cpp);
        if context.channel.tracks_front_buffer() {
            slots.populate_colour(Attachment::FrontLeft, cpp);
        }

        let mut surface = Surface {
            id,
            geometry: Geometry {
                width: params.width,
                height: params.height,
            },
            slots,
            allocator_surface: None,
            drawable: None,
            window,
            context: Arc::clone(&context),
            references: 1,
        };

        surface.refresh()?;

        if let Some(allocator) = &context.allocator {
            let desc = AllocatorSurfaceDesc {
                owner: id,
                width: surface.geometry.width,
                height: surface.geometry.height,
                format: FORMAT_ARGB8888,
                usage: BufferUsage::SCANOUT | BufferUsage::RENDERING,
            };
            let allocator_surface = allocator
                .create_surface(desc)
                .ok_or(SurfaceError::Alloc("allocator-native surface"))?;
            surface.allocator_surface = Some(allocator_surface);
        }

        let target = match &surface.allocator_surface {
            Some(allocator_surface) => DrawableTarget::AllocatorSurface(allocator_surface.id()),
            None => DrawableTarget::Surface(id),
        };
        let config = DrawableConfig {
            double_buffered: true,
            bits_per_pixel: context.bits_per_pixel,
        };
        match driver.create_drawable(&config, target) {
            Some(drawable) => surface.drawable = Some(drawable),
            // Name/stride compositors keep a surface without a drawable.
            None if context.capability.generation == ProtocolGeneration::NameStride => {
                warn!("{} created without a drawable", id);
            }
            None => return Err(SurfaceError::Drawable),
        }

        info!(
            "Created {} at {} ({}, drawable {:?})",
            id, surface.geometry, context.capability.generation, surface.drawable
        );
        Ok(surface)
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn drawable(&self) -> Option<DrawableId> {
        self.drawable
    }

    pub fn allocator_surface(&self) -> Option<&AllocatorSurface> {
        self.allocator_surface.as_ref()
    }

    /// Current buffer of `attachment`, if the slot is populated.
    pub fn buffer(&self, attachment: Attachment) -> Option<&DriBuffer> {
        self.slots.get(attachment).map(|slot| slot.buffer())
    }

    pub fn populated_slots(&self) -> usize {
        self.slots.populated()
    }

    pub fn references(&self) -> u32 {
        self.references
    }

    /// Resolve `requests` against the slot table, allocating missing
    /// auxiliary buffers at the current geometry.
    pub fn request_buffers(&mut self, requests: &[AttachmentRequest]) -> Result<BufferList> {
        let allocator = self.context.allocator.as_ref();
        self.slots.buffers_for(requests, self.geometry, allocator)
    }

    /// Advance to the compositor's next colour buffer.
    pub(crate) fn refresh(&mut self) -> Result<()> {
        let identity = self
            .context
            .channel
            .refresh_colour_buffer(self.window.as_ref())?;
        if let Some(geometry) = self.slots.apply_identity(identity)? {
            self.set_geometry(geometry);
        }
        Ok(())
    }

    pub(crate) fn mirror_front(&mut self) {
        if self.context.channel.tracks_front_buffer() {
            self.slots.mirror_back_into_front();
        }
    }

    pub(crate) fn set_swap_interval(&self, interval: i32) -> Result<()> {
        self.context
            .channel
            .set_swap_interval(self.window.as_ref(), interval)
    }

    /// Auxiliary buffers are sized to the old geometry, so they are dropped
    /// and reallocated on the next request.
    fn set_geometry(&mut self, geometry: Geometry) {
        if geometry == self.geometry {
            return;
        }
        let released = self.slots.release_auxiliary();
        info!(
            "{} resized {} -> {}, released {} auxiliary buffers",
            self.id, self.geometry, geometry, released
        );
        self.geometry = geometry;
        if let Some(allocator_surface) = self.allocator_surface.as_mut() {
            allocator_surface.resize(geometry.width, geometry.height);
        }
    }

    pub(crate) fn acquire(&mut self) {
        self.references += 1;
    }

    /// Drop one reference. True once the last one is gone.
    pub(crate) fn release(&mut self) -> bool {
        self.references = self.references.saturating_sub(1);
        self.references == 0
    }

    /// Tear down in reverse order of creation. The window itself belongs to
    /// the windowing layer and is left alone.
    pub(crate) fn destroy(mut self, driver: &mut dyn RenderingDriver) {
        if let Some(drawable) = self.drawable.take() {
            driver.destroy_drawable(drawable);
        }
        let released = self.slots.release_auxiliary();
        self.allocator_surface = None;
        debug!("Destroyed {}, released {} auxiliary buffers", self.id, released);
    }
}

/// `get_buffers` loader callback: every attachment at the display's
/// default bits per pixel.
pub fn get_buffers(surface: &mut Surface, attachments: &[Attachment]) -> Result<BufferList> {
    let bits_per_pixel = surface.context.bits_per_pixel;
    let requests: Vec<AttachmentRequest> = attachments
        .iter()
        .map(|&attachment| AttachmentRequest::new(attachment, bits_per_pixel))
        .collect();
    surface.request_buffers(&requests)
}

/// `get_buffers_with_format` loader callback.
pub fn get_buffers_with_format(
    surface: &mut Surface,
    requests: &[AttachmentRequest],
) -> Result<BufferList> {
    surface.request_buffers(requests)
}

pub fn flush_front_buffer(_surface: &mut Surface) {}
