//! Rendering driver interface
//!
//! The driver is created per display by a `DriverFactory`, which receives
//! the display's `LoaderCallbacks` table. The driver calls back through that
//! table whenever it needs buffers for a drawable; there is no process-wide
//! callback table.

use std::collections::HashSet;
use std::fmt;
use std::os::fd::BorrowedFd;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::allocator::AllocatorSurfaceId;
use crate::attachment::{Attachment, AttachmentRequest};
use crate::error::Result;
use crate::slots::BufferList;
use crate::surface::{self, Surface, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableId(pub u64);

/// What a new drawable renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawableTarget {
    /// The driver calls back with the surface as loader-private data.
    Surface(SurfaceId),
    /// The driver targets the allocator-native surface object directly.
    AllocatorSurface(AllocatorSurfaceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawableConfig {
    pub double_buffered: bool,
    pub bits_per_pixel: u32,
}

pub type GetBuffersFn = fn(&mut Surface, &[Attachment]) -> Result<BufferList>;
pub type GetBuffersWithFormatFn = fn(&mut Surface, &[AttachmentRequest]) -> Result<BufferList>;
pub type FlushFrontBufferFn = fn(&mut Surface);

/// Loader entry points handed to the rendering driver.
#[derive(Clone, Copy)]
pub struct LoaderCallbacks {
    /// Every attachment at the display's default bits per pixel.
    pub get_buffers: GetBuffersFn,
    pub get_buffers_with_format: GetBuffersWithFormatFn,
    /// Front-buffer rendering is unsupported; this does nothing.
    pub flush_front_buffer: FlushFrontBufferFn,
}

impl LoaderCallbacks {
    pub fn new() -> Self {
        Self {
            get_buffers: surface::get_buffers,
            get_buffers_with_format: surface::get_buffers_with_format,
            flush_front_buffer: surface::flush_front_buffer,
        }
    }
}

impl Default for LoaderCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoaderCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderCallbacks").finish_non_exhaustive()
    }
}

/// The GPU rendering driver, as seen by the buffer-exchange core.
///
/// `flush` and `invalidate` are fire-and-forget.
pub trait RenderingDriver: fmt::Debug + Send {
    fn create_drawable(
        &mut self,
        config: &DrawableConfig,
        target: DrawableTarget,
    ) -> Option<DrawableId>;

    fn destroy_drawable(&mut self, drawable: DrawableId);

    /// Submit pending rendering for `drawable`.
    fn flush(&mut self, drawable: DrawableId);

    /// Drop cached buffer state so the next draw re-requests buffers.
    fn invalidate(&mut self, drawable: DrawableId);
}

pub trait DriverFactory {
    fn create_screen(
        &self,
        device: Option<BorrowedFd<'_>>,
        callbacks: LoaderCallbacks,
    ) -> Result<Box<dyn RenderingDriver>>;
}

/// Something the headless driver was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    Created(DrawableId, DrawableTarget),
    Destroyed(DrawableId),
    Flushed(DrawableId),
    Invalidated(DrawableId),
}

/// Shared record of driver events, readable after the driver moved into a
/// display.
#[derive(Debug, Clone, Default)]
pub struct DriverLog(Arc<Mutex<Vec<DriverEvent>>>);

impl DriverLog {
    fn push(&self, event: DriverEvent) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        self.0.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

/// Driver that renders nothing and tracks drawables. It never calls back
/// into the loader.
#[derive(Debug)]
pub struct HeadlessDriver {
    next_drawable: u64,
    live: HashSet<DrawableId>,
    log: DriverLog,
    fail_drawables: bool,
}

impl RenderingDriver for HeadlessDriver {
    fn create_drawable(
        &mut self,
        config: &DrawableConfig,
        target: DrawableTarget,
    ) -> Option<DrawableId> {
        if self.fail_drawables {
            warn!("Headless driver refusing drawable for {:?}", target);
            return None;
        }
        self.next_drawable += 1;
        let drawable = DrawableId(self.next_drawable);
        self.live.insert(drawable);
        self.log.push(DriverEvent::Created(drawable, target));
        debug!(
            "Created {:?} for {:?} ({} bpp)",
            drawable, target, config.bits_per_pixel
        );
        Some(drawable)
    }

    fn destroy_drawable(&mut self, drawable: DrawableId) {
        if !self.live.remove(&drawable) {
            warn!("Destroying unknown {:?}", drawable);
        }
        self.log.push(DriverEvent::Destroyed(drawable));
    }

    fn flush(&mut self, drawable: DrawableId) {
        if !self.live.contains(&drawable) {
            warn!("Flushing unknown {:?}", drawable);
        }
        self.log.push(DriverEvent::Flushed(drawable));
    }

    fn invalidate(&mut self, drawable: DrawableId) {
        if !self.live.contains(&drawable) {
            warn!("Invalidating unknown {:?}", drawable);
        }
        self.log.push(DriverEvent::Invalidated(drawable));
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessDriverFactory {
    pub log: DriverLog,
    /// Make every drawable creation fail.
    pub fail_drawables: bool,
}

impl DriverFactory for HeadlessDriverFactory {
    fn create_screen(
        &self,
        device: Option<BorrowedFd<'_>>,
        callbacks: LoaderCallbacks,
    ) -> Result<Box<dyn RenderingDriver>> {
        debug!("Headless screen on device {:?} with {:?}", device, callbacks);
        Ok(Box::new(HeadlessDriver {
            next_drawable: 0,
            live: HashSet::new(),
            log: self.log.clone(),
            fail_drawables: self.fail_drawables,
        }))
    }
}
