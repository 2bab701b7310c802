//! Display: capability negotiation and the surface registry
//!
//! A display is initialized once per compositor connection. It negotiates
//! the protocol generation, attaches the allocator if the generation uses
//! one, hands the driver factory its callback table and then owns every
//! surface created on it. The negotiated state is shared read-only with the
//! surfaces.

use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Arc;

use area_ipc::PlatformFlags;
use tracing::{debug, info, warn};

use crate::allocator::{BufferAllocator, LocalAllocator, ShmAllocator};
use crate::attachment::{Attachment, AttachmentRequest};
use crate::channel::{channel_for, ProtocolGeneration, RemoteBufferChannel};
use crate::config::{Config, DisplayConfig, ProtocolPreference};
use crate::driver::{DriverFactory, LoaderCallbacks, RenderingDriver};
use crate::error::{ProtocolViolation, Result, SurfaceError};
use crate::native::{NativeDisplay, NativeWindow};
use crate::slots::BufferList;
use crate::surface::{Surface, SurfaceId};
use crate::swap;

/// Protocol Capability Descriptor, fixed for the display's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub generation: ProtocolGeneration,
    pub allocator_attached: bool,
    /// The allocator was opened on a duplicate of the render device
    pub owns_device: bool,
    /// The compositor honours swap-interval requests
    pub swap_interval: bool,
}

/// State every surface of a display reads.
#[derive(Debug)]
pub(crate) struct DisplayContext {
    pub(crate) capability: CapabilityDescriptor,
    pub(crate) channel: Box<dyn RemoteBufferChannel>,
    pub(crate) allocator: Option<LocalAllocator>,
    pub(crate) bits_per_pixel: u32,
}

#[derive(Debug)]
pub struct Display {
    surfaces: HashMap<SurfaceId, Surface>,
    driver: Box<dyn RenderingDriver>,
    context: Arc<DisplayContext>,
    callbacks: LoaderCallbacks,
    native: Arc<dyn NativeDisplay>,
    device: Option<OwnedFd>,
    swap_interval: Option<i32>,
    next_surface: u32,
}

fn negotiate_generation(flags: PlatformFlags, preference: ProtocolPreference) -> ProtocolGeneration {
    match preference {
        ProtocolPreference::Name => ProtocolGeneration::NameStride,
        ProtocolPreference::Prime => ProtocolGeneration::Prime,
        ProtocolPreference::Auto if flags.contains(PlatformFlags::PRIME_BUFFERS) => {
            ProtocolGeneration::Prime
        }
        ProtocolPreference::Auto => ProtocolGeneration::NameStride,
    }
}

/// Pick the allocator for a PRIME display. Returns it with whether it owns
/// a duplicate of the render device.
fn attach_allocator(
    supplied: Option<Arc<dyn BufferAllocator>>,
    compositor_shares_allocator: bool,
    device: Option<&OwnedFd>,
    config: &DisplayConfig,
) -> Result<(Option<LocalAllocator>, bool)> {
    if let Some(allocator) = supplied {
        return Ok((Some(LocalAllocator::new(allocator)), false));
    }
    if compositor_shares_allocator {
        warn!("Compositor shares its allocator but none was supplied, auxiliary buffers unavailable");
        return Ok((None, false));
    }
    if !config.local_allocator {
        info!("Local allocator disabled, auxiliary buffers unavailable");
        return Ok((None, false));
    }
    let Some(device) = device else {
        return Ok((None, false));
    };

    let own_device = device.try_clone().map_err(|e| {
        warn!("Failed to duplicate render device: {}", e);
        SurfaceError::Alloc("render device duplicate")
    })?;
    let mut shm = ShmAllocator::with_device(own_device);
    if let Some(budget) = config.allocator_budget_bytes {
        shm = shm.with_budget(budget);
    }
    Ok((Some(LocalAllocator::new(Arc::new(shm))), true))
}

impl Display {
    pub fn initialize(
        native: Arc<dyn NativeDisplay>,
        factory: &dyn DriverFactory,
        allocator: Option<Arc<dyn BufferAllocator>>,
        config: &Config,
    ) -> Result<Self> {
        let platform = native.platform()?;
        let generation = negotiate_generation(platform.flags, config.display.protocol);

        let mut fds = platform.fds;
        if fds.len() > 1 {
            return Err(ProtocolViolation::ItemCount {
                what: "platform package",
                data: platform.data.len(),
                fds: fds.len(),
                expected_data: platform.data.len(),
                expected_fds: 1,
            }
            .into());
        }
        let device = fds.pop();
        if generation == ProtocolGeneration::Prime && device.is_none() {
            return Err(ProtocolViolation::MissingDevice.into());
        }

        let (allocator, owns_device) = match generation {
            ProtocolGeneration::Prime => attach_allocator(
                allocator,
                !platform.data.is_empty(),
                device.as_ref(),
                &config.display,
            )?,
            ProtocolGeneration::NameStride => {
                if allocator.is_some() {
                    debug!("Allocator ignored by the name/stride protocol");
                }
                (None, false)
            }
        };

        let capability = CapabilityDescriptor {
            generation,
            allocator_attached: allocator.is_some(),
            owns_device,
            swap_interval: platform.flags.contains(PlatformFlags::SWAP_INTERVAL),
        };
        let callbacks = LoaderCallbacks::new();
        let driver = factory.create_screen(device.as_ref().map(|fd| fd.as_fd()), callbacks)?;

        info!(
            "Display initialized: {} protocol, allocator {}, own device {}",
            capability.generation, capability.allocator_attached, capability.owns_device
        );

        Ok(Self {
            surfaces: HashMap::new(),
            driver,
            context: Arc::new(DisplayContext {
                capability,
                channel: channel_for(generation),
                allocator,
                bits_per_pixel: config.surface.bits_per_pixel,
            }),
            callbacks,
            native,
            device,
            swap_interval: config.surface.swap_interval,
            next_surface: 0,
        })
    }

    pub fn capability(&self) -> &CapabilityDescriptor {
        &self.context.capability
    }

    pub fn callbacks(&self) -> LoaderCallbacks {
        self.callbacks
    }

    pub fn native(&self) -> &Arc<dyn NativeDisplay> {
        &self.native
    }

    /// Render device the driver was opened on.
    pub fn device(&self) -> Option<BorrowedFd<'_>> {
        self.device.as_ref().map(|fd| fd.as_fd())
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn create_window_surface(&mut self, window: Arc<dyn NativeWindow>) -> Result<SurfaceId> {
        let next = self
            .next_surface
            .checked_add(1)
            .ok_or(SurfaceError::Alloc("surface id space"))?;
        self.next_surface = next;
        let id = SurfaceId(next);
        let surface = Surface::create(id, Arc::clone(&self.context), window, self.driver.as_mut())?;

        if let Some(interval) = self.swap_interval {
            let capability = &self.context.capability;
            if capability.swap_interval && capability.generation == ProtocolGeneration::NameStride {
                if let Err(e) = surface.set_swap_interval(interval) {
                    warn!("Initial swap interval {} on {} failed: {}", interval, id, e);
                }
            } else {
                debug!("Initial swap interval {} not applicable to {}", interval, id);
            }
        }

        self.surfaces.insert(id, surface);
        Ok(id)
    }

    /// Take an extra reference on behalf of the windowing layer.
    pub fn reference_surface(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or(SurfaceError::UnknownSurface(id))?;
        surface.acquire();
        Ok(())
    }

    /// Release one reference, tearing the surface down with the last one.
    /// Unknown or already destroyed surfaces are left alone.
    pub fn destroy_surface(&mut self, id: SurfaceId) -> Result<()> {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            debug!("Destroy of released {}, ignoring", id);
            return Ok(());
        };
        if !surface.release() {
            debug!("{} still referenced ({})", id, surface.references());
            return Ok(());
        }
        if let Some(surface) = self.surfaces.remove(&id) {
            surface.destroy(self.driver.as_mut());
        }
        Ok(())
    }

    pub fn swap_buffers(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or(SurfaceError::UnknownSurface(id))?;
        swap::swap_buffers(surface, self.driver.as_mut())
    }

    pub fn swap_interval(&mut self, id: SurfaceId, interval: i32) -> Result<()> {
        let surface = self
            .surfaces
            .get(&id)
            .ok_or(SurfaceError::UnknownSurface(id))?;
        surface.set_swap_interval(interval)
    }

    /// Invoke the `get_buffers` callback the driver was given.
    pub fn get_buffers(&mut self, id: SurfaceId, attachments: &[Attachment]) -> Result<BufferList> {
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or(SurfaceError::UnknownSurface(id))?;
        (self.callbacks.get_buffers)(surface, attachments)
    }

    /// Invoke the `get_buffers_with_format` callback the driver was given.
    pub fn get_buffers_with_format(
        &mut self,
        id: SurfaceId,
        requests: &[AttachmentRequest],
    ) -> Result<BufferList> {
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or(SurfaceError::UnknownSurface(id))?;
        (self.callbacks.get_buffers_with_format)(surface, requests)
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        for (_, surface) in self.surfaces.drain() {
            surface.destroy(self.driver.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::BufferUsage;
    use crate::channel::Geometry;
    use crate::driver::{DriverEvent, DrawableTarget, HeadlessDriverFactory};
    use crate::native::testing::{refused, ScriptedDisplay, ScriptedWindow};
    use area_ipc::shm::create_memfd;
    use area_ipc::surface_proto::Opcode;
    use area_ipc::{BufferPackage, BufferProtocol};

    fn display_with(
        protocol: BufferProtocol,
        allocator: Option<Arc<dyn BufferAllocator>>,
        factory: &HeadlessDriverFactory,
    ) -> Display {
        Display::initialize(
            Arc::new(ScriptedDisplay::new(protocol)),
            factory,
            allocator,
            &Config::default(),
        )
        .unwrap()
    }

    fn request(attachment: Attachment) -> AttachmentRequest {
        AttachmentRequest::new(attachment, 32)
    }

    #[test]
    fn test_negotiation_follows_flags_and_override() {
        let prime = PlatformFlags::PRIME_BUFFERS;
        assert_eq!(
            negotiate_generation(prime, ProtocolPreference::Auto),
            ProtocolGeneration::Prime
        );
        assert_eq!(
            negotiate_generation(PlatformFlags::empty(), ProtocolPreference::Auto),
            ProtocolGeneration::NameStride
        );
        assert_eq!(
            negotiate_generation(prime, ProtocolPreference::Name),
            ProtocolGeneration::NameStride
        );
    }

    #[test]
    fn test_prime_display_opens_own_allocator() {
        let factory = HeadlessDriverFactory::default();
        let display = display_with(BufferProtocol::Prime, None, &factory);
        let capability = display.capability();
        assert_eq!(capability.generation, ProtocolGeneration::Prime);
        assert!(capability.allocator_attached);
        assert!(capability.owns_device);
        assert!(display.device().is_some());
    }

    #[test]
    fn test_supplied_allocator_wins() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let display = display_with(BufferProtocol::Prime, Some(shm), &factory);
        assert!(display.capability().allocator_attached);
        assert!(!display.capability().owns_device);
    }

    #[test]
    fn test_shared_allocator_without_embedder_gives_none() {
        let factory = HeadlessDriverFactory::default();
        let mut native = ScriptedDisplay::new(BufferProtocol::Prime);
        native.data = vec![1];
        let display =
            Display::initialize(Arc::new(native), &factory, None, &Config::default()).unwrap();
        assert!(!display.capability().allocator_attached);
    }

    #[test]
    fn test_name_display_has_no_allocator() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let display = display_with(BufferProtocol::Name, Some(shm), &factory);
        assert_eq!(display.capability().generation, ProtocolGeneration::NameStride);
        assert!(!display.capability().allocator_attached);
    }

    #[test]
    fn test_prime_without_device_is_rejected() {
        let factory = HeadlessDriverFactory::default();
        let mut native = ScriptedDisplay::new(BufferProtocol::Prime);
        native.with_device = false;
        match Display::initialize(Arc::new(native), &factory, None, &Config::default()) {
            Err(SurfaceError::Protocol(ProtocolViolation::MissingDevice)) => {}
            other => panic!("Expected missing device, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_created_surface_has_back_buffer_at_declared_geometry() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Prime, None, &factory);
        let id = display
            .create_window_surface(Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 800, 600)))
            .unwrap();

        let surface = display.surface(id).unwrap();
        assert_eq!(surface.geometry(), Geometry { width: 800, height: 600 });
        let back = surface.buffer(Attachment::BackLeft).unwrap();
        assert!(back.fd.is_some());
        assert_eq!(back.pitch, 3200);
        assert!(surface.buffer(Attachment::FrontLeft).is_none());

        let list = display
            .get_buffers(id, &[Attachment::BackLeft])
            .unwrap();
        assert_eq!(list.geometry(), Geometry { width: 800, height: 600 });
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_prime_drawable_targets_allocator_surface() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let mut display = display_with(BufferProtocol::Prime, Some(shm.clone()), &factory);
        let id = display
            .create_window_surface(Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 640, 480)))
            .unwrap();

        let allocator_surface = display.surface(id).unwrap().allocator_surface().unwrap();
        let desc = shm.surface_desc(allocator_surface.id()).unwrap();
        assert_eq!(desc.owner, id);
        assert_eq!(desc.usage, BufferUsage::SCANOUT | BufferUsage::RENDERING);
        assert!(matches!(
            factory.log.events()[0],
            DriverEvent::Created(_, DrawableTarget::AllocatorSurface(_))
        ));
    }

    #[test]
    fn test_geometry_kept_when_not_reported() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Prime, None, &factory);
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 800, 600));
        let id = display.create_window_surface(window.clone()).unwrap();

        window.push(Ok(ScriptedWindow::prime_package(3200, 0, 0)));
        display.swap_buffers(id).unwrap();
        assert_eq!(
            display.surface(id).unwrap().geometry(),
            Geometry { width: 800, height: 600 }
        );
    }

    #[test]
    fn test_reported_geometry_updates_before_next_request() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let mut display = display_with(BufferProtocol::Prime, Some(shm.clone()), &factory);
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 800, 600));
        let id = display.create_window_surface(window.clone()).unwrap();

        let before = display
            .get_buffers_with_format(id, &[request(Attachment::BackLeft), request(Attachment::Depth)])
            .unwrap();
        let old_depth_pitch = before.get(Attachment::Depth).unwrap().pitch;
        assert_eq!(shm.live_buffers(), 1);

        window.push(Ok(ScriptedWindow::prime_package(4096, 1024, 768)));
        display.swap_buffers(id).unwrap();
        assert_eq!(
            display.surface(id).unwrap().geometry(),
            Geometry { width: 1024, height: 768 }
        );
        // Old-size auxiliary buffer released on resize.
        assert_eq!(shm.live_buffers(), 0);

        let after = display
            .get_buffers_with_format(id, &[request(Attachment::BackLeft), request(Attachment::Depth)])
            .unwrap();
        assert_eq!(after.geometry(), Geometry { width: 1024, height: 768 });
        assert_eq!(after.get(Attachment::BackLeft).unwrap().pitch, 4096);
        assert!(after.get(Attachment::Depth).unwrap().pitch > old_depth_pitch);

        let allocator_surface = display.surface(id).unwrap().allocator_surface().unwrap();
        assert_eq!(shm.surface_desc(allocator_surface.id()).unwrap().width, 1024);
    }

    #[test]
    fn test_depth_left_out_when_reported_width_overflows_pitch() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let mut display = display_with(BufferProtocol::Prime, Some(shm.clone()), &factory);
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 800, 600));
        let id = display.create_window_surface(window.clone()).unwrap();

        window.push(Ok(ScriptedWindow::prime_package(4096, 0x4000_0000, 2)));
        display.swap_buffers(id).unwrap();

        let list = display
            .get_buffers(id, &[Attachment::BackLeft, Attachment::Depth])
            .unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.get(Attachment::BackLeft).is_some());
        assert!(list.get(Attachment::Depth).is_none());
        assert_eq!(shm.live_buffers(), 0);
    }

    #[test]
    fn test_surface_ids_do_not_wrap() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Name, None, &factory);
        display.next_surface = u32::MAX;
        assert!(matches!(
            display.create_window_surface(Arc::new(ScriptedWindow::new(
                BufferProtocol::Name,
                64,
                64
            ))),
            Err(SurfaceError::Alloc(_))
        ));
        assert_eq!(display.surface_count(), 0);
        assert!(factory.log.events().is_empty());
    }

    #[test]
    fn test_depth_excluded_without_allocator() {
        let factory = HeadlessDriverFactory::default();
        let mut config = Config::default();
        config.display.local_allocator = false;
        let mut display = Display::initialize(
            Arc::new(ScriptedDisplay::new(BufferProtocol::Prime)),
            &factory,
            None,
            &config,
        )
        .unwrap();
        let id = display
            .create_window_surface(Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 800, 600)))
            .unwrap();

        let list = display
            .get_buffers(id, &[Attachment::BackLeft, Attachment::Depth])
            .unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.get(Attachment::Depth).is_none());
    }

    #[test]
    fn test_legacy_swap_mirrors_previous_back_into_front() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Name, None, &factory);
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Name, 800, 600));
        let id = display.create_window_surface(window.clone()).unwrap();

        let back_before = *display.surface(id).unwrap().buffer(Attachment::BackLeft).unwrap();
        display.swap_buffers(id).unwrap();

        let surface = display.surface(id).unwrap();
        let front = surface.buffer(Attachment::FrontLeft).unwrap();
        let back_after = surface.buffer(Attachment::BackLeft).unwrap();
        assert_eq!(front.name, back_before.name);
        assert_eq!(front.pitch, back_before.pitch);
        assert_ne!(back_after.name, back_before.name);

        let list = display
            .get_buffers(id, &[Attachment::FrontLeft, Attachment::BackLeft])
            .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_double_destroy_is_a_no_op() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let mut display = display_with(BufferProtocol::Prime, Some(shm.clone()), &factory);
        let id = display
            .create_window_surface(Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 320, 200)))
            .unwrap();
        display
            .get_buffers(id, &[Attachment::BackLeft, Attachment::Depth])
            .unwrap();
        assert_eq!(shm.live_buffers(), 1);

        display.destroy_surface(id).unwrap();
        display.destroy_surface(id).unwrap();

        assert_eq!(display.surface_count(), 0);
        assert_eq!(shm.live_buffers(), 0);
        assert_eq!(shm.live_surfaces(), 0);
        let destroyed = factory
            .log
            .events()
            .iter()
            .filter(|e| matches!(e, DriverEvent::Destroyed(_)))
            .count();
        assert_eq!(destroyed, 1);
    }

    #[test]
    fn test_referenced_surface_survives_one_destroy() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Name, None, &factory);
        let id = display
            .create_window_surface(Arc::new(ScriptedWindow::new(BufferProtocol::Name, 320, 200)))
            .unwrap();

        display.reference_surface(id).unwrap();
        display.destroy_surface(id).unwrap();
        assert!(display.surface(id).is_some());
        display.destroy_surface(id).unwrap();
        assert!(display.surface(id).is_none());

        assert!(matches!(
            display.reference_surface(id),
            Err(SurfaceError::UnknownSurface(_))
        ));
    }

    #[test]
    fn test_invalid_window_is_rejected() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Prime, None, &factory);
        assert!(matches!(
            display.create_window_surface(Arc::new(ScriptedWindow::invalid(BufferProtocol::Prime))),
            Err(SurfaceError::BadNativeWindow)
        ));
        assert_eq!(display.surface_count(), 0);
    }

    #[test]
    fn test_failed_refresh_unwinds_creation() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let mut display = display_with(BufferProtocol::Prime, Some(shm.clone()), &factory);
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 800, 600));
        window.push(Err(refused(Opcode::AdvanceBuffer)));

        assert!(matches!(
            display.create_window_surface(window),
            Err(SurfaceError::Remote(_))
        ));
        assert_eq!(shm.live_surfaces(), 0);
        assert!(factory.log.events().is_empty());
    }

    #[test]
    fn test_two_descriptor_refresh_fails_creation() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Prime, None, &factory);
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 800, 600));
        window.push(Ok(BufferPackage {
            data: vec![],
            fds: vec![
                create_memfd(c"first", 16).unwrap(),
                create_memfd(c"second", 16).unwrap(),
            ],
            stride: 3200,
            width: 800,
            height: 600,
        }));

        assert!(matches!(
            display.create_window_surface(window),
            Err(SurfaceError::Protocol(ProtocolViolation::ItemCount { .. }))
        ));
        assert_eq!(display.surface_count(), 0);
    }

    #[test]
    fn test_prime_drawable_failure_unwinds_allocator_surface() {
        let factory = HeadlessDriverFactory {
            fail_drawables: true,
            ..HeadlessDriverFactory::default()
        };
        let shm = Arc::new(ShmAllocator::new());
        let mut display = display_with(BufferProtocol::Prime, Some(shm.clone()), &factory);

        assert!(matches!(
            display.create_window_surface(Arc::new(ScriptedWindow::new(
                BufferProtocol::Prime,
                800,
                600
            ))),
            Err(SurfaceError::Drawable)
        ));
        assert_eq!(shm.live_surfaces(), 0);
        assert_eq!(display.surface_count(), 0);
    }

    #[test]
    fn test_swap_interval_per_generation() {
        let factory = HeadlessDriverFactory::default();
        let mut display = display_with(BufferProtocol::Name, None, &factory);
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Name, 320, 200));
        let id = display.create_window_surface(window.clone()).unwrap();
        display.swap_interval(id, 0).unwrap();
        assert_eq!(window.intervals(), vec![0]);

        let mut display = display_with(BufferProtocol::Prime, None, &factory);
        let id = display
            .create_window_surface(Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 320, 200)))
            .unwrap();
        assert!(matches!(
            display.swap_interval(id, 1),
            Err(SurfaceError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_configured_interval_applied_on_create() {
        let factory = HeadlessDriverFactory::default();
        let mut config = Config::default();
        config.surface.swap_interval = Some(2);
        let mut display = Display::initialize(
            Arc::new(ScriptedDisplay::new(BufferProtocol::Name)),
            &factory,
            None,
            &config,
        )
        .unwrap();
        let window = Arc::new(ScriptedWindow::new(BufferProtocol::Name, 320, 200));
        display.create_window_surface(window.clone()).unwrap();
        assert_eq!(window.intervals(), vec![2]);
    }

    #[test]
    fn test_dropping_display_destroys_surfaces() {
        let factory = HeadlessDriverFactory::default();
        let shm = Arc::new(ShmAllocator::new());
        let mut display = display_with(BufferProtocol::Prime, Some(shm.clone()), &factory);
        for _ in 0..2 {
            display
                .create_window_surface(Arc::new(ScriptedWindow::new(BufferProtocol::Prime, 64, 64)))
                .unwrap();
        }
        assert_eq!(shm.live_surfaces(), 2);

        drop(display);
        assert_eq!(shm.live_surfaces(), 0);
    }
}
