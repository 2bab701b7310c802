//! Native display and window handles supplied by the windowing layer.
//!
//! The core never creates or destroys these; it only calls through them.
//! `RemoteWindow` binds them to the `area-ipc` compositor connection.

use std::fmt;
use std::sync::Arc;

use area_ipc::{
    BufferPackage, CompositorConnection, IpcError, PlatformPackage, SurfaceParameters,
};

/// Display-level connection to the compositor.
pub trait NativeDisplay: fmt::Debug + Send + Sync {
    /// Render device, capability flags and optional platform data.
    fn platform(&self) -> Result<PlatformPackage, IpcError>;
}

/// Compositor-owned window a surface renders into.
pub trait NativeWindow: fmt::Debug + Send + Sync {
    fn is_valid(&self) -> bool {
        true
    }

    fn surface_parameters(&self) -> Result<SurfaceParameters, IpcError>;

    /// Blocking round trip that returns the next colour buffer to render to.
    fn advance_buffer(&self) -> Result<BufferPackage, IpcError>;

    fn set_swap_interval(&self, interval: i32) -> Result<(), IpcError>;
}

impl NativeDisplay for CompositorConnection {
    fn platform(&self) -> Result<PlatformPackage, IpcError> {
        CompositorConnection::platform(self)
    }
}

/// A compositor surface addressed over a shared connection.
#[derive(Debug, Clone)]
pub struct RemoteWindow {
    connection: Arc<CompositorConnection>,
    surface: u32,
}

impl RemoteWindow {
    pub fn new(connection: Arc<CompositorConnection>, surface: u32) -> Self {
        Self {
            connection,
            surface,
        }
    }
}

impl NativeWindow for RemoteWindow {
    /// Surface id zero is reserved for display-level requests.
    fn is_valid(&self) -> bool {
        self.surface != 0
    }

    fn surface_parameters(&self) -> Result<SurfaceParameters, IpcError> {
        self.connection.surface_parameters(self.surface)
    }

    fn advance_buffer(&self) -> Result<BufferPackage, IpcError> {
        self.connection.advance_buffer(self.surface)
    }

    fn set_swap_interval(&self, interval: i32) -> Result<(), IpcError> {
        self.connection.set_swap_interval(self.surface, interval)
    }
}
