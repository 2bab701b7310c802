//! Area EGL platform: surface buffer exchange
//!
//! Keeps a GPU-rendered window surface in step with a compositor-owned
//! surface across the process boundary, in either buffer-exchange
//! generation (shared names or PRIME descriptors).

pub mod allocator;
pub mod attachment;
pub mod channel;
pub mod config;
pub mod display;
pub mod driver;
pub mod error;
pub mod native;
pub mod slots;
pub mod surface;
mod swap;

pub use allocator::{BufferAllocator, LocalAllocator, ShmAllocator};
pub use attachment::{Attachment, AttachmentRequest, DriBuffer};
pub use channel::{BufferIdentity, Geometry, ProtocolGeneration, RemoteBufferChannel};
pub use config::Config;
pub use display::{CapabilityDescriptor, Display};
pub use driver::{DriverFactory, HeadlessDriverFactory, LoaderCallbacks, RenderingDriver};
pub use error::{ProtocolViolation, Result, SurfaceError};
pub use native::{NativeDisplay, NativeWindow, RemoteWindow};
pub use slots::{BufferList, MAX_BUFFERS};
pub use surface::{Surface, SurfaceId};
