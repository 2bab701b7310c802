//! Area IPC Protocol
//!
//! Wire records and the blocking SOCK_SEQPACKET transport used by `area-egl`
//! to exchange colour buffers with the compositor, plus a loopback
//! compositor for running the exchange without a display server.

pub mod client;
pub mod error;
pub mod server;
pub mod shm;
pub mod surface_proto;
pub mod transport;

pub use client::CompositorConnection;
pub use error::IpcError;
pub use server::{spawn_loopback, BufferProtocol, LoopbackCompositor, LoopbackOptions, ServeStats};
pub use surface_proto::{BufferPackage, PlatformFlags, PlatformPackage, SurfaceParameters};

/// Socket path for the compositor's surface protocol
pub fn socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("area-egl.sock")
}
