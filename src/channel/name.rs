use tracing::debug;

use super::{check_item_count, BufferIdentity, ProtocolGeneration, RemoteBufferChannel};
use crate::error::Result;
use crate::native::NativeWindow;

/// Legacy generation: buffers are identified by a shared name the rendering
/// driver resolves itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameChannel;

impl RemoteBufferChannel for NameChannel {
    fn generation(&self) -> ProtocolGeneration {
        ProtocolGeneration::NameStride
    }

    fn refresh_colour_buffer(&self, window: &dyn NativeWindow) -> Result<BufferIdentity> {
        let package = window.advance_buffer()?;
        check_item_count(&package, 1, 0)?;

        let name = package.data[0];
        debug!(name, stride = package.stride, "colour buffer advanced");
        Ok(BufferIdentity::Name {
            name,
            stride: package.stride,
        })
    }

    fn set_swap_interval(&self, window: &dyn NativeWindow, interval: i32) -> Result<()> {
        window.set_swap_interval(interval)?;
        Ok(())
    }

    fn tracks_front_buffer(&self) -> bool {
        true
    }
}
