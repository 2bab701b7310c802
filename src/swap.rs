//! Swap Engine
//!
//! Presents the current frame and fetches the next colour buffer:
//! flush, advance, invalidate. The driver is invalidated even when the
//! advance fails so it never keeps rendering into a buffer the compositor
//! has taken back.

use tracing::{trace, warn};

use crate::driver::RenderingDriver;
use crate::error::Result;
use crate::surface::Surface;

pub(crate) fn swap_buffers(surface: &mut Surface, driver: &mut dyn RenderingDriver) -> Result<()> {
    let drawable = surface.drawable();
    if let Some(drawable) = drawable {
        driver.flush(drawable);
    }

    surface.mirror_front();
    let result = surface.refresh();

    if let Some(drawable) = drawable {
        driver.invalidate(drawable);
    }

    match &result {
        Ok(()) => trace!("{} swapped at {}", surface.id(), surface.geometry()),
        Err(e) => warn!("Swap on {} failed: {}", surface.id(), e),
    }
    result
}
