use tracing::debug;

use super::{
    check_item_count, BufferIdentity, Geometry, ProtocolGeneration, RemoteBufferChannel,
};
use crate::error::{ProtocolViolation, Result, SurfaceError};
use crate::native::NativeWindow;

/// Current generation: buffers arrive as PRIME descriptors, optionally with
/// the authoritative surface geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimeChannel;

impl RemoteBufferChannel for PrimeChannel {
    fn generation(&self) -> ProtocolGeneration {
        ProtocolGeneration::Prime
    }

    fn refresh_colour_buffer(&self, window: &dyn NativeWindow) -> Result<BufferIdentity> {
        let package = window.advance_buffer()?;
        check_item_count(&package, 0, 1)?;

        // Compositors predating geometry reporting send zeros.
        let geometry = (package.width != 0 && package.height != 0).then_some(Geometry {
            width: package.width,
            height: package.height,
        });
        let stride = package.stride;
        let fd = package.fds.into_iter().next().ok_or(ProtocolViolation::ItemCount {
            what: "buffer package",
            data: 0,
            fds: 0,
            expected_data: 0,
            expected_fds: 1,
        })?;

        debug!(stride, ?geometry, "colour buffer advanced");
        Ok(BufferIdentity::Prime {
            fd,
            stride,
            geometry,
        })
    }

    fn set_swap_interval(&self, _window: &dyn NativeWindow, _interval: i32) -> Result<()> {
        Err(SurfaceError::Unsupported {
            what: "swap interval",
            generation: ProtocolGeneration::Prime,
        })
    }

    fn tracks_front_buffer(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::testing::ScriptedWindow;
    use area_ipc::shm::create_memfd;
    use area_ipc::{BufferPackage, BufferProtocol};

    #[test]
    fn test_descriptor_and_geometry_are_returned() {
        let window = ScriptedWindow::new(BufferProtocol::Prime, 1024, 768);
        match PrimeChannel.refresh_colour_buffer(&window).unwrap() {
            BufferIdentity::Prime {
                stride, geometry, ..
            } => {
                assert_eq!(stride, 4096);
                assert_eq!(
                    geometry,
                    Some(Geometry {
                        width: 1024,
                        height: 768
                    })
                );
            }
            other => panic!("Wrong identity: {:?}", other),
        }
    }

    #[test]
    fn test_zero_geometry_means_not_reported() {
        let window = ScriptedWindow::new(BufferProtocol::Prime, 800, 600);
        window.omit_geometry();
        match PrimeChannel.refresh_colour_buffer(&window).unwrap() {
            BufferIdentity::Prime { geometry, .. } => assert_eq!(geometry, None),
            other => panic!("Wrong identity: {:?}", other),
        }
    }

    #[test]
    fn test_two_descriptors_are_rejected() {
        let window = ScriptedWindow::new(BufferProtocol::Prime, 800, 600);
        window.push(Ok(BufferPackage {
            data: vec![],
            fds: vec![
                create_memfd(c"a", 16).unwrap(),
                create_memfd(c"b", 16).unwrap(),
            ],
            stride: 3200,
            width: 800,
            height: 600,
        }));

        match PrimeChannel.refresh_colour_buffer(&window) {
            Err(SurfaceError::Protocol(ProtocolViolation::ItemCount { fds, .. })) => {
                assert_eq!(fds, 2)
            }
            other => panic!("Expected item count violation, got {:?}", other),
        }
    }

    #[test]
    fn test_name_in_prime_generation_is_rejected() {
        let window = ScriptedWindow::new(BufferProtocol::Prime, 800, 600);
        window.push(Ok(BufferPackage {
            data: vec![5],
            fds: vec![],
            stride: 3200,
            width: 0,
            height: 0,
        }));
        assert!(matches!(
            PrimeChannel.refresh_colour_buffer(&window),
            Err(SurfaceError::Protocol(_))
        ));
    }

    #[test]
    fn test_swap_interval_unsupported() {
        let window = ScriptedWindow::new(BufferProtocol::Prime, 800, 600);
        assert!(matches!(
            PrimeChannel.set_swap_interval(&window, 1),
            Err(SurfaceError::Unsupported { .. })
        ));
        assert!(window.intervals().is_empty());
    }
}
