//! Buffer attachment kinds and the record handed to the rendering driver.

use std::fmt;
use std::os::fd::RawFd;

use crate::error::SurfaceError;

/// Number of attachment kinds the rendering driver can request.
pub const ATTACHMENT_COUNT: usize = 11;

/// Role of a buffer attached to a drawable.
///
/// Discriminants are the driver's attachment indices.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    FrontLeft = 0,
    BackLeft = 1,
    FrontRight = 2,
    BackRight = 3,
    Depth = 4,
    Stencil = 5,
    Accum = 6,
    FakeFrontLeft = 7,
    FakeFrontRight = 8,
    DepthStencil = 9,
    Hiz = 10,
}

impl Attachment {
    pub const ALL: [Attachment; ATTACHMENT_COUNT] = [
        Self::FrontLeft,
        Self::BackLeft,
        Self::FrontRight,
        Self::BackRight,
        Self::Depth,
        Self::Stencil,
        Self::Accum,
        Self::FakeFrontLeft,
        Self::FakeFrontRight,
        Self::DepthStencil,
        Self::Hiz,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Front and back left buffers are supplied by the compositor and are
    /// never allocated locally.
    pub const fn is_colour(self) -> bool {
        matches!(self, Self::FrontLeft | Self::BackLeft)
    }
}

impl TryFrom<u32> for Attachment {
    type Error = SurfaceError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(raw as usize)
            .copied()
            .ok_or(SurfaceError::UnknownAttachment(raw))
    }
}

/// One `(attachment, bits per pixel)` pair of a get-buffers-with-format call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentRequest {
    pub attachment: Attachment,
    pub bits_per_pixel: u32,
}

impl AttachmentRequest {
    pub const fn new(attachment: Attachment, bits_per_pixel: u32) -> Self {
        Self {
            attachment,
            bits_per_pixel,
        }
    }

    /// Decode the driver's flat `[attachment, format, attachment, format, ..]`
    /// array.
    pub fn from_pairs(raw: &[u32]) -> Result<Vec<Self>, SurfaceError> {
        if raw.len() % 2 != 0 {
            return Err(SurfaceError::UnpairedAttachment { len: raw.len() });
        }
        raw.chunks_exact(2)
            .map(|pair| Ok(Self::new(Attachment::try_from(pair[0])?, pair[1])))
            .collect()
    }
}

/// Buffer description returned to the rendering driver.
///
/// `fd` is borrowed from the owning slot and stays valid until that slot is
/// refreshed or released.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DriBuffer {
    pub attachment: Attachment,
    /// Buffer name in the driver's namespace; zero when `fd` identifies it
    pub name: u32,
    pub fd: Option<RawFd>,
    /// Row stride in bytes
    pub pitch: u32,
    /// Bytes per pixel
    pub cpp: u32,
    pub flags: u32,
}

impl DriBuffer {
    pub const fn placeholder(attachment: Attachment, cpp: u32) -> Self {
        Self {
            attachment,
            name: 0,
            fd: None,
            pitch: 0,
            cpp,
            flags: 0,
        }
    }
}

impl fmt::Debug for DriBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("DriBuffer");
        out.field("attachment", &self.attachment);
        match self.fd {
            Some(fd) => out.field("fd", &fd),
            None => out.field("name", &self.name),
        };
        out.field("pitch", &self.pitch)
            .field("cpp", &self.cpp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_indices_round_trip() {
        for attachment in Attachment::ALL {
            assert_eq!(
                Attachment::try_from(attachment as u32).unwrap(),
                attachment
            );
        }
        assert!(matches!(
            Attachment::try_from(ATTACHMENT_COUNT as u32),
            Err(SurfaceError::UnknownAttachment(11))
        ));
    }

    #[test]
    fn test_only_left_colour_buffers_are_colour_slots() {
        let colour: Vec<_> = Attachment::ALL.into_iter().filter(|a| a.is_colour()).collect();
        assert_eq!(colour, vec![Attachment::FrontLeft, Attachment::BackLeft]);
    }

    #[test]
    fn test_requests_from_flat_pairs() {
        let requests = AttachmentRequest::from_pairs(&[1, 32, 4, 24]).unwrap();
        assert_eq!(
            requests,
            vec![
                AttachmentRequest::new(Attachment::BackLeft, 32),
                AttachmentRequest::new(Attachment::Depth, 24),
            ]
        );
        assert!(AttachmentRequest::from_pairs(&[42, 32]).is_err());
    }

    #[test]
    fn test_odd_length_array_is_rejected() {
        match AttachmentRequest::from_pairs(&[1, 32, 4]) {
            Err(SurfaceError::UnpairedAttachment { len }) => assert_eq!(len, 3),
            other => panic!("Expected unpaired attachment, got {:?}", other),
        }
    }
}
