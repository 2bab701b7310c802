//! Anonymous shared-memory buffers

use std::ffi::CStr;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};

/// Create a close-on-exec memfd of `size` bytes.
pub fn create_memfd(name: &CStr, size: u64) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    let len = libc::off_t::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "memfd size overflows off_t"))?;
    if unsafe { libc::ftruncate(fd, len) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(owned)
}

/// Round a row of `width * cpp` bytes up to `align` (a power of two).
/// `None` when the row does not fit in a `u32`.
pub const fn aligned_pitch(width: u32, cpp: u32, align: u32) -> Option<u32> {
    let Some(row) = width.checked_mul(cpp) else {
        return None;
    };
    let Some(padded) = row.checked_add(align - 1) else {
        return None;
    };
    Some(padded & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_memfd_has_requested_size() {
        let fd = create_memfd(c"area-test", 4096).unwrap();
        let file = File::from(fd);
        assert_eq!(file.metadata().unwrap().len(), 4096);
    }

    #[test]
    fn test_pitch_alignment() {
        assert_eq!(aligned_pitch(800, 4, 64), Some(3200));
        assert_eq!(aligned_pitch(801, 4, 64), Some(3264));
        assert_eq!(aligned_pitch(1, 2, 64), Some(64));
    }

    #[test]
    fn test_pitch_overflow_is_none() {
        assert_eq!(aligned_pitch(0x4000_0000, 4, 64), None);
        assert_eq!(aligned_pitch(u32::MAX / 4, 4, 64), None);
    }
}
