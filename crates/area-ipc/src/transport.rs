//! SOCK_SEQPACKET message framing with SCM_RIGHTS descriptor passing.
//!
//! One datagram carries one fixed header, an optional run of `u32` payload
//! words and up to `MAX_FD_ITEMS` descriptors as ancillary data.

use std::io::{IoSlice, IoSliceMut};
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use bytemuck::Pod;
use nix::sys::socket::{
    recvmsg, sendmsg, socketpair, AddressFamily, ControlMessage, ControlMessageOwned, MsgFlags,
    SockFlag, SockType,
};
use tracing::{trace, warn};

use crate::error::{IpcError, Result};
use crate::surface_proto::{MAX_DATA_ITEMS, MAX_FD_ITEMS};

/// A decoded datagram.
#[derive(Debug)]
pub struct Received<H> {
    pub header: H,
    pub data: Vec<u32>,
    pub fds: Vec<OwnedFd>,
}

/// Create a connected, close-on-exec SOCK_SEQPACKET pair.
pub fn seqpacket_pair() -> Result<(OwnedFd, OwnedFd)> {
    let pair = socketpair(
        AddressFamily::Unix,
        SockType::SeqPacket,
        None,
        SockFlag::SOCK_CLOEXEC,
    )?;
    Ok(pair)
}

/// Send one datagram. Descriptors are duplicated by the kernel; the caller
/// keeps ownership of its copies.
pub fn send_message<H: Pod>(
    socket: BorrowedFd<'_>,
    header: &H,
    data: &[u32],
    fds: &[BorrowedFd<'_>],
) -> Result<()> {
    if data.len() > MAX_DATA_ITEMS || fds.len() > MAX_FD_ITEMS {
        return Err(IpcError::Malformed(format!(
            "{} data items / {} descriptors exceed the message limits",
            data.len(),
            fds.len()
        )));
    }

    let raw_fds: Vec<RawFd> = fds.iter().map(|fd| fd.as_raw_fd()).collect();
    let iov = [
        IoSlice::new(bytemuck::bytes_of(header)),
        IoSlice::new(bytemuck::cast_slice(data)),
    ];
    let cmsgs = if raw_fds.is_empty() {
        vec![]
    } else {
        vec![ControlMessage::ScmRights(&raw_fds)]
    };

    let expected = mem::size_of::<H>() + mem::size_of_val(data);
    let sent = sendmsg::<()>(
        socket.as_raw_fd(),
        &iov,
        &cmsgs,
        MsgFlags::MSG_NOSIGNAL,
        None,
    )?;
    if sent != expected {
        return Err(IpcError::Malformed(format!(
            "short send: {sent} of {expected} bytes"
        )));
    }

    trace!(bytes = sent, fds = raw_fds.len(), "sent message");
    Ok(())
}

/// Receive one datagram. Returns `Ok(None)` when the peer has hung up.
pub fn recv_message<H: Pod>(socket: BorrowedFd<'_>) -> Result<Option<Received<H>>> {
    let header_len = mem::size_of::<H>();
    let mut buf = vec![0u8; header_len + MAX_DATA_ITEMS * mem::size_of::<u32>()];
    let mut cmsg_buf = nix::cmsg_space!([RawFd; MAX_FD_ITEMS]);

    let (bytes, raw_fds, flags) = {
        let mut iov = [IoSliceMut::new(&mut buf)];
        let msg = recvmsg::<()>(
            socket.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buf),
            MsgFlags::MSG_CMSG_CLOEXEC,
        )?;

        let mut raw_fds = Vec::new();
        for cmsg in msg.cmsgs()? {
            match cmsg {
                ControlMessageOwned::ScmRights(fds) => raw_fds.extend(fds),
                other => warn!("Ignoring unexpected control message: {:?}", other),
            }
        }
        (msg.bytes, raw_fds, msg.flags)
    };

    // Own every received descriptor before any validation can bail out.
    let fds: Vec<OwnedFd> = raw_fds
        .into_iter()
        .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
        .collect();

    if bytes == 0 && fds.is_empty() {
        return Ok(None);
    }
    if flags.intersects(MsgFlags::MSG_TRUNC | MsgFlags::MSG_CTRUNC) {
        return Err(IpcError::Malformed("message truncated".into()));
    }
    if bytes < header_len {
        return Err(IpcError::Malformed(format!(
            "{bytes} bytes is shorter than the {header_len} byte header"
        )));
    }

    let payload = &buf[header_len..bytes];
    if payload.len() % mem::size_of::<u32>() != 0 {
        return Err(IpcError::Malformed(format!(
            "payload of {} bytes is not word aligned",
            payload.len()
        )));
    }

    let header: H = bytemuck::pod_read_unaligned(&buf[..header_len]);
    let data = payload
        .chunks_exact(4)
        .map(|word| u32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
        .collect();

    trace!(bytes, fds = fds.len(), "received message");
    Ok(Some(Received { header, data, fds }))
}
