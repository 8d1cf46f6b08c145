//! Fallback backend: an `AF_PACKET`/`SOCK_RAW` socket bound to one
//! interface, used when the capture library is unavailable or the operator
//! prefers not to link it in. Produces the exact same raw Ethernet frame
//! bytes the pnet backend does, so [`crate::classify::classify_frame`] is
//! shared unmodified.

#![cfg(unix)]

use std::ffi::CString;
use std::mem::MaybeUninit;
use std::os::fd::FromRawFd;

use netsentry_core::error::{CaptureError, NetsentryError};
use socket2::{Domain, Protocol, Socket, Type};

use crate::frame_source::FrameSource;

const ETH_P_ALL: u16 = 0x0003;
const MAX_FRAME_LEN: usize = 65536;

pub struct RawSocketFrameSource {
    socket: Socket,
    buf: [u8; MAX_FRAME_LEN],
}

impl RawSocketFrameSource {
    pub fn open(interface_name: &str) -> Result<Self, NetsentryError> {
        // SOCK_RAW + ETH_P_ALL requires CAP_NET_RAW; libc::socket failing
        // with EPERM is the privilege-denied path the spec's capture
        // failure semantics describe.
        let domain = Domain::from(libc::AF_PACKET);
        let socket = Socket::new(domain, Type::RAW, Some(Protocol::from(ETH_P_ALL.to_be() as i32)))
            .map_err(|e| match e.raw_os_error() {
                Some(libc::EPERM) => CaptureError::PrivilegeDenied {
                    interface: interface_name.to_owned(),
                },
                _ => CaptureError::BackendUnavailable {
                    interface: interface_name.to_owned(),
                    reason: e.to_string(),
                },
            })?;

        bind_to_interface(&socket, interface_name)?;

        Ok(Self { socket, buf: [0u8; MAX_FRAME_LEN] })
    }
}

fn bind_to_interface(socket: &Socket, interface_name: &str) -> Result<(), NetsentryError> {
    let name = CString::new(interface_name).map_err(|_| CaptureError::BackendUnavailable {
        interface: interface_name.to_owned(),
        reason: "interface name contains a NUL byte".to_owned(),
    })?;

    // SAFETY: `name` is a valid NUL-terminated C string borrowed for the
    // duration of the call; `if_nametoindex` does not retain it.
    let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if ifindex == 0 {
        return Err(CaptureError::BackendUnavailable {
            interface: interface_name.to_owned(),
            reason: "unknown interface".to_owned(),
        }
        .into());
    }

    let mut addr: libc::sockaddr_ll = unsafe { MaybeUninit::zeroed().assume_init() };
    addr.sll_family = libc::AF_PACKET as u16;
    addr.sll_protocol = ETH_P_ALL.to_be();
    addr.sll_ifindex = ifindex as i32;

    // SAFETY: `addr` is a fully-initialized sockaddr_ll of the correct size
    // for bind(2), and `socket`'s raw fd stays valid for the call.
    let ret = unsafe {
        libc::bind(
            std::os::fd::AsRawFd::as_raw_fd(socket),
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(CaptureError::BackendUnavailable {
            interface: interface_name.to_owned(),
            reason: std::io::Error::last_os_error().to_string(),
        }
        .into());
    }
    Ok(())
}

impl FrameSource for RawSocketFrameSource {
    fn next_frame(&mut self) -> Result<Vec<u8>, NetsentryError> {
        // SAFETY: `recv` through the `libc` fd writes at most `buf.len()`
        // bytes into a buffer we own for the duration of the call.
        let n = unsafe {
            libc::recv(
                std::os::fd::AsRawFd::as_raw_fd(&self.socket),
                self.buf.as_mut_ptr() as *mut libc::c_void,
                self.buf.len(),
                0,
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(CaptureError::WouldBlock(err.to_string()).into());
            }
            return Err(err.into());
        }
        Ok(self.buf[..n as usize].to_vec())
    }
}

/// Reconstructs a `Socket` from a raw fd for tests that need one without an
/// actual `CAP_NET_RAW`-gated open(2).
#[cfg(test)]
#[allow(dead_code)]
unsafe fn socket_from_raw_fd(fd: i32) -> Socket {
    unsafe { Socket::from_raw_fd(fd) }
}
