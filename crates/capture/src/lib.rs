//! Packet capture: frame classification shared by two backends (a capture
//! library and a raw-socket fallback), plus the kernel neighbor-table and
//! default-route readers the ARP detector relies on instead of live events.

pub mod classify;
pub mod frame_source;
pub mod neighbor;
pub mod pnet_source;
pub mod route;
pub mod source;

#[cfg(unix)]
pub mod raw_socket_source;
