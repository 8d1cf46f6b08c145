//! Full classifier backend: opens a datalink channel via `pnet_datalink` on
//! a nominated interface.

use netsentry_core::error::{CaptureError, NetsentryError};
use pnet_datalink::{Channel, Config, NetworkInterface};

use crate::frame_source::FrameSource;

pub struct PnetFrameSource {
    rx: Box<dyn pnet_datalink::DataLinkReceiver>,
}

impl PnetFrameSource {
    pub fn open(interface_name: &str) -> Result<Self, NetsentryError> {
        let interface = pnet_datalink::interfaces()
            .into_iter()
            .find(|iface: &NetworkInterface| iface.name == interface_name)
            .ok_or_else(|| CaptureError::BackendUnavailable {
                interface: interface_name.to_owned(),
                reason: "no such interface".to_owned(),
            })?;

        let channel = pnet_datalink::channel(&interface, Config::default()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                NetsentryError::from(CaptureError::PrivilegeDenied {
                    interface: interface_name.to_owned(),
                })
            } else {
                NetsentryError::from(CaptureError::BackendUnavailable {
                    interface: interface_name.to_owned(),
                    reason: e.to_string(),
                })
            }
        })?;

        let rx = match channel {
            Channel::Ethernet(_, rx) => rx,
            _ => {
                return Err(CaptureError::BackendUnavailable {
                    interface: interface_name.to_owned(),
                    reason: "unsupported channel type".to_owned(),
                }
                .into())
            }
        };

        Ok(Self { rx })
    }
}

impl FrameSource for PnetFrameSource {
    fn next_frame(&mut self) -> Result<Vec<u8>, NetsentryError> {
        match self.rx.next() {
            Ok(frame) => Ok(frame.to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(CaptureError::WouldBlock(e.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
