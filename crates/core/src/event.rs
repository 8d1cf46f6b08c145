//! The classified packet event — the one type that crosses from the packet
//! source into the event router and from there into every detector.
//!
//! Modeled as a sum type rather than a single struct of all-optional fields
//! or a dynamic callback with keyword arguments, per the typed-channel
//! design note: the router and detectors pattern-match on `PacketKind`
//! instead of inspecting a dynamically-shaped payload.

use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

use pnet_datalink::MacAddr;

/// The tag of a [`PacketEvent`]. Kept separate from the event itself so
/// subscribers can declare interest (`Detector::subscribed_kinds`) without
/// constructing a dummy event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Syn,
    SynAck,
    Udp,
    Icmp,
    Arp,
}

/// A single classified frame. Immutable once emitted by the packet source.
#[derive(Debug, Clone)]
pub enum PacketEvent {
    Syn {
        ts: SystemTime,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
    },
    SynAck {
        ts: SystemTime,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
    },
    Udp {
        ts: SystemTime,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
    },
    Icmp {
        ts: SystemTime,
        src_ip: IpAddr,
        dst_ip: IpAddr,
    },
    Arp {
        ts: SystemTime,
        sender_ip: Ipv4Addr,
        target_ip: Ipv4Addr,
        sender_mac: MacAddr,
        target_mac: MacAddr,
    },
}

impl PacketEvent {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Syn { .. } => PacketKind::Syn,
            Self::SynAck { .. } => PacketKind::SynAck,
            Self::Udp { .. } => PacketKind::Udp,
            Self::Icmp { .. } => PacketKind::Icmp,
            Self::Arp { .. } => PacketKind::Arp,
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::Syn { ts, .. }
            | Self::SynAck { ts, .. }
            | Self::Udp { ts, .. }
            | Self::Icmp { ts, .. }
            | Self::Arp { ts, .. } => *ts,
        }
    }

    /// The IP address detectors attribute the event to. Absent for ARP
    /// events, which carry sender/target addresses instead.
    pub fn src_ip(&self) -> Option<IpAddr> {
        match self {
            Self::Syn { src_ip, .. }
            | Self::SynAck { src_ip, .. }
            | Self::Udp { src_ip, .. }
            | Self::Icmp { src_ip, .. } => Some(*src_ip),
            Self::Arp { .. } => None,
        }
    }

    pub fn dst_ip(&self) -> Option<IpAddr> {
        match self {
            Self::Syn { dst_ip, .. }
            | Self::SynAck { dst_ip, .. }
            | Self::Udp { dst_ip, .. }
            | Self::Icmp { dst_ip, .. } => Some(*dst_ip),
            Self::Arp { .. } => None,
        }
    }

    pub fn dst_port(&self) -> Option<u16> {
        match self {
            Self::Syn { dst_port, .. } | Self::SynAck { dst_port, .. } | Self::Udp { dst_port, .. } => {
                Some(*dst_port)
            }
            Self::Icmp { .. } | Self::Arp { .. } => None,
        }
    }
}
