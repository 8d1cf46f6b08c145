//! Domain types shared across the detection and mitigation pipeline.

use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

use pnet_datalink::MacAddr;
use serde::{Deserialize, Serialize};

/// Severity of an open threat.
///
/// Ordered so that `Severity::Critical > Severity::High`, used directly by
/// the threat registry's upsert rule (keep the higher severity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The kind of attack a threat record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatKind {
    ArpSpoofing,
    DdosSynFlood,
    DdosUdpFlood,
    DdosIcmpFlood,
    HorizontalScan,
    VerticalScan,
    CombinedScan,
    Bruteforce,
}

/// A single target a mitigation action can be taken against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MitigationTarget {
    Ip(IpAddr),
    IpMac(Ipv4Addr, SerializableMac),
}

/// `pnet_datalink::MacAddr` does not implement `serde`; this newtype does,
/// storing the address as its six octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializableMac(pub [u8; 6]);

impl From<MacAddr> for SerializableMac {
    fn from(mac: MacAddr) -> Self {
        Self([mac.0, mac.1, mac.2, mac.3, mac.4, mac.5])
    }
}

impl From<SerializableMac> for MacAddr {
    fn from(mac: SerializableMac) -> Self {
        let [a, b, c, d, e, f] = mac.0;
        MacAddr::new(a, b, c, d, e, f)
    }
}

impl std::fmt::Display for SerializableMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        MacAddr::from(*self).fmt(f)
    }
}

/// Kind-specific detail attached to a [`Threat`]. Each variant carries only
/// the fields meaningful for that detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ThreatDetail {
    ArpSpoofing {
        macs: Vec<SerializableMac>,
        is_gateway: bool,
    },
    DdosFlood {
        packets_per_second: f64,
        attributed: bool,
    },
    Scan {
        target_port: Option<u16>,
        hosts_scanned: usize,
        ports_scanned: usize,
        targets: Vec<IpAddr>,
        known_scanner: Option<String>,
    },
    Bruteforce {
        dst_ip: IpAddr,
        dst_port: u16,
        attempts: usize,
        failed: usize,
        succeeded: usize,
    },
}

/// An immutable record of an observed attack, as described by the threat
/// registry's data model. Once emitted a threat is replaced, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub kind: ThreatKind,
    pub severity: Severity,
    /// Source IP, or a synthetic id (e.g. the gateway IP) when the threat
    /// has no single attributable source.
    pub source_id: String,
    pub detail: ThreatDetail,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
}

impl Threat {
    /// The registry upsert rule: keep whichever of `self`/`incoming` has the
    /// higher severity, or — on a severity tie — the more recent `last_seen`.
    /// Otherwise the existing record's `last_seen` is simply extended.
    ///
    /// `DdosFlood`'s severity is constant per `PacketKind`, so same-source
    /// ticks always tie on severity; `packets_per_second` is tracked as a
    /// running peak across the merge so a later, quieter tick never erases
    /// the source's recorded peak rate.
    pub fn merge(&self, incoming: &Threat) -> Threat {
        let mut merged = if incoming.severity >= self.severity || incoming.last_seen > self.last_seen {
            let mut m = incoming.clone();
            m.first_seen = self.first_seen.min(incoming.first_seen);
            m
        } else {
            let mut m = self.clone();
            m.last_seen = m.last_seen.max(incoming.last_seen);
            m
        };

        if let (ThreatDetail::DdosFlood { packets_per_second: self_pps, .. }, ThreatDetail::DdosFlood { packets_per_second: incoming_pps, .. }) =
            (&self.detail, &incoming.detail)
        {
            let peak = self_pps.max(*incoming_pps);
            if let ThreatDetail::DdosFlood { packets_per_second, .. } = &mut merged.detail {
                *packets_per_second = peak;
            }
        }

        merged
    }
}
