//! Kernel neighbor table reader. Parses `/proc/net/arp`'s newline-delimited,
//! whitespace-separated text format: `IP address / HW type / Flags / HW
//! address / Mask / Device`, one header row followed by data rows.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;

use netsentry_core::error::{DetectionError, NetsentryError};
use pnet_datalink::MacAddr;

/// Flag values the kernel uses for a resolved (complete) ARP entry. Anything
/// else (incomplete, permanent-without-resolution) is ignored.
const FLAG_COMPLETE: &str = "0x2";
const FLAG_PERMANENT: &str = "0x6";

/// A snapshot of the neighbor table: IP -> set of MACs currently bound.
/// Multiple MACs for one IP is itself the ARP-spoofing signal.
pub type NeighborTable = HashMap<Ipv4Addr, HashSet<MacAddr>>;

pub async fn read_neighbor_table(path: impl AsRef<Path>) -> Result<NeighborTable, NetsentryError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DetectionError::NeighborTableRead(e.to_string()))?;
    parse_neighbor_table(&content)
}

/// Exposed at `pub` visibility (rather than private) so it can be driven
/// directly from a fuzz target without going through the filesystem.
pub fn parse_neighbor_table(content: &str) -> Result<NeighborTable, NetsentryError> {
    let mut table: NeighborTable = HashMap::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let flags = parts[2];
        if flags != FLAG_COMPLETE && flags != FLAG_PERMANENT {
            continue;
        }
        let ip: Ipv4Addr = match parts[0].parse() {
            Ok(ip) => ip,
            Err(_) => continue,
        };
        let mac: MacAddr = match parts[3].parse() {
            Ok(mac) => mac,
            Err(_) => continue,
        };
        table.entry(ip).or_default().insert(mac);
    }

    Ok(table)
}
