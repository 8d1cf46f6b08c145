//! Default-route reader. Parses `/proc/net/route`'s text format (header plus
//! whitespace-separated columns `Iface Destination Gateway Flags ...`),
//! finding the row whose destination is all-zeros and decoding its gateway
//! field — a little-endian 32-bit hex integer — into a dotted-quad address.

use std::net::Ipv4Addr;
use std::path::Path;

use netsentry_core::error::{DetectionError, NetsentryError, ParseError};

const DEFAULT_DESTINATION: &str = "00000000";

pub async fn read_default_gateway(path: impl AsRef<Path>) -> Result<Ipv4Addr, NetsentryError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DetectionError::DefaultRouteRead(e.to_string()))?;
    parse_default_gateway(&content)
}

/// Exposed at `pub` visibility (rather than private) so it can be driven
/// directly from a fuzz target without going through the filesystem.
pub fn parse_default_gateway(content: &str) -> Result<Ipv4Addr, NetsentryError> {
    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        if parts[1] == DEFAULT_DESTINATION {
            return hex_to_ip(parts[2]);
        }
    }
    Err(ParseError::NoDefaultRoute.into())
}

/// The kernel stores the gateway as a little-endian 32-bit hex integer:
/// byte order in the hex string is reversed relative to the dotted-quad
/// octet order.
fn hex_to_ip(hex_str: &str) -> Result<Ipv4Addr, NetsentryError> {
    if hex_str.len() != 8 {
        return Err(ParseError::MalformedRow(hex_str.to_owned()).into());
    }
    let mut octets = [0u8; 4];
    for i in 0..4 {
        let byte_hex = &hex_str[i * 2..i * 2 + 2];
        octets[i] = u8::from_str_radix(byte_hex, 16)
            .map_err(|_| ParseError::MalformedRow(hex_str.to_owned()))?;
    }
    octets.reverse();
    Ok(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_gateway() {
        // 192.168.1.1 little-endian hex is 0101A8C0
        let gw = hex_to_ip("0101A8C0").unwrap();
        assert_eq!(gw, Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn finds_default_route_row() {
        let content = "\
Iface\tDestination\tGateway\tFlags\tRefCnt\tUse\tMetric\tMask\tMTU\tWindow\tIRTT
eth0\t0064A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t0\t00000000\t0\t0\t0
";
        let gw = parse_default_gateway(content).unwrap();
        assert_eq!(gw, Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn missing_default_route_is_an_error() {
        let content = "Iface\tDestination\tGateway\n\
eth0\t0064A8C0\t00000000\n";
        assert!(parse_default_gateway(content).is_err());
    }

    #[test]
    fn malformed_hex_is_an_error() {
        assert!(hex_to_ip("zz").is_err());
        assert!(hex_to_ip("zzzzzzzz").is_err());
    }
}
