//! Shared byte-level frame classifier used by every capture backend. Both
//! the pnet-based source and the raw-socket fallback hand it a raw Ethernet
//! frame and get back the same [`PacketEvent`] shape — the two backends
//! differ only in how they obtain bytes, never in how bytes are read.

use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

use netsentry_core::event::PacketEvent;
use pnet_datalink::MacAddr;

const ETH_HEADER_LEN: usize = 14;
const ARP_PAYLOAD_LEN: usize = 28;
const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ICMP_MIN_HEADER_LEN: usize = 4;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;

const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

const TCP_FLAG_SYN: u8 = 0x02;
const TCP_FLAG_ACK: u8 = 0x10;

/// Classifies one raw Ethernet frame captured at `now`. Returns `None` for
/// frames that are too short for their claimed protocol, or whose contents
/// don't map onto one of the five tracked kinds (e.g. a TCP segment with
/// neither the SYN nor the SYN+ACK flag pattern).
pub fn classify_frame(frame: &[u8], now: SystemTime) -> Option<PacketEvent> {
    if frame.len() < ETH_HEADER_LEN {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    match ethertype {
        ETHERTYPE_IPV4 => classify_ipv4(frame, now),
        ETHERTYPE_ARP => classify_arp(frame, now),
        _ => None,
    }
}

fn classify_ipv4(frame: &[u8], now: SystemTime) -> Option<PacketEvent> {
    let ip_start = ETH_HEADER_LEN;
    if frame.len() < ip_start + IPV4_MIN_HEADER_LEN {
        return None;
    }
    let ihl = ((frame[ip_start] & 0x0F) as usize) * 4;
    if ihl < IPV4_MIN_HEADER_LEN || frame.len() < ip_start + ihl {
        return None;
    }
    let protocol = frame[ip_start + 9];
    let src_ip = IpAddr::V4(Ipv4Addr::new(
        frame[ip_start + 12],
        frame[ip_start + 13],
        frame[ip_start + 14],
        frame[ip_start + 15],
    ));
    let dst_ip = IpAddr::V4(Ipv4Addr::new(
        frame[ip_start + 16],
        frame[ip_start + 17],
        frame[ip_start + 18],
        frame[ip_start + 19],
    ));
    let payload = &frame[ip_start + ihl..];

    match protocol {
        PROTO_TCP => classify_tcp(payload, src_ip, dst_ip, now),
        PROTO_UDP => classify_udp(payload, src_ip, dst_ip, now),
        PROTO_ICMP => classify_icmp(payload, src_ip, dst_ip, now),
        _ => None,
    }
}

fn classify_tcp(payload: &[u8], src_ip: IpAddr, dst_ip: IpAddr, now: SystemTime) -> Option<PacketEvent> {
    if payload.len() < TCP_MIN_HEADER_LEN {
        return None;
    }
    let src_port = u16::from_be_bytes([payload[0], payload[1]]);
    let dst_port = u16::from_be_bytes([payload[2], payload[3]]);
    let flags = payload[13];
    let syn = flags & TCP_FLAG_SYN != 0;
    let ack = flags & TCP_FLAG_ACK != 0;

    if syn && !ack {
        Some(PacketEvent::Syn { ts: now, src_ip, dst_ip, src_port, dst_port })
    } else if syn && ack {
        Some(PacketEvent::SynAck { ts: now, src_ip, dst_ip, src_port, dst_port })
    } else {
        None
    }
}

fn classify_udp(payload: &[u8], src_ip: IpAddr, dst_ip: IpAddr, now: SystemTime) -> Option<PacketEvent> {
    if payload.len() < UDP_HEADER_LEN {
        return None;
    }
    let src_port = u16::from_be_bytes([payload[0], payload[1]]);
    let dst_port = u16::from_be_bytes([payload[2], payload[3]]);
    Some(PacketEvent::Udp { ts: now, src_ip, dst_ip, src_port, dst_port })
}

fn classify_icmp(payload: &[u8], src_ip: IpAddr, dst_ip: IpAddr, now: SystemTime) -> Option<PacketEvent> {
    if payload.len() < ICMP_MIN_HEADER_LEN {
        return None;
    }
    Some(PacketEvent::Icmp { ts: now, src_ip, dst_ip })
}

fn classify_arp(frame: &[u8], now: SystemTime) -> Option<PacketEvent> {
    let arp_start = ETH_HEADER_LEN;
    if frame.len() < arp_start + ARP_PAYLOAD_LEN {
        return None;
    }
    let arp = &frame[arp_start..arp_start + ARP_PAYLOAD_LEN];
    let hw_len = arp[4];
    let proto_len = arp[5];
    if hw_len != 6 || proto_len != 4 {
        // Only Ethernet/IPv4 ARP is classified; anything else (e.g. IPv6
        // neighbor discovery riding a different ethertype) is out of scope.
        return None;
    }

    let sender_mac = MacAddr::new(arp[8], arp[9], arp[10], arp[11], arp[12], arp[13]);
    let sender_ip = Ipv4Addr::new(arp[14], arp[15], arp[16], arp[17]);
    let target_mac = MacAddr::new(arp[18], arp[19], arp[20], arp[21], arp[22], arp[23]);
    let target_ip = Ipv4Addr::new(arp[24], arp[25], arp[26], arp[27]);

    Some(PacketEvent::Arp { ts: now, sender_ip, target_ip, sender_mac, target_mac })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_header(ethertype: u16) -> Vec<u8> {
        let mut v = vec![0xAAu8; 12];
        v.extend_from_slice(&ethertype.to_be_bytes());
        v
    }

    fn ipv4_header(protocol: u8, payload_len: usize) -> Vec<u8> {
        let mut v = vec![0u8; IPV4_MIN_HEADER_LEN];
        v[0] = 0x45; // version 4, IHL 5 (20 bytes)
        v[9] = protocol;
        v[12..16].copy_from_slice(&[10, 0, 0, 1]);
        v[16..20].copy_from_slice(&[10, 0, 0, 2]);
        let _ = payload_len;
        v
    }

    #[test]
    fn classifies_syn() {
        let mut frame = eth_header(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(PROTO_TCP, TCP_MIN_HEADER_LEN));
        let mut tcp = vec![0u8; TCP_MIN_HEADER_LEN];
        tcp[0..2].copy_from_slice(&1234u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&22u16.to_be_bytes());
        tcp[13] = TCP_FLAG_SYN;
        frame.extend(tcp);

        let event = classify_frame(&frame, SystemTime::now()).expect("should classify");
        assert_eq!(event.kind(), netsentry_core::event::PacketKind::Syn);
        assert_eq!(event.dst_port(), Some(22));
    }

    #[test]
    fn classifies_syn_ack() {
        let mut frame = eth_header(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(PROTO_TCP, TCP_MIN_HEADER_LEN));
        let mut tcp = vec![0u8; TCP_MIN_HEADER_LEN];
        tcp[13] = TCP_FLAG_SYN | TCP_FLAG_ACK;
        frame.extend(tcp);

        let event = classify_frame(&frame, SystemTime::now()).expect("should classify");
        assert_eq!(event.kind(), netsentry_core::event::PacketKind::SynAck);
    }

    #[test]
    fn plain_ack_is_not_emitted() {
        let mut frame = eth_header(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(PROTO_TCP, TCP_MIN_HEADER_LEN));
        let mut tcp = vec![0u8; TCP_MIN_HEADER_LEN];
        tcp[13] = TCP_FLAG_ACK;
        frame.extend(tcp);

        assert!(classify_frame(&frame, SystemTime::now()).is_none());
    }

    #[test]
    fn classifies_udp() {
        let mut frame = eth_header(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(PROTO_UDP, UDP_HEADER_LEN));
        frame.extend(vec![0u8; UDP_HEADER_LEN]);

        let event = classify_frame(&frame, SystemTime::now()).expect("should classify");
        assert_eq!(event.kind(), netsentry_core::event::PacketKind::Udp);
    }

    #[test]
    fn classifies_icmp() {
        let mut frame = eth_header(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(PROTO_ICMP, ICMP_MIN_HEADER_LEN));
        frame.extend(vec![0u8; ICMP_MIN_HEADER_LEN]);

        let event = classify_frame(&frame, SystemTime::now()).expect("should classify");
        assert_eq!(event.kind(), netsentry_core::event::PacketKind::Icmp);
    }

    #[test]
    fn classifies_arp() {
        let mut frame = eth_header(ETHERTYPE_ARP);
        let mut arp = vec![0u8; ARP_PAYLOAD_LEN];
        arp[4] = 6;
        arp[5] = 4;
        arp[8..14].copy_from_slice(&[0x02, 0x42, 0xAC, 0x11, 0x00, 0x02]);
        arp[14..18].copy_from_slice(&[192, 168, 1, 1]);
        frame.extend(arp);

        let event = classify_frame(&frame, SystemTime::now()).expect("should classify");
        assert_eq!(event.kind(), netsentry_core::event::PacketKind::Arp);
    }

    #[test]
    fn truncated_tcp_header_dropped_silently() {
        let mut frame = eth_header(ETHERTYPE_IPV4);
        frame.extend(ipv4_header(PROTO_TCP, TCP_MIN_HEADER_LEN));
        frame.extend(vec![0u8; 10]); // short of the 20-byte minimum
        assert!(classify_frame(&frame, SystemTime::now()).is_none());
    }

    #[test]
    fn short_ethernet_header_dropped_silently() {
        let frame = vec![0u8; 10];
        assert!(classify_frame(&frame, SystemTime::now()).is_none());
    }

    #[test]
    fn unknown_ethertype_ignored() {
        let frame = eth_header(0x86DD); // IPv6, out of scope
        assert!(classify_frame(&frame, SystemTime::now()).is_none());
    }
}
