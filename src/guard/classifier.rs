//! Packet classifier
//!
//! Turns raw PacketIn frames into typed address claims for the two detection
//! modes: ARP replies (sender IP, sender MAC) and IPv4 packets
//! (link-layer source MAC, network-layer source IP).

use std::net::Ipv4Addr;

use etherparse::{LinkSlice, NetSlice, SlicedPacket};
use tracing::debug;

use super::types::{MacAddr, PacketIn, PortNo, SwitchId};

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const ARP_IPV4_LEN: usize = 28;

const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

// ============================================================================
// Claims
// ============================================================================

/// An address pairing asserted by a single packet
///
/// `primary` is the key looked up in the binding table, `secondary` is
/// compared against the trusted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim<P, S> {
    pub primary: P,
    pub secondary: S,
    pub in_port: PortNo,
    pub switch: SwitchId,
}

/// ARP reply claim: sender IP is bound to sender MAC
pub type ArpClaim = Claim<Ipv4Addr, MacAddr>;

/// IPv4 claim: source MAC is sending as source IP
pub type Ipv4Claim = Claim<MacAddr, Ipv4Addr>;

/// Who a claim implicates when it mismatches its binding
pub trait ClaimIdentity {
    /// MAC charged with the violation
    fn offender(&self) -> MacAddr;

    /// IP address the sender asserts as its own
    fn claimed_ip(&self) -> Ipv4Addr;
}

impl ClaimIdentity for ArpClaim {
    fn offender(&self) -> MacAddr {
        self.secondary
    }

    fn claimed_ip(&self) -> Ipv4Addr {
        self.primary
    }
}

impl ClaimIdentity for Ipv4Claim {
    fn offender(&self) -> MacAddr {
        self.primary
    }

    fn claimed_ip(&self) -> Ipv4Addr {
        self.secondary
    }
}

// ============================================================================
// ARP mode
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    Unknown(u16),
}

impl From<u16> for ArpOp {
    fn from(val: u16) -> Self {
        match val {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            n => ArpOp::Unknown(n),
        }
    }
}

/// ARP for IPv4 over Ethernet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse the 28 byte ARP body that follows the Ethernet header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_IPV4_LEN {
            return None;
        }

        // Ethernet hardware, IPv4 protocol, 6 and 4 byte addresses
        let hw_type = u16::from_be_bytes([data[0], data[1]]);
        let proto_type = u16::from_be_bytes([data[2], data[3]]);
        if hw_type != 1 || proto_type != 0x0800 || data[4] != 6 || data[5] != 4 {
            return None;
        }

        let operation = ArpOp::from(u16::from_be_bytes([data[6], data[7]]));
        let sender_mac = MacAddr([data[8], data[9], data[10], data[11], data[12], data[13]]);
        let sender_ip = Ipv4Addr::new(data[14], data[15], data[16], data[17]);
        let target_mac = MacAddr([data[18], data[19], data[20], data[21], data[22], data[23]]);
        let target_ip = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        Some(ArpPacket {
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }
}

/// Result of classifying a frame for ARP inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpObservation {
    Reply(ArpClaim),
    /// Not ARP, or an ARP opcode other than reply
    NotApplicable,
    /// ARP ethertype but the body could not be decoded
    Malformed,
}

/// Classify a frame for ARP inspection.
///
/// Only replies are checked. Requests pass as not applicable even when their
/// sender fields are forged.
pub fn classify_arp(packet: &PacketIn) -> ArpObservation {
    let Some((ether_type, payload)) = ether_payload(&packet.data) else {
        return ArpObservation::Malformed;
    };
    if ether_type != ETHERTYPE_ARP {
        return ArpObservation::NotApplicable;
    }

    let Some(arp) = ArpPacket::parse(payload) else {
        return ArpObservation::Malformed;
    };

    match arp.operation {
        ArpOp::Reply => ArpObservation::Reply(Claim {
            primary: arp.sender_ip,
            secondary: arp.sender_mac,
            in_port: packet.in_port,
            switch: packet.switch,
        }),
        _ => ArpObservation::NotApplicable,
    }
}

/// Split an Ethernet frame into its ethertype and payload, skipping VLAN tags
fn ether_payload(frame: &[u8]) -> Option<(u16, &[u8])> {
    if frame.len() < ETHERNET_HEADER_LEN {
        return None;
    }

    let mut offset = 12;
    let mut ether_type = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
    while ether_type == ETHERTYPE_VLAN || ether_type == ETHERTYPE_QINQ {
        offset += VLAN_TAG_LEN;
        if frame.len() < offset + 2 {
            return None;
        }
        ether_type = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
    }

    Some((ether_type, &frame[offset + 2..]))
}

// ============================================================================
// IP mode
// ============================================================================

/// Result of classifying a frame for IP source guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ipv4Observation {
    Claim(Ipv4Claim),
    /// Frame carries no IPv4 payload; caller floods it
    PassThrough,
    /// Frame could not be decoded; caller drops it
    Malformed,
}

pub fn classify_ipv4(packet: &PacketIn) -> Ipv4Observation {
    let sliced = match SlicedPacket::from_ethernet(&packet.data) {
        Ok(sliced) => sliced,
        Err(e) => {
            debug!("Dropping undecodable frame on port {}: {}", packet.in_port, e);
            return Ipv4Observation::Malformed;
        }
    };

    let (src_mac, dst_mac) = match &sliced.link {
        Some(LinkSlice::Ethernet2(eth)) => (MacAddr(eth.source()), MacAddr(eth.destination())),
        _ => return Ipv4Observation::Malformed,
    };

    match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            let src_ip = header.source_addr();
            debug!(
                "{} {} => {} {}",
                src_mac,
                src_ip,
                dst_mac,
                header.destination_addr()
            );
            Ipv4Observation::Claim(Claim {
                primary: src_mac,
                secondary: src_ip,
                in_port: packet.in_port,
                switch: packet.switch,
            })
        }
        _ => Ipv4Observation::PassThrough,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn arp_frame(op: u16, sender_mac: [u8; 6], sender_ip: [u8; 4], target_ip: [u8; 4]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(42);
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&sender_mac);
        frame.extend_from_slice(&ETHERTYPE_ARP.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4]);
        frame.extend_from_slice(&op.to_be_bytes());
        frame.extend_from_slice(&sender_mac);
        frame.extend_from_slice(&sender_ip);
        frame.extend_from_slice(&[0x00; 6]);
        frame.extend_from_slice(&target_ip);
        frame
    }

    fn udp_frame(src_mac: [u8; 6], src_ip: [u8; 4]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2(src_mac, [0, 0, 0, 0, 0, 2])
            .ipv4(src_ip, [10, 0, 0, 2], 64)
            .udp(4000, 53);
        let payload = [1u8, 2, 3, 4];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();
        frame
    }

    fn packet_in(port: PortNo, data: Vec<u8>) -> PacketIn {
        PacketIn::new(SwitchId(1), port, data)
    }

    #[test]
    fn test_arp_reply_yields_claim() {
        let frame = arp_frame(2, [0, 0, 0, 0, 0, 2], [10, 0, 0, 1], [10, 0, 0, 3]);
        let observation = classify_arp(&packet_in(3, frame));

        assert_eq!(
            observation,
            ArpObservation::Reply(Claim {
                primary: Ipv4Addr::new(10, 0, 0, 1),
                secondary: MacAddr::new(0, 0, 0, 0, 0, 2),
                in_port: 3,
                switch: SwitchId(1),
            })
        );
    }

    #[test]
    fn test_arp_request_not_checked() {
        let frame = arp_frame(1, [0, 0, 0, 0, 0, 2], [10, 0, 0, 1], [10, 0, 0, 3]);
        assert_eq!(classify_arp(&packet_in(3, frame)), ArpObservation::NotApplicable);
    }

    #[test]
    fn test_arp_mode_ignores_ipv4() {
        let frame = udp_frame([0, 0, 0, 0, 0, 1], [10, 0, 0, 1]);
        assert_eq!(classify_arp(&packet_in(1, frame)), ArpObservation::NotApplicable);
    }

    #[test]
    fn test_truncated_arp_is_malformed() {
        let mut frame = arp_frame(2, [0, 0, 0, 0, 0, 2], [10, 0, 0, 1], [10, 0, 0, 3]);
        frame.truncate(30);
        assert_eq!(classify_arp(&packet_in(3, frame)), ArpObservation::Malformed);
        assert_eq!(classify_arp(&packet_in(3, vec![0xff; 10])), ArpObservation::Malformed);
    }

    #[test]
    fn test_vlan_tagged_arp_reply() {
        let untagged = arp_frame(2, [0, 0, 0, 0, 0, 9], [10, 0, 0, 1], [10, 0, 0, 3]);
        let mut frame = untagged[..12].to_vec();
        frame.extend_from_slice(&ETHERTYPE_VLAN.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x0a]);
        frame.extend_from_slice(&untagged[12..]);

        match classify_arp(&packet_in(4, frame)) {
            ArpObservation::Reply(claim) => {
                assert_eq!(claim.offender(), MacAddr::new(0, 0, 0, 0, 0, 9));
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_ipv4_claim() {
        let frame = udp_frame([0, 0, 0, 0, 0, 1], [10, 0, 0, 9]);
        match classify_ipv4(&packet_in(2, frame)) {
            Ipv4Observation::Claim(claim) => {
                assert_eq!(claim.primary, MacAddr::new(0, 0, 0, 0, 0, 1));
                assert_eq!(claim.secondary, Ipv4Addr::new(10, 0, 0, 9));
                assert_eq!(claim.in_port, 2);
                assert_eq!(claim.offender(), claim.primary);
            }
            other => panic!("expected claim, got {:?}", other),
        }
    }

    #[test]
    fn test_arp_frame_passes_through_ip_mode() {
        let frame = arp_frame(2, [0, 0, 0, 0, 0, 2], [10, 0, 0, 1], [10, 0, 0, 3]);
        assert_eq!(classify_ipv4(&packet_in(3, frame)), Ipv4Observation::PassThrough);
    }

    #[test]
    fn test_ipv6_passes_through_ip_mode() {
        let builder = PacketBuilder::ethernet2([0, 0, 0, 0, 0, 1], [0, 0, 0, 0, 0, 2])
            .ipv6([0xfe; 16], [0xfd; 16], 64)
            .udp(1000, 2000);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[0u8; 8]).unwrap();

        assert_eq!(classify_ipv4(&packet_in(1, frame)), Ipv4Observation::PassThrough);
    }

    #[test]
    fn test_truncated_ipv4_is_malformed() {
        let mut frame = udp_frame([0, 0, 0, 0, 0, 1], [10, 0, 0, 1]);
        frame.truncate(ETHERNET_HEADER_LEN + 8);
        assert_eq!(classify_ipv4(&packet_in(1, frame)), Ipv4Observation::Malformed);
        assert_eq!(classify_ipv4(&packet_in(1, vec![0u8; 6])), Ipv4Observation::Malformed);
    }
}
