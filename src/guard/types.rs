//! Address and identifier types shared by the guard components.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::GuardError;

/// Switch port number as reported in PacketIn notifications
pub type PortNo = u16;

/// Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        MacAddr([a, b, c, d, e, f])
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| GuardError::InvalidMac(s.to_string()))?;
            // from_str_radix alone would take a leading '+'
            if part.is_empty()
                || part.len() > 2
                || !part.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(GuardError::InvalidMac(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| GuardError::InvalidMac(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(GuardError::InvalidMac(s.to_string()));
        }

        Ok(MacAddr(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// OpenFlow datapath identifier of a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(pub u64);

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Low 48 bits carry the switch MAC
        let bytes = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
            bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]
        )
    }
}

/// Packet delivered to the controller by a switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub switch: SwitchId,
    pub in_port: PortNo,
    /// Raw Ethernet frame as captured by the switch
    pub data: Vec<u8>,
}

impl PacketIn {
    pub fn new(switch: SwitchId, in_port: PortNo, data: impl Into<Vec<u8>>) -> Self {
        Self {
            switch,
            in_port,
            data: data.into(),
        }
    }
}

/// Notifications delivered by the switch transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    ConnectionUp(SwitchId),
    PacketIn(PacketIn),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "00:00:DE:ad:be:ef".parse().unwrap();
        assert_eq!(mac, MacAddr::new(0x00, 0x00, 0xde, 0xad, 0xbe, 0xef));
        assert_eq!(mac.to_string(), "00:00:de:ad:be:ef");

        let short: MacAddr = "0:0:0:0:0:1".parse().unwrap();
        assert_eq!(short, MacAddr::new(0, 0, 0, 0, 0, 1));
    }

    #[test]
    fn test_mac_parse_rejects_garbage() {
        for bad in [
            "",
            "00:00:00:00:00",
            "00:00:00:00:00:00:00",
            "zz:00:00:00:00:00",
            "000:00:00:00:00:01",
            "00-00-00-00-00-01",
            "+f:00:00:00:00:01",
            "+f:+0:00:00:00:01",
        ] {
            assert!(bad.parse::<MacAddr>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_switch_id_display() {
        assert_eq!(SwitchId(1).to_string(), "00-00-00-00-00-01");
        assert_eq!(SwitchId(0xffff_0000_0000_00ab).to_string(), "00-00-00-00-00-ab");
    }
}
