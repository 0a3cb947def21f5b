//! Client identities used to look up static leases.
//!
//! A lease can be keyed by the client's hardware address or by one of the
//! identities a relay agent inserts into option 82. Keys of different kinds
//! never compare equal, even when their raw bytes match.

use std::fmt;
use std::str::FromStr;

/// Length of an Ethernet hardware address.
pub const HARDWARE_ADDR_LEN: usize = 6;

/// A 6-byte Ethernet hardware (MAC) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareAddr([u8; HARDWARE_ADDR_LEN]);

impl HardwareAddr {
    pub const fn new(octets: [u8; HARDWARE_ADDR_LEN]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; HARDWARE_ADDR_LEN] {
        self.0
    }

    /// Builds an address from a slice, which must be exactly 6 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; HARDWARE_ADDR_LEN] = bytes.try_into().ok()?;
        Some(Self(octets))
    }
}

impl From<[u8; HARDWARE_ADDR_LEN]> for HardwareAddr {
    fn from(octets: [u8; HARDWARE_ADDR_LEN]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

/// Error returned when text is not a hardware address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hardware address")]
pub struct InvalidHardwareAddr;

impl FromStr for HardwareAddr {
    type Err = InvalidHardwareAddr;

    /// Parses six two-digit hex groups separated consistently by `:` or `-`.
    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let separator = if text.contains(':') { ':' } else { '-' };
        let mut octets = [0u8; HARDWARE_ADDR_LEN];
        let mut count = 0;

        for group in text.split(separator) {
            if count == HARDWARE_ADDR_LEN
                || group.len() != 2
                || !group.bytes().all(|byte| byte.is_ascii_hexdigit())
            {
                return Err(InvalidHardwareAddr);
            }
            octets[count] = u8::from_str_radix(group, 16).map_err(|_| InvalidHardwareAddr)?;
            count += 1;
        }

        if count != HARDWARE_ADDR_LEN {
            return Err(InvalidHardwareAddr);
        }
        Ok(Self(octets))
    }
}

/// The identity a static lease is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    /// Client hardware address (`chaddr` for DHCPv4, DUID link-layer address for DHCPv6).
    Mac(HardwareAddr),
    /// Relay agent Subscriber-ID (option 82 sub-option 6).
    SubscriberId(String),
    /// Relay agent Circuit-ID (option 82 sub-option 1).
    CircuitId(Vec<u8>),
    /// Relay agent Remote-ID (option 82 sub-option 2).
    RemoteId(Vec<u8>),
}

impl LookupKey {
    /// Short name of the identity kind, as used in lease files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mac(_) => "MAC",
            Self::SubscriberId(_) => "Subscriber-ID",
            Self::CircuitId(_) => "Circuit-ID",
            Self::RemoteId(_) => "Remote-ID",
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac(addr) => write!(f, "{}", addr),
            Self::SubscriberId(id) => write!(f, "Subscriber-ID:{:?}", id),
            Self::CircuitId(id) | Self::RemoteId(id) => {
                write!(f, "{}:{:?}", self.kind(), String::from_utf8_lossy(id))
            }
        }
    }
}
