//! Relay Agent Information (Option 82) sub-option decoding.
//!
//! A relay agent inserts option 82 when forwarding a client's request. Its
//! payload is a sequence of sub-options, each encoded as
//! `code (1) | length (1) | data (length)`.
//!
//! # References
//!
//! - RFC 3046: DHCP Relay Agent Information Option
//! - RFC 3993: Subscriber-ID Suboption for the DHCP Relay Agent Option

use crate::error::{Error, Result};

/// Relay agent sub-option codes used for lease lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubOptionCode {
    /// Agent Circuit ID (RFC 3046 §2.1).
    CircuitId = 1,
    /// Agent Remote ID (RFC 3046 §2.2).
    RemoteId = 2,
    /// Subscriber ID (RFC 3993).
    SubscriberId = 6,
}

/// Decoded contents of a Relay Agent Information option.
///
/// Sub-options are kept in wire order. Unknown codes are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayAgentInfo {
    sub_options: Vec<(u8, Vec<u8>)>,
}

impl RelayAgentInfo {
    /// Decodes the payload of option 82 (without its own code and length).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if a sub-option header or its data
    /// runs past the end of the payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut sub_options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if index + 1 >= data.len() {
                return Err(Error::InvalidPacket(format!(
                    "Relay sub-option {} length missing",
                    code
                )));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::InvalidPacket(format!(
                    "Relay sub-option {} data truncated",
                    code
                )));
            }

            sub_options.push((code, data[index + 2..index + 2 + length].to_vec()));
            index += 2 + length;
        }

        Ok(Self { sub_options })
    }

    /// Returns the data of the first sub-option with the given code.
    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.sub_options
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, data)| data.as_slice())
    }

    pub fn circuit_id(&self) -> Option<&[u8]> {
        self.get(SubOptionCode::CircuitId as u8)
    }

    /// Returns the Circuit-ID with a leading `type (1) | length (1)` header
    /// removed, when the sub-option is encoded that way.
    ///
    /// Some relay agents wrap the circuit name in such a header (type 1
    /// meaning a printable string). Returns `None` when the data does not
    /// have that shape.
    pub fn typed_circuit_id(&self) -> Option<&[u8]> {
        let data = self.circuit_id()?;
        match data {
            [_, length, value @ ..] if *length as usize == value.len() && !value.is_empty() => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn remote_id(&self) -> Option<&[u8]> {
        self.get(SubOptionCode::RemoteId as u8)
    }

    /// Returns the Subscriber-ID, which RFC 3993 defines as NVT ASCII.
    ///
    /// Values that are not valid UTF-8 are treated as absent.
    pub fn subscriber_id(&self) -> Option<&str> {
        self.get(SubOptionCode::SubscriberId as u8)
            .and_then(|data| std::str::from_utf8(data).ok())
    }

    /// Iterates over all sub-options as `(code, data)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.sub_options
            .iter()
            .map(|(code, data)| (*code, data.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.sub_options.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Captured option 82 payload: Remote-ID (12 bytes) + Subscriber-ID "PORT1".
    const REMOTE_AND_SUBSCRIBER: &[u8] =
        b"\x02\x0c\x02\x0a\x00\x00\x0a\xff\xc6\x01\x11\x00\x00\x00\x06\x05\x50\x4f\x52\x54\x31";

    // Captured option 82 payload: typed Circuit-ID (type 1, "Nexus") + Remote-ID MAC.
    const CIRCUIT_AND_REMOTE: &[u8] =
        b"\x01\x07\x01\x05\x4e\x65\x78\x75\x73\x02\x06\x88\xf0\x31\xa4\x46\xc1";

    #[test]
    fn test_decode_remote_and_subscriber() {
        let info = RelayAgentInfo::parse(REMOTE_AND_SUBSCRIBER).unwrap();
        assert_eq!(
            info.remote_id(),
            Some(&b"\x02\x0a\x00\x00\x0a\xff\xc6\x01\x11\x00\x00\x00"[..])
        );
        assert_eq!(info.subscriber_id(), Some("PORT1"));
        assert_eq!(info.circuit_id(), None);
    }

    #[test]
    fn test_decode_circuit_and_remote() {
        let info = RelayAgentInfo::parse(CIRCUIT_AND_REMOTE).unwrap();
        assert_eq!(info.circuit_id(), Some(&b"\x01\x05Nexus"[..]));
        assert_eq!(
            info.remote_id(),
            Some(&[0x88, 0xf0, 0x31, 0xa4, 0x46, 0xc1][..])
        );
        assert_eq!(info.typed_circuit_id(), Some(&b"Nexus"[..]));
        assert_eq!(info.subscriber_id(), None);
        assert_eq!(info.iter().count(), 2);
    }

    #[test]
    fn test_untyped_circuit_id_has_no_typed_value() {
        let info = RelayAgentInfo::parse(b"\x01\x05port1").unwrap();
        assert_eq!(info.circuit_id(), Some(&b"port1"[..]));
        assert_eq!(info.typed_circuit_id(), None);
    }

    #[test]
    fn test_empty_payload() {
        let info = RelayAgentInfo::parse(&[]).unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn test_zero_length_sub_option() {
        let info = RelayAgentInfo::parse(&[1, 0, 6, 1, b'x']).unwrap();
        assert_eq!(info.circuit_id(), Some(&b""[..]));
        assert_eq!(info.subscriber_id(), Some("x"));
    }

    #[test]
    fn test_truncated_sub_options_rejected() {
        assert!(RelayAgentInfo::parse(&[1]).is_err());
        assert!(RelayAgentInfo::parse(&[1, 5, b'a', b'b']).is_err());
        assert!(RelayAgentInfo::parse(&[2, 1, b'a', 6]).is_err());
    }

    #[test]
    fn test_non_utf8_subscriber_id_is_absent() {
        let info = RelayAgentInfo::parse(&[6, 2, 0xff, 0xfe]).unwrap();
        assert_eq!(info.subscriber_id(), None);
        assert_eq!(info.get(6), Some(&[0xff, 0xfe][..]));
    }
}
