//! Lookup-key extraction from requests.
//!
//! A DHCPv4 request can carry several identities at once: the client
//! hardware address plus whatever a relay agent put in option 82. They are
//! tried in a fixed order and the first one with a lease wins:
//!
//! 1. MAC address (`chaddr`, Ethernet only)
//! 2. Subscriber-ID
//! 3. Remote-ID
//! 4. Circuit-ID, raw sub-option bytes
//! 5. Circuit-ID, with a `type | length` header removed
//!
//! DHCPv6 requests are matched by MAC only.

use tracing::debug;

use crate::dhcpv6::Dhcpv6Packet;
use crate::key::LookupKey;
use crate::packet::DhcpPacket;

/// Returns the lookup keys of a DHCPv4 request in precedence order.
///
/// Malformed relay agent data is logged and skipped; the MAC candidate is
/// still returned.
pub fn candidates4(request: &DhcpPacket) -> Vec<LookupKey> {
    let mut candidates = Vec::new();

    if let Some(mac) = request.hardware_addr() {
        candidates.push(LookupKey::Mac(mac));
    }

    let info = match request.relay_agent_information() {
        Ok(Some(info)) => info,
        Ok(None) => return candidates,
        Err(e) => {
            debug!(
                "Ignoring relay agent info from {}: {}",
                request.format_mac(),
                e
            );
            return candidates;
        }
    };

    if let Some(subscriber_id) = info.subscriber_id() {
        candidates.push(LookupKey::SubscriberId(subscriber_id.to_string()));
    }
    if let Some(remote_id) = info.remote_id() {
        candidates.push(LookupKey::RemoteId(remote_id.to_vec()));
    }
    if let Some(circuit_id) = info.circuit_id() {
        candidates.push(LookupKey::CircuitId(circuit_id.to_vec()));
    }
    if let Some(typed) = info.typed_circuit_id() {
        candidates.push(LookupKey::CircuitId(typed.to_vec()));
    }

    candidates
}

/// Returns the lookup key of a DHCPv6 request, if a MAC can be recovered.
pub fn candidate6(request: &Dhcpv6Packet) -> Option<LookupKey> {
    request.extract_mac().map(LookupKey::Mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcpv6::{Duid, Message, MessageType as MessageType6};
    use crate::key::HardwareAddr;
    use crate::options::{DhcpOption, MessageType};

    const CLIENT_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn request_with_relay_info(info: &[u8]) -> DhcpPacket {
        let mut request =
            DhcpPacket::new_request(HardwareAddr::new(CLIENT_MAC), MessageType::Discover, 1);
        request.options.push(DhcpOption::RelayAgentInfo(info.to_vec()));
        request
    }

    #[test]
    fn test_mac_only() {
        let request =
            DhcpPacket::new_request(HardwareAddr::new(CLIENT_MAC), MessageType::Discover, 1);
        assert_eq!(
            candidates4(&request),
            vec![LookupKey::Mac(HardwareAddr::new(CLIENT_MAC))]
        );
    }

    #[test]
    fn test_full_precedence_order() {
        let request = request_with_relay_info(
            b"\x01\x07\x01\x05Nexus\x02\x03r-1\x06\x04sub1",
        );
        assert_eq!(
            candidates4(&request),
            vec![
                LookupKey::Mac(HardwareAddr::new(CLIENT_MAC)),
                LookupKey::SubscriberId("sub1".to_string()),
                LookupKey::RemoteId(b"r-1".to_vec()),
                LookupKey::CircuitId(b"\x01\x05Nexus".to_vec()),
                LookupKey::CircuitId(b"Nexus".to_vec()),
            ]
        );
    }

    #[test]
    fn test_malformed_relay_info_keeps_mac() {
        let request = request_with_relay_info(&[1, 9, b'x']);
        assert_eq!(
            candidates4(&request),
            vec![LookupKey::Mac(HardwareAddr::new(CLIENT_MAC))]
        );
    }

    #[test]
    fn test_non_ethernet_client_uses_relay_keys_only() {
        let mut request = request_with_relay_info(b"\x06\x04sub1");
        request.htype = 32;
        request.hlen = 0;
        assert_eq!(
            candidates4(&request),
            vec![LookupKey::SubscriberId("sub1".to_string())]
        );
    }

    #[test]
    fn test_candidate6_from_duid() {
        let mut message = Message::new(MessageType6::Solicit, [1, 2, 3]);
        message.options.push(crate::dhcpv6::Dhcpv6Option::ClientId(
            Duid::from_hardware_addr(HardwareAddr::new(CLIENT_MAC)),
        ));
        assert_eq!(
            candidate6(&Dhcpv6Packet::Message(message)),
            Some(LookupKey::Mac(HardwareAddr::new(CLIENT_MAC)))
        );

        let anonymous = Message::new(MessageType6::Solicit, [1, 2, 3]);
        assert_eq!(candidate6(&Dhcpv6Packet::Message(anonymous)), None);
    }
}
