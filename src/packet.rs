//! DHCPv4 packet parsing and encoding per RFC 2131.
//!
//! A DHCP packet consists of a fixed 236-byte header followed by a 4-byte
//! magic cookie and variable-length options. The lease engine reads the
//! client hardware address and the relay agent option from requests, and
//! writes `yiaddr`, the subnet mask and the router option into responses.
//!
//! # Packet Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                          options (variable)                   |
//! +---------------------------------------------------------------+
//! ```
//!
//! # References
//!
//! - RFC 2131: Dynamic Host Configuration Protocol

use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::key::HardwareAddr;
use crate::options::{DhcpOption, MessageType, OptionCode, OverloadFlag};
use crate::relay::RelayAgentInfo;

/// DHCP magic cookie that identifies DHCP packets (vs BOOTP).
const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const DHCP_CHADDR_OFFSET: usize = 28;
const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_OFFSET: usize = DHCP_CHADDR_OFFSET + DHCP_CHADDR_SIZE;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_OFFSET: usize = DHCP_SNAME_OFFSET + DHCP_SNAME_SIZE;
const DHCP_FILE_SIZE: usize = 128;
const DHCP_MAGIC_COOKIE_OFFSET: usize = DHCP_FILE_OFFSET + DHCP_FILE_SIZE;

/// Size of the fixed header portion including magic cookie.
const DHCP_FIXED_HEADER_SIZE: usize = DHCP_MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// Minimum DHCP packet size per RFC 2131 §2.
///
/// DHCP requires packets to be at least 300 bytes for compatibility
/// with BOOTP relay agents.
const DHCP_MIN_PACKET_SIZE: usize = 300;

/// Initial capacity for packet encoding buffer.
///
/// 576 bytes is the minimum MTU that all hosts must accept per RFC 791.
const DHCP_ENCODE_CAPACITY: usize = 576;

/// Maximum hop count before dropping the packet.
///
/// Prevents infinite relay loops. Per RFC 2131 §4.1, relay agents
/// increment hops and should discard packets with excessive counts.
const MAX_HOPS: u8 = 16;

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet (most common).
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// A parsed DHCPv4 packet.
///
/// This struct represents both client requests and server replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPacket {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since client began address acquisition.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,

    /// Client IP address (set by client in RENEWING/REBINDING states).
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address - the address being assigned to the client.
    pub yiaddr: Ipv4Addr,

    /// Server IP address (next server in BOOTP, or DHCP server).
    pub siaddr: Ipv4Addr,

    /// Gateway IP address - set by relay agents.
    pub giaddr: Ipv4Addr,

    /// Client hardware address (MAC for Ethernet).
    pub chaddr: [u8; 16],

    /// Server host name (or option overflow area if Option 52 is set).
    pub sname: [u8; 64],

    /// Boot file name (or option overflow area if Option 52 is set).
    pub file: [u8; 128],

    /// DHCP options in packet order.
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    /// Creates a client request from an Ethernet hardware address.
    pub fn new_request(hardware_addr: HardwareAddr, message_type: MessageType, xid: u32) -> Self {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(&hardware_addr.octets());

        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: vec![DhcpOption::MessageType(message_type)],
        }
    }

    /// Parses a DHCP packet from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if:
    /// - Packet is shorter than 240 bytes (fixed header + magic cookie)
    /// - Magic cookie is invalid (not 99.130.83.99)
    /// - Hop count exceeds 16 (relay loop protection)
    /// - Hardware length doesn't match type (e.g., Ethernet must be 6)
    /// - Options are malformed (truncated length or data)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_FIXED_HEADER_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                DHCP_FIXED_HEADER_SIZE
            )));
        }

        let magic_cookie = &data[DHCP_MAGIC_COOKIE_OFFSET..DHCP_FIXED_HEADER_SIZE];
        if magic_cookie != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidPacket("Invalid magic cookie".to_string()));
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        if hops > MAX_HOPS {
            return Err(Error::InvalidPacket(format!(
                "Hop count {} exceeds maximum {}",
                hops, MAX_HOPS
            )));
        }

        if htype == HTYPE_ETHERNET && hlen != HLEN_ETHERNET {
            return Err(Error::InvalidPacket(format!(
                "Invalid hlen {} for Ethernet (expected {})",
                hlen, HLEN_ETHERNET
            )));
        }

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[DHCP_CHADDR_OFFSET..DHCP_SNAME_OFFSET]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[DHCP_SNAME_OFFSET..DHCP_FILE_OFFSET]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[DHCP_FILE_OFFSET..DHCP_MAGIC_COOKIE_OFFSET]);

        let mut options = Self::parse_options(&data[DHCP_FIXED_HEADER_SIZE..])?;

        let overload = options.iter().find_map(|opt| match opt {
            DhcpOption::OptionOverload(flag) => Some(*flag),
            _ => None,
        });

        if let Some(flag) = overload {
            if matches!(flag, OverloadFlag::File | OverloadFlag::Both) {
                options.extend(Self::parse_options(&file)?);
            }
            if matches!(flag, OverloadFlag::Sname | OverloadFlag::Both) {
                options.extend(Self::parse_options(&sname)?);
            }
        }

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::InvalidPacket("Option length missing".to_string()));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::InvalidPacket("Option data truncated".to_string()));
            }

            let option_data = &data[index + 2..index + 2 + length];
            options.push(DhcpOption::parse(code, option_data)?);

            index += 2 + length;
        }

        Ok(options)
    }

    /// Encodes the packet to bytes for transmission.
    ///
    /// The returned buffer is at least 300 bytes (padded per RFC 2131).
    /// Options are encoded in TLV format with an End marker.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(DHCP_ENCODE_CAPACITY);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            packet.extend_from_slice(&option.encode());
        }

        packet.push(OptionCode::End as u8);

        if packet.len() < DHCP_MIN_PACKET_SIZE {
            packet.resize(DHCP_MIN_PACKET_SIZE, 0);
        }

        packet
    }

    /// Returns the first option with the given code.
    pub fn option(&self, code: u8) -> Option<&DhcpOption> {
        self.options.iter().find(|opt| opt.option_code() == code)
    }

    /// Sets an option, replacing every existing option with the same code.
    ///
    /// A new option is appended; a replaced option keeps the position of
    /// the first one it replaces.
    pub fn set_option(&mut self, option: DhcpOption) {
        let code = option.option_code();
        match self.options.iter().position(|opt| opt.option_code() == code) {
            Some(position) => {
                self.options[position] = option;
                let mut index = 0;
                self.options.retain(|opt| {
                    let keep = index <= position || opt.option_code() != code;
                    index += 1;
                    keep
                });
            }
            None => self.options.push(option),
        }
    }

    /// Returns the DHCP message type (Option 53) if present.
    ///
    /// Returns `None` for BOOTP packets which don't have this option.
    pub fn message_type(&self) -> Option<MessageType> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::MessageType(t) => Some(*t),
            _ => None,
        })
    }

    /// Returns the subnet mask (Option 1) if present.
    pub fn subnet_mask(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::SubnetMask(mask) => Some(*mask),
            _ => None,
        })
    }

    /// Returns the router addresses (Option 3) if present.
    pub fn routers(&self) -> Option<&[Ipv4Addr]> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::Router(routers) => Some(routers.as_slice()),
            _ => None,
        })
    }

    pub fn set_subnet_mask(&mut self, netmask: Ipv4Addr) {
        self.set_option(DhcpOption::SubnetMask(netmask));
    }

    pub fn set_router(&mut self, router: Ipv4Addr) {
        self.set_option(DhcpOption::Router(vec![router]));
    }

    /// Returns the raw relay agent information (Option 82) if present.
    pub fn relay_agent_info(&self) -> Option<&[u8]> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::RelayAgentInfo(info) => Some(info.as_slice()),
            _ => None,
        })
    }

    /// Decodes the relay agent sub-options, if Option 82 is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if the sub-options are malformed.
    pub fn relay_agent_information(&self) -> Result<Option<RelayAgentInfo>> {
        self.relay_agent_info()
            .map(RelayAgentInfo::parse)
            .transpose()
    }

    /// Returns the client hardware address bytes (respecting hlen).
    pub fn chaddr_bytes(&self) -> &[u8] {
        let len = (self.hlen as usize).min(self.chaddr.len());
        &self.chaddr[..len]
    }

    /// Returns the client's Ethernet address.
    ///
    /// Returns `None` unless the hardware type is Ethernet with a 6-byte
    /// address.
    pub fn hardware_addr(&self) -> Option<HardwareAddr> {
        if self.htype != HTYPE_ETHERNET || self.hlen != HLEN_ETHERNET {
            return None;
        }
        HardwareAddr::from_slice(self.chaddr_bytes())
    }

    /// Formats the client hardware address as a colon-separated string.
    pub fn format_mac(&self) -> String {
        self.chaddr_bytes()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Creates a reply skeleton for a request.
    ///
    /// The message type is added as the first option. The following fields
    /// are copied from the request: `xid`, `flags`, `giaddr`, `chaddr`,
    /// `htype` and `hlen`. The relay agent option is echoed back as
    /// RFC 3046 §2.2 requires.
    pub fn create_reply(
        request: &DhcpPacket,
        message_type: MessageType,
        your_ip: Ipv4Addr,
        server_ip: Ipv4Addr,
        options: Vec<DhcpOption>,
    ) -> Self {
        let mut all_options = vec![DhcpOption::MessageType(message_type)];
        all_options.extend(options);
        if let Some(relay_info) = request.relay_agent_info() {
            all_options.push(DhcpOption::RelayAgentInfo(relay_info.to_vec()));
        }

        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: your_ip,
            siaddr: server_ip,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: all_options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

    fn create_test_packet(message_type: MessageType, extra_options: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];

        packet[0] = BOOTREQUEST;
        packet[1] = HTYPE_ETHERNET;
        packet[2] = HLEN_ETHERNET;
        packet[4..8].copy_from_slice(&0x12345678u32.to_be_bytes());
        packet[10..12].copy_from_slice(&0x8000u16.to_be_bytes());
        packet[28..34].copy_from_slice(&CLIENT_MAC);
        packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

        packet.extend_from_slice(&[OptionCode::MessageType as u8, 1, message_type as u8]);
        packet.extend_from_slice(extra_options);
        packet.push(OptionCode::End as u8);
        packet
    }

    #[test]
    fn test_parse_and_roundtrip() {
        let data = create_test_packet(MessageType::Discover, &[]);
        let packet = DhcpPacket::parse(&data).unwrap();

        assert_eq!(packet.op, BOOTREQUEST);
        assert_eq!(packet.xid, 0x12345678);
        assert_eq!(packet.message_type(), Some(MessageType::Discover));
        assert_eq!(packet.format_mac(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(packet.hardware_addr(), Some(HardwareAddr::new(CLIENT_MAC)));

        let reparsed = DhcpPacket::parse(&packet.encode()).unwrap();
        assert_eq!(reparsed, packet);
    }

    #[test]
    fn test_relay_agent_information_from_capture() {
        // Option 82 with Remote-ID and Subscriber-ID "PORT1", followed by End.
        let data = create_test_packet(
            MessageType::Discover,
            b"\x52\x15\x02\x0c\x02\x0a\x00\x00\x0a\xff\xc6\x01\x11\x00\x00\x00\x06\x05\x50\x4f\x52\x54\x31",
        );
        let packet = DhcpPacket::parse(&data).unwrap();

        let info = packet.relay_agent_information().unwrap().unwrap();
        assert_eq!(info.subscriber_id(), Some("PORT1"));
        assert_eq!(
            info.remote_id(),
            Some(&b"\x02\x0a\x00\x00\x0a\xff\xc6\x01\x11\x00\x00\x00"[..])
        );
    }

    #[test]
    fn test_no_relay_agent_information() {
        let packet = DhcpPacket::parse(&create_test_packet(MessageType::Request, &[])).unwrap();
        assert_eq!(packet.relay_agent_information().unwrap(), None);
    }

    #[test]
    fn test_malformed_relay_sub_options_reported() {
        let packet =
            DhcpPacket::parse(&create_test_packet(MessageType::Request, &[82, 3, 1, 9, b'x']))
                .unwrap();
        assert!(packet.relay_agent_information().is_err());
    }

    #[test]
    fn test_hardware_addr_requires_ethernet() {
        let mut packet = DhcpPacket::new_request(
            HardwareAddr::new(CLIENT_MAC),
            MessageType::Discover,
            1,
        );
        assert_eq!(packet.hardware_addr(), Some(HardwareAddr::new(CLIENT_MAC)));

        packet.htype = 6;
        assert_eq!(packet.hardware_addr(), None);

        packet.htype = HTYPE_ETHERNET;
        packet.hlen = 4;
        assert_eq!(packet.hardware_addr(), None);
        assert_eq!(packet.chaddr_bytes(), &CLIENT_MAC[..4]);
    }

    #[test]
    fn test_set_option_replaces_existing() {
        let mut packet = DhcpPacket::new_request(
            HardwareAddr::new(CLIENT_MAC),
            MessageType::Discover,
            1,
        );
        packet.options.push(DhcpOption::Unknown(12, b"host".to_vec()));
        packet.options.push(DhcpOption::SubnetMask(Ipv4Addr::new(255, 0, 0, 0)));
        packet.options.push(DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 0, 0)));

        packet.set_subnet_mask(Ipv4Addr::new(255, 255, 255, 0));
        packet.set_router(Ipv4Addr::new(192, 0, 2, 1));

        assert_eq!(packet.subnet_mask(), Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(packet.routers(), Some(&[Ipv4Addr::new(192, 0, 2, 1)][..]));
        assert_eq!(
            packet.options,
            vec![
                DhcpOption::MessageType(MessageType::Discover),
                DhcpOption::Unknown(12, b"host".to_vec()),
                DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)),
                DhcpOption::Router(vec![Ipv4Addr::new(192, 0, 2, 1)]),
            ]
        );
    }

    #[test]
    fn test_create_reply_echoes_relay_info() {
        let data = create_test_packet(MessageType::Discover, &[82, 4, 1, 2, b'p', b'1']);
        let request = DhcpPacket::parse(&data).unwrap();

        let offer = DhcpPacket::create_reply(
            &request,
            MessageType::Offer,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(192, 0, 2, 254),
            vec![],
        );

        assert_eq!(offer.op, BOOTREPLY);
        assert_eq!(offer.xid, request.xid);
        assert_eq!(offer.chaddr, request.chaddr);
        assert_eq!(offer.flags, request.flags);
        assert_eq!(offer.message_type(), Some(MessageType::Offer));
        assert_eq!(offer.relay_agent_info(), Some(&[1, 2, b'p', b'1'][..]));
    }

    #[test]
    fn test_invalid_packets() {
        assert!(DhcpPacket::parse(&[0u8; 100]).is_err());
        assert!(DhcpPacket::parse(&[0u8; 239]).is_err());

        let mut bad_cookie = [0u8; 300];
        bad_cookie[236..240].copy_from_slice(&[0, 0, 0, 0]);
        assert!(DhcpPacket::parse(&bad_cookie).is_err());
    }

    #[test]
    fn test_hops_limit() {
        let mut packet = create_test_packet(MessageType::Discover, &[]);
        packet[3] = 17;
        assert!(DhcpPacket::parse(&packet).is_err());

        packet[3] = 16;
        assert!(DhcpPacket::parse(&packet).is_ok());
    }

    #[test]
    fn test_option_overload_file() {
        let mut packet = create_test_packet(MessageType::Discover, &[52, 1, 1]);
        packet[DHCP_FILE_OFFSET..DHCP_FILE_OFFSET + 4].copy_from_slice(&[82, 2, 6, 0]);
        packet[DHCP_FILE_OFFSET + 4] = OptionCode::End as u8;

        let parsed = DhcpPacket::parse(&packet).unwrap();
        assert_eq!(parsed.relay_agent_info(), Some(&[6, 0][..]));
    }

    #[test]
    fn test_min_packet_size_on_encode() {
        let packet = DhcpPacket::new_request(
            HardwareAddr::new(CLIENT_MAC),
            MessageType::Request,
            7,
        );
        assert_eq!(packet.encode().len(), DHCP_MIN_PACKET_SIZE);
    }
}
