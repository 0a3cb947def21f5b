//! DHCPv6 message parsing and encoding per RFC 8415.
//!
//! Only what the lease engine needs is modeled: client identity (the DUID
//! in Client ID and the Client Link-Layer Address that relays add) and the
//! IA_NA / IA Address options used to hand out an address. Everything
//! else survives as [`Dhcpv6Option::Unknown`].
//!
//! # Message Formats
//!
//! ```text
//! Client/server message:          Relay message:
//! +----------+----------------+   +----------+----------+
//! | type (1) | xid (3)        |   | type (1) | hops (1) |
//! +----------+----------------+   +----------+----------+
//! | options (variable)        |   | link-address (16)   |
//! +---------------------------+   | peer-address (16)   |
//!                                 | options (variable)  |
//!                                 +---------------------+
//! ```
//!
//! Options are `code (2) | length (2) | data`, big-endian.
//!
//! # References
//!
//! - RFC 8415: Dynamic Host Configuration Protocol for IPv6
//! - RFC 6939: Client Link-Layer Address Option in DHCPv6

use std::fmt;
use std::net::Ipv6Addr;

use crate::error::{Error, Result};
use crate::key::{HARDWARE_ADDR_LEN, HardwareAddr};

/// Maximum relay nesting accepted (RFC 8415 §7.6 HOP_COUNT_LIMIT).
const HOP_COUNT_LIMIT: usize = 32;

/// Maximum nesting of encapsulated options: the relay chain plus IA_NA and IAADDR.
const MAX_OPTION_DEPTH: usize = HOP_COUNT_LIMIT + 2;

const MESSAGE_HEADER_SIZE: usize = 4;
const RELAY_HEADER_SIZE: usize = 34;

const OPTION_CLIENT_ID: u16 = 1;
const OPTION_SERVER_ID: u16 = 2;
const OPTION_IA_NA: u16 = 3;
const OPTION_IA_ADDR: u16 = 5;
const OPTION_RELAY_MSG: u16 = 9;
const OPTION_CLIENT_LINKLAYER_ADDR: u16 = 79;

/// IANA hardware type for Ethernet.
const HARDWARE_TYPE_ETHERNET: u16 = 1;

/// DHCPv6 message types (RFC 8415 §7.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Solicit = 1,
    Advertise = 2,
    Request = 3,
    Confirm = 4,
    Renew = 5,
    Rebind = 6,
    Reply = 7,
    Release = 8,
    Decline = 9,
    Reconfigure = 10,
    InformationRequest = 11,
    RelayForw = 12,
    RelayRepl = 13,
}

impl MessageType {
    pub fn is_relay(&self) -> bool {
        matches!(self, Self::RelayForw | Self::RelayRepl)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Solicit),
            2 => Ok(Self::Advertise),
            3 => Ok(Self::Request),
            4 => Ok(Self::Confirm),
            5 => Ok(Self::Renew),
            6 => Ok(Self::Rebind),
            7 => Ok(Self::Reply),
            8 => Ok(Self::Release),
            9 => Ok(Self::Decline),
            10 => Ok(Self::Reconfigure),
            11 => Ok(Self::InformationRequest),
            12 => Ok(Self::RelayForw),
            13 => Ok(Self::RelayRepl),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Solicit => "SOLICIT",
            Self::Advertise => "ADVERTISE",
            Self::Request => "REQUEST",
            Self::Confirm => "CONFIRM",
            Self::Renew => "RENEW",
            Self::Rebind => "REBIND",
            Self::Reply => "REPLY",
            Self::Release => "RELEASE",
            Self::Decline => "DECLINE",
            Self::Reconfigure => "RECONFIGURE",
            Self::InformationRequest => "INFORMATION-REQUEST",
            Self::RelayForw => "RELAY-FORW",
            Self::RelayRepl => "RELAY-REPL",
        };
        f.write_str(name)
    }
}

/// A DHCP Unique Identifier (RFC 8415 §11).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Duid {
    /// Link-layer address plus time (type 1).
    LinkLayerTime {
        hardware_type: u16,
        time: u32,
        link_layer_address: Vec<u8>,
    },
    /// Vendor-assigned, based on enterprise number (type 2).
    Enterprise { enterprise_number: u32, identifier: Vec<u8> },
    /// Link-layer address (type 3).
    LinkLayer {
        hardware_type: u16,
        link_layer_address: Vec<u8>,
    },
    /// UUID-based (type 4, RFC 6355).
    Uuid([u8; 16]),
    /// A DUID type this crate does not interpret.
    Other { duid_type: u16, data: Vec<u8> },
}

impl Duid {
    /// Builds a DUID-LL for an Ethernet address.
    pub fn from_hardware_addr(hardware_addr: HardwareAddr) -> Self {
        Self::LinkLayer {
            hardware_type: HARDWARE_TYPE_ETHERNET,
            link_layer_address: hardware_addr.octets().to_vec(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let [t0, t1, rest @ ..] = data else {
            return Err(Error::InvalidPacket("DUID too short".to_string()));
        };
        let duid_type = u16::from_be_bytes([*t0, *t1]);

        match (duid_type, rest) {
            (1, [h0, h1, s0, s1, s2, s3, address @ ..]) => Ok(Self::LinkLayerTime {
                hardware_type: u16::from_be_bytes([*h0, *h1]),
                time: u32::from_be_bytes([*s0, *s1, *s2, *s3]),
                link_layer_address: address.to_vec(),
            }),
            (2, [e0, e1, e2, e3, identifier @ ..]) => Ok(Self::Enterprise {
                enterprise_number: u32::from_be_bytes([*e0, *e1, *e2, *e3]),
                identifier: identifier.to_vec(),
            }),
            (3, [h0, h1, address @ ..]) => Ok(Self::LinkLayer {
                hardware_type: u16::from_be_bytes([*h0, *h1]),
                link_layer_address: address.to_vec(),
            }),
            (4, uuid) => {
                let uuid: [u8; 16] = uuid.try_into().map_err(|_| {
                    Error::InvalidPacket(format!("DUID-UUID has {} bytes", uuid.len()))
                })?;
                Ok(Self::Uuid(uuid))
            }
            (1..=3, _) => Err(Error::InvalidPacket(format!(
                "DUID type {} truncated",
                duid_type
            ))),
            (_, data) => Ok(Self::Other {
                duid_type,
                data: data.to_vec(),
            }),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::LinkLayerTime {
                hardware_type,
                time,
                link_layer_address,
            } => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&hardware_type.to_be_bytes());
                out.extend_from_slice(&time.to_be_bytes());
                out.extend_from_slice(link_layer_address);
            }
            Self::Enterprise {
                enterprise_number,
                identifier,
            } => {
                out.extend_from_slice(&2u16.to_be_bytes());
                out.extend_from_slice(&enterprise_number.to_be_bytes());
                out.extend_from_slice(identifier);
            }
            Self::LinkLayer {
                hardware_type,
                link_layer_address,
            } => {
                out.extend_from_slice(&3u16.to_be_bytes());
                out.extend_from_slice(&hardware_type.to_be_bytes());
                out.extend_from_slice(link_layer_address);
            }
            Self::Uuid(uuid) => {
                out.extend_from_slice(&4u16.to_be_bytes());
                out.extend_from_slice(uuid);
            }
            Self::Other { duid_type, data } => {
                out.extend_from_slice(&duid_type.to_be_bytes());
                out.extend_from_slice(data);
            }
        }
        out
    }

    /// Returns the Ethernet address embedded in a DUID-LLT or DUID-LL.
    pub fn link_layer_address(&self) -> Option<HardwareAddr> {
        match self {
            Self::LinkLayerTime {
                hardware_type,
                link_layer_address,
                ..
            }
            | Self::LinkLayer {
                hardware_type,
                link_layer_address,
            } => ethernet_address(*hardware_type, link_layer_address),
            _ => None,
        }
    }
}

fn ethernet_address(hardware_type: u16, address: &[u8]) -> Option<HardwareAddr> {
    if hardware_type != HARDWARE_TYPE_ETHERNET || address.len() != HARDWARE_ADDR_LEN {
        return None;
    }
    HardwareAddr::from_slice(address)
}

/// An IA Address option (RFC 8415 §21.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaAddress {
    pub address: Ipv6Addr,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub options: Vec<Dhcpv6Option>,
}

impl IaAddress {
    pub fn new(address: Ipv6Addr, preferred_lifetime: u32, valid_lifetime: u32) -> Self {
        Self {
            address,
            preferred_lifetime,
            valid_lifetime,
            options: Vec::new(),
        }
    }
}

/// An Identity Association for Non-temporary Addresses (RFC 8415 §21.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaNa {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub options: Vec<Dhcpv6Option>,
}

impl IaNa {
    pub fn new(iaid: u32) -> Self {
        Self {
            iaid,
            t1: 0,
            t2: 0,
            options: Vec::new(),
        }
    }

    /// Iterates over the IA Address options inside this IA.
    pub fn addresses(&self) -> impl Iterator<Item = &IaAddress> {
        self.options.iter().filter_map(|opt| match opt {
            Dhcpv6Option::IaAddress(address) => Some(address),
            _ => None,
        })
    }

    /// Adds an address unless one with the same IPv6 address is present.
    pub fn add_address(&mut self, address: IaAddress) {
        if self.addresses().any(|existing| existing.address == address.address) {
            return;
        }
        self.options.push(Dhcpv6Option::IaAddress(address));
    }
}

/// A parsed DHCPv6 option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dhcpv6Option {
    ClientId(Duid),
    ServerId(Duid),
    IaNa(IaNa),
    IaAddress(IaAddress),
    /// A relayed message (option 9), present only in relay messages.
    RelayMessage(Box<Dhcpv6Packet>),
    /// Client Link-Layer Address (option 79), added by first-hop relays.
    ClientLinkLayerAddress {
        hardware_type: u16,
        address: Vec<u8>,
    },
    Unknown(u16, Vec<u8>),
}

impl Dhcpv6Option {
    pub fn code(&self) -> u16 {
        match self {
            Self::ClientId(_) => OPTION_CLIENT_ID,
            Self::ServerId(_) => OPTION_SERVER_ID,
            Self::IaNa(_) => OPTION_IA_NA,
            Self::IaAddress(_) => OPTION_IA_ADDR,
            Self::RelayMessage(_) => OPTION_RELAY_MSG,
            Self::ClientLinkLayerAddress { .. } => OPTION_CLIENT_LINKLAYER_ADDR,
            Self::Unknown(code, _) => *code,
        }
    }

    fn parse(code: u16, data: &[u8], depth: usize) -> Result<Self> {
        match code {
            OPTION_CLIENT_ID => Ok(Self::ClientId(Duid::parse(data)?)),
            OPTION_SERVER_ID => Ok(Self::ServerId(Duid::parse(data)?)),
            OPTION_IA_NA => {
                let [i0, i1, i2, i3, a0, a1, a2, a3, b0, b1, b2, b3, rest @ ..] = data else {
                    return Err(Error::InvalidPacket("IA_NA option truncated".to_string()));
                };
                Ok(Self::IaNa(IaNa {
                    iaid: u32::from_be_bytes([*i0, *i1, *i2, *i3]),
                    t1: u32::from_be_bytes([*a0, *a1, *a2, *a3]),
                    t2: u32::from_be_bytes([*b0, *b1, *b2, *b3]),
                    options: parse_options(rest, depth + 1)?,
                }))
            }
            OPTION_IA_ADDR => {
                if data.len() < 24 {
                    return Err(Error::InvalidPacket("IA Address option truncated".to_string()));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&data[..16]);
                Ok(Self::IaAddress(IaAddress {
                    address: Ipv6Addr::from(octets),
                    preferred_lifetime: read_u32(&data[16..20]),
                    valid_lifetime: read_u32(&data[20..24]),
                    options: parse_options(&data[24..], depth + 1)?,
                }))
            }
            OPTION_RELAY_MSG => Ok(Self::RelayMessage(Box::new(Dhcpv6Packet::parse_nested(
                data,
                depth + 1,
            )?))),
            OPTION_CLIENT_LINKLAYER_ADDR => {
                let [h0, h1, address @ ..] = data else {
                    return Err(Error::InvalidPacket(
                        "Client link-layer address option truncated".to_string(),
                    ));
                };
                Ok(Self::ClientLinkLayerAddress {
                    hardware_type: u16::from_be_bytes([*h0, *h1]),
                    address: address.to_vec(),
                })
            }
            other => Ok(Self::Unknown(other, data.to_vec())),
        }
    }

    fn encode_data(&self) -> Vec<u8> {
        match self {
            Self::ClientId(duid) | Self::ServerId(duid) => duid.encode(),
            Self::IaNa(ia) => {
                let mut data = Vec::with_capacity(12);
                data.extend_from_slice(&ia.iaid.to_be_bytes());
                data.extend_from_slice(&ia.t1.to_be_bytes());
                data.extend_from_slice(&ia.t2.to_be_bytes());
                encode_options(&ia.options, &mut data);
                data
            }
            Self::IaAddress(address) => {
                let mut data = Vec::with_capacity(24);
                data.extend_from_slice(&address.address.octets());
                data.extend_from_slice(&address.preferred_lifetime.to_be_bytes());
                data.extend_from_slice(&address.valid_lifetime.to_be_bytes());
                encode_options(&address.options, &mut data);
                data
            }
            Self::RelayMessage(packet) => packet.encode(),
            Self::ClientLinkLayerAddress {
                hardware_type,
                address,
            } => {
                let mut data = hardware_type.to_be_bytes().to_vec();
                data.extend_from_slice(address);
                data
            }
            Self::Unknown(_, data) => data.clone(),
        }
    }

    /// Encodes the option to its wire format (code + length + data).
    pub fn encode(&self) -> Vec<u8> {
        let data = self.encode_data();
        let len = data.len().min(u16::MAX as usize);
        let mut out = Vec::with_capacity(4 + len);
        out.extend_from_slice(&self.code().to_be_bytes());
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend_from_slice(&data[..len]);
        out
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

fn parse_options(data: &[u8], depth: usize) -> Result<Vec<Dhcpv6Option>> {
    if depth > MAX_OPTION_DEPTH {
        return Err(Error::InvalidPacket("DHCPv6 options nested too deeply".to_string()));
    }

    let mut options = Vec::new();
    let mut index = 0;

    while index < data.len() {
        if index + 4 > data.len() {
            return Err(Error::InvalidPacket("DHCPv6 option header truncated".to_string()));
        }
        let code = u16::from_be_bytes([data[index], data[index + 1]]);
        let length = u16::from_be_bytes([data[index + 2], data[index + 3]]) as usize;

        if index + 4 + length > data.len() {
            return Err(Error::InvalidPacket(format!(
                "DHCPv6 option {} data truncated",
                code
            )));
        }

        options.push(Dhcpv6Option::parse(
            code,
            &data[index + 4..index + 4 + length],
            depth,
        )?);
        index += 4 + length;
    }

    Ok(options)
}

fn encode_options(options: &[Dhcpv6Option], out: &mut Vec<u8>) {
    for option in options {
        out.extend_from_slice(&option.encode());
    }
}

/// A client/server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub transaction_id: [u8; 3],
    pub options: Vec<Dhcpv6Option>,
}

impl Message {
    pub fn new(message_type: MessageType, transaction_id: [u8; 3]) -> Self {
        Self {
            message_type,
            transaction_id,
            options: Vec::new(),
        }
    }

    /// Starts a response to `request`, copying its transaction id and
    /// Client ID.
    pub fn reply_to(request: &Message, message_type: MessageType) -> Self {
        let mut reply = Self::new(message_type, request.transaction_id);
        if let Some(client_id) = request.client_id() {
            reply.options.push(Dhcpv6Option::ClientId(client_id.clone()));
        }
        reply
    }

    pub fn client_id(&self) -> Option<&Duid> {
        self.options.iter().find_map(|opt| match opt {
            Dhcpv6Option::ClientId(duid) => Some(duid),
            _ => None,
        })
    }

    pub fn ia_nas(&self) -> impl Iterator<Item = &IaNa> {
        self.options.iter().filter_map(|opt| match opt {
            Dhcpv6Option::IaNa(ia) => Some(ia),
            _ => None,
        })
    }

    /// Returns the first IA_NA of the message.
    pub fn ia_na(&self) -> Option<&IaNa> {
        self.ia_nas().next()
    }

    pub fn ia_na_mut(&mut self, iaid: u32) -> Option<&mut IaNa> {
        self.options.iter_mut().find_map(|opt| match opt {
            Dhcpv6Option::IaNa(ia) if ia.iaid == iaid => Some(ia),
            _ => None,
        })
    }

    /// Adds `address` to the IA_NA with the given IAID, creating the IA
    /// when the message has none with that IAID.
    pub fn add_ia_address(&mut self, iaid: u32, address: IaAddress) {
        match self.ia_na_mut(iaid) {
            Some(ia) => ia.add_address(address),
            None => {
                let mut ia = IaNa::new(iaid);
                ia.add_address(address);
                self.options.push(Dhcpv6Option::IaNa(ia));
            }
        }
    }
}

/// A Relay-Forward or Relay-Reply message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub message_type: MessageType,
    pub hop_count: u8,
    pub link_address: Ipv6Addr,
    pub peer_address: Ipv6Addr,
    pub options: Vec<Dhcpv6Option>,
}

impl RelayMessage {
    /// Returns the encapsulated packet (option 9).
    pub fn relayed(&self) -> Option<&Dhcpv6Packet> {
        self.options.iter().find_map(|opt| match opt {
            Dhcpv6Option::RelayMessage(packet) => Some(packet.as_ref()),
            _ => None,
        })
    }

    fn relayed_mut(&mut self) -> Option<&mut Dhcpv6Packet> {
        self.options.iter_mut().find_map(|opt| match opt {
            Dhcpv6Option::RelayMessage(packet) => Some(packet.as_mut()),
            _ => None,
        })
    }

    /// Returns the Ethernet address from a Client Link-Layer Address option.
    pub fn client_link_layer_address(&self) -> Option<HardwareAddr> {
        self.options.iter().find_map(|opt| match opt {
            Dhcpv6Option::ClientLinkLayerAddress {
                hardware_type,
                address,
            } => ethernet_address(*hardware_type, address),
            _ => None,
        })
    }
}

/// A DHCPv6 packet: either a client/server message or a relay message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dhcpv6Packet {
    Message(Message),
    Relay(RelayMessage),
}

impl Dhcpv6Packet {
    /// Parses a DHCPv6 packet from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if:
    /// - The header is truncated or the message type is unknown
    /// - An option's length runs past its container
    /// - Relay messages are nested deeper than 32 levels
    /// - Options inside IA_NA or IA Address options nest past the relay limit
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_nested(data, 0)
    }

    fn parse_nested(data: &[u8], depth: usize) -> Result<Self> {
        if depth > HOP_COUNT_LIMIT {
            return Err(Error::InvalidPacket(
                "Relay messages nested too deeply".to_string(),
            ));
        }

        let Some(&first) = data.first() else {
            return Err(Error::InvalidPacket("Empty DHCPv6 packet".to_string()));
        };
        let message_type = MessageType::try_from(first).map_err(|value| {
            Error::InvalidPacket(format!("Unknown DHCPv6 message type: {}", value))
        })?;

        if message_type.is_relay() {
            if data.len() < RELAY_HEADER_SIZE {
                return Err(Error::InvalidPacket(format!(
                    "Relay message too short: {} bytes",
                    data.len()
                )));
            }
            let mut link = [0u8; 16];
            link.copy_from_slice(&data[2..18]);
            let mut peer = [0u8; 16];
            peer.copy_from_slice(&data[18..34]);

            Ok(Self::Relay(RelayMessage {
                message_type,
                hop_count: data[1],
                link_address: Ipv6Addr::from(link),
                peer_address: Ipv6Addr::from(peer),
                options: parse_options(&data[RELAY_HEADER_SIZE..], depth)?,
            }))
        } else {
            if data.len() < MESSAGE_HEADER_SIZE {
                return Err(Error::InvalidPacket(format!(
                    "DHCPv6 message too short: {} bytes",
                    data.len()
                )));
            }
            Ok(Self::Message(Message {
                message_type,
                transaction_id: [data[1], data[2], data[3]],
                options: parse_options(&data[MESSAGE_HEADER_SIZE..], depth)?,
            }))
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Message(message) => {
                out.push(message.message_type as u8);
                out.extend_from_slice(&message.transaction_id);
                encode_options(&message.options, &mut out);
            }
            Self::Relay(relay) => {
                out.push(relay.message_type as u8);
                out.push(relay.hop_count);
                out.extend_from_slice(&relay.link_address.octets());
                out.extend_from_slice(&relay.peer_address.octets());
                encode_options(&relay.options, &mut out);
            }
        }
        out
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Message(message) => message.message_type,
            Self::Relay(relay) => relay.message_type,
        }
    }

    pub fn is_relay(&self) -> bool {
        matches!(self, Self::Relay(_))
    }

    /// Returns the innermost client/server message, unwrapping relays.
    pub fn inner_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            Self::Relay(relay) => relay.relayed()?.inner_message(),
        }
    }

    pub fn inner_message_mut(&mut self) -> Option<&mut Message> {
        match self {
            Self::Message(message) => Some(message),
            Self::Relay(relay) => relay.relayed_mut()?.inner_message_mut(),
        }
    }

    /// Finds the client's Ethernet address.
    ///
    /// For relay messages, a Client Link-Layer Address option on the relay
    /// wins; otherwise the relayed packet is searched. For client messages
    /// the address comes from a DUID-LLT or DUID-LL Client ID.
    pub fn extract_mac(&self) -> Option<HardwareAddr> {
        match self {
            Self::Relay(relay) => relay
                .client_link_layer_address()
                .or_else(|| relay.relayed()?.extract_mac()),
            Self::Message(message) => message.client_id()?.link_layer_address(),
        }
    }
}
