//! Lease file record parsing.
//!
//! Each significant line of a lease file binds one client identity to an
//! address, optionally followed by a subnet mask and a gateway:
//!
//! ```text
//! aa:bb:cc:dd:ee:ff            192.0.2.10
//! aa:bb:cc:dd:ee:ff            192.0.2.10,255.255.255.0,192.0.2.1
//! Subscriber-ID:"my line"      192.0.2.11
//! Circuit-ID:"port1"           192.0.2.12,255.255.255.0
//! Remote-ID:"agent1"           192.0.2.13,255.255.255.0
//! ```
//!
//! Quoted identifiers may contain whitespace; `\"` and `\\` are the only
//! escape sequences. Blank lines and lines starting with `#` are skipped by
//! the [loader](crate::loader), not by [`parse_record`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::key::{HardwareAddr, LookupKey};

const SUBSCRIBER_ID_PREFIX: &str = "Subscriber-ID:";
const CIRCUIT_ID_PREFIX: &str = "Circuit-ID:";
const REMOTE_ID_PREFIX: &str = "Remote-ID:";

/// Maximum number of comma-separated tokens in the value field.
const MAX_VALUE_TOKENS: usize = 3;

/// Address family a lease file is loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Returns true if `address` belongs to this family.
    pub fn matches(&self, address: &IpAddr) -> bool {
        matches!(
            (self, address),
            (Self::V4, IpAddr::V4(_)) | (Self::V6, IpAddr::V6(_))
        )
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// Addressing information bound to a client identity.
///
/// A gateway is only ever present together with a netmask, and neither is
/// present for IPv6 leases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseConfig {
    address: IpAddr,
    netmask: Option<Ipv4Addr>,
    gateway: Option<Ipv4Addr>,
}

impl LeaseConfig {
    pub fn v4(address: Ipv4Addr) -> Self {
        Self {
            address: IpAddr::V4(address),
            netmask: None,
            gateway: None,
        }
    }

    pub fn v4_with_netmask(address: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            netmask: Some(netmask),
            ..Self::v4(address)
        }
    }

    pub fn v4_with_gateway(address: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            gateway: Some(gateway),
            ..Self::v4_with_netmask(address, netmask)
        }
    }

    pub fn v6(address: Ipv6Addr) -> Self {
        Self {
            address: IpAddr::V6(address),
            netmask: None,
            gateway: None,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn netmask(&self) -> Option<Ipv4Addr> {
        self.netmask
    }

    pub fn gateway(&self) -> Option<Ipv4Addr> {
        self.gateway
    }

    pub fn family(&self) -> Family {
        match self.address {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl fmt::Display for LeaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if let Some(netmask) = self.netmask {
            write!(f, ",{}", netmask)?;
        }
        if let Some(gateway) = self.gateway {
            write!(f, ",{}", gateway)?;
        }
        Ok(())
    }
}

/// Reasons a single lease line is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected an identity and an address separated by whitespace")]
    MissingField,

    #[error("unexpected extra field {0:?}")]
    UnexpectedField(String),

    #[error("more than one identity on a single line")]
    MultipleIdentities,

    #[error("quoted identifier must start with '\"'")]
    MissingQuote,

    #[error("quoted identifier is missing its closing quote")]
    UnterminatedQuote,

    #[error("unsupported escape sequence '\\{0}' in quoted identifier")]
    InvalidEscape(char),

    #[error("quoted identifier is empty")]
    EmptyIdentifier,

    #[error("expected whitespace after quoted identifier")]
    MissingSeparator,

    #[error("invalid hardware address {0:?}")]
    InvalidHardwareAddr(String),

    #[error("{0} identities are not supported for IPv6 leases")]
    UnsupportedIdentity(&'static str),

    #[error("too many comma-separated values (at most address,netmask,gateway)")]
    TooManyValues,

    #[error("empty {0} field")]
    EmptyField(&'static str),

    #[error("invalid IP address {0:?}")]
    InvalidAddress(String),

    #[error("address {address} is not an {expected} address")]
    WrongFamily { address: IpAddr, expected: Family },

    #[error("the unspecified address cannot be leased")]
    UnspecifiedAddress,

    #[error("netmask and gateway are only supported for IPv4 leases")]
    Ipv4OnlyField,

    #[error("invalid netmask {0:?}")]
    InvalidNetmask(String),

    #[error("netmask {0} does not have contiguous leading bits set")]
    NonContiguousNetmask(Ipv4Addr),

    #[error("gateway specified without a netmask")]
    GatewayWithoutNetmask,

    #[error("invalid gateway {0:?}")]
    InvalidGateway(String),
}

/// Parses one non-blank, non-comment lease line for the given family.
pub fn parse_record(line: &str, family: Family) -> Result<(LookupKey, LeaseConfig), ParseError> {
    let (key, rest) = parse_key(line.trim())?;

    if family == Family::V6 && !matches!(key, LookupKey::Mac(_)) {
        return Err(ParseError::UnsupportedIdentity(key.kind()));
    }

    let mut fields = rest.split_whitespace();
    let value = fields.next().ok_or(ParseError::MissingField)?;
    if starts_with_identity(value) {
        return Err(ParseError::MultipleIdentities);
    }
    if let Some(extra) = fields.next() {
        return Err(ParseError::UnexpectedField(extra.to_string()));
    }

    let config = parse_value(value, family)?;
    Ok((key, config))
}

fn starts_with_identity(field: &str) -> bool {
    [SUBSCRIBER_ID_PREFIX, CIRCUIT_ID_PREFIX, REMOTE_ID_PREFIX]
        .iter()
        .any(|prefix| field.starts_with(prefix))
        || field.parse::<HardwareAddr>().is_ok()
}

/// Splits the identity off the front of a line, returning the remainder.
fn parse_key(line: &str) -> Result<(LookupKey, &str), ParseError> {
    if let Some(quoted) = line.strip_prefix(SUBSCRIBER_ID_PREFIX) {
        let (id, rest) = parse_quoted(quoted)?;
        return Ok((LookupKey::SubscriberId(id), rest));
    }
    if let Some(quoted) = line.strip_prefix(CIRCUIT_ID_PREFIX) {
        let (id, rest) = parse_quoted(quoted)?;
        return Ok((LookupKey::CircuitId(id.into_bytes()), rest));
    }
    if let Some(quoted) = line.strip_prefix(REMOTE_ID_PREFIX) {
        let (id, rest) = parse_quoted(quoted)?;
        return Ok((LookupKey::RemoteId(id.into_bytes()), rest));
    }

    let (mac, rest) = line
        .split_once(char::is_whitespace)
        .ok_or(ParseError::MissingField)?;
    let addr = mac
        .parse::<HardwareAddr>()
        .map_err(|_| ParseError::InvalidHardwareAddr(mac.to_string()))?;
    Ok((LookupKey::Mac(addr), rest))
}

/// Decodes a `"..."` identifier, returning its text and whatever follows it.
fn parse_quoted(text: &str) -> Result<(String, &str), ParseError> {
    let body = text.strip_prefix('"').ok_or(ParseError::MissingQuote)?;
    let mut value = String::new();
    let mut chars = body.char_indices();

    while let Some((index, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, escaped @ ('"' | '\\'))) => value.push(escaped),
                Some((_, other)) => return Err(ParseError::InvalidEscape(other)),
                None => return Err(ParseError::UnterminatedQuote),
            },
            '"' => {
                if value.is_empty() {
                    return Err(ParseError::EmptyIdentifier);
                }
                let rest = &body[index + 1..];
                if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                    return Err(ParseError::MissingSeparator);
                }
                return Ok((value, rest));
            }
            other => value.push(other),
        }
    }

    Err(ParseError::UnterminatedQuote)
}

fn parse_value(value: &str, family: Family) -> Result<LeaseConfig, ParseError> {
    let tokens: Vec<&str> = value.split(',').collect();
    if tokens.len() > MAX_VALUE_TOKENS {
        return Err(ParseError::TooManyValues);
    }

    let address_text = tokens[0];
    if address_text.is_empty() {
        return Err(ParseError::EmptyField("address"));
    }
    let address: IpAddr = address_text
        .parse()
        .map_err(|_| ParseError::InvalidAddress(address_text.to_string()))?;
    if !family.matches(&address) {
        return Err(ParseError::WrongFamily {
            address,
            expected: family,
        });
    }
    if address.is_unspecified() {
        return Err(ParseError::UnspecifiedAddress);
    }

    let address = match address {
        IpAddr::V6(address) => {
            if tokens.len() > 1 {
                return Err(ParseError::Ipv4OnlyField);
            }
            return Ok(LeaseConfig::v6(address));
        }
        IpAddr::V4(address) => address,
    };

    match tokens[1..] {
        [] => Ok(LeaseConfig::v4(address)),
        [netmask] => Ok(LeaseConfig::v4_with_netmask(address, parse_netmask(netmask)?)),
        ["", gateway] if !gateway.is_empty() => Err(ParseError::GatewayWithoutNetmask),
        [netmask, gateway] => {
            let netmask = parse_netmask(netmask)?;
            if gateway.is_empty() {
                return Err(ParseError::EmptyField("gateway"));
            }
            let gateway: Ipv4Addr = gateway
                .parse()
                .map_err(|_| ParseError::InvalidGateway(gateway.to_string()))?;
            Ok(LeaseConfig::v4_with_gateway(address, netmask, gateway))
        }
        _ => Err(ParseError::TooManyValues),
    }
}

fn parse_netmask(text: &str) -> Result<Ipv4Addr, ParseError> {
    if text.is_empty() {
        return Err(ParseError::EmptyField("netmask"));
    }
    let netmask: Ipv4Addr = text
        .parse()
        .map_err(|_| ParseError::InvalidNetmask(text.to_string()))?;
    if !is_contiguous_netmask(netmask) {
        return Err(ParseError::NonContiguousNetmask(netmask));
    }
    Ok(netmask)
}

/// A valid mask is a run of one bits from the most significant bit followed
/// only by zero bits. `0.0.0.0` qualifies.
pub fn is_contiguous_netmask(netmask: Ipv4Addr) -> bool {
    let bits = u32::from(netmask);
    bits.leading_ones() + bits.trailing_zeros() == 32
}
