//! The static-file lease plugin.
//!
//! [`StaticFile`] owns one [`LeaseTable`] (and optionally the watcher that
//! keeps it fresh) and answers requests through the [`Plugin`] trait:
//!
//! - `handle4` binds the leased address, netmask and gateway into the
//!   response and stops the chain, since a static lease is authoritative
//! - `handle6` adds the leased address to an IA_NA and always lets the
//!   chain continue
//!
//! A miss leaves the response untouched and continues the chain.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::Config;
use crate::dhcpv6::{Dhcpv6Packet, IaAddress, Message};
use crate::error::Result;
use crate::identity;
use crate::key::LookupKey;
use crate::loader;
use crate::packet::DhcpPacket;
use crate::record::{Family, LeaseConfig};
use crate::table::LeaseTable;
use crate::watcher::{self, Fingerprint, ReloadEvent, WatchHandle};

/// Preferred and valid lifetime of addresses handed out over DHCPv6.
pub const ADDRESS_LIFETIME_SECS: u32 = 3600;

/// What the host should do after a plugin handled a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Pass the response on to the next plugin.
    Continue,
    /// The response is final.
    Stop,
}

/// Request handling capabilities a host dispatcher calls into.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle4(&self, request: &DhcpPacket, response: &mut DhcpPacket) -> Flow;

    fn handle6(&self, request: &Dhcpv6Packet, response: &mut Dhcpv6Packet) -> Flow;
}

/// Serves leases from a static file.
#[derive(Debug)]
pub struct StaticFile {
    family: Family,
    table: Arc<LeaseTable>,
    watcher: Option<WatchHandle>,
}

impl StaticFile {
    /// Sets the plugin up from host arguments: `<path> [autorefresh]`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`](crate::Error::InvalidConfig) for bad arguments
    /// - any load error for the initial read of the file
    pub async fn setup<S: AsRef<str>>(family: Family, args: &[S]) -> Result<Self> {
        let config = Config::from_args(args)?;
        Self::from_config(family, &config).await
    }

    pub async fn from_config(family: Family, config: &Config) -> Result<Self> {
        config.validate()?;

        // Read before loading so an edit racing the load still counts as a change.
        let baseline = if config.autorefresh {
            Fingerprint::read(&config.path).await
        } else {
            None
        };

        let snapshot = loader::load(&config.path, family).await?;
        let table = Arc::new(LeaseTable::new(snapshot));

        let watcher = config.autorefresh.then(|| {
            watcher::spawn(
                config.path.clone(),
                family,
                Arc::clone(&table),
                baseline,
                config.watch_options(),
            )
        });

        info!(
            "{} static leases ready from {} (autorefresh: {})",
            family,
            config.path.display(),
            config.autorefresh
        );

        Ok(Self {
            family,
            table,
            watcher,
        })
    }

    /// Wraps an existing table without any file behind it.
    pub fn with_table(family: Family, table: Arc<LeaseTable>) -> Self {
        Self {
            family,
            table,
            watcher: None,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn table(&self) -> &Arc<LeaseTable> {
        &self.table
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Subscribes to reload outcomes. `None` without autorefresh.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ReloadEvent>> {
        self.watcher.as_ref().map(WatchHandle::subscribe)
    }

    /// Finds the lease for a DHCPv4 request and the identity that matched.
    pub fn lookup4(&self, request: &DhcpPacket) -> Option<(LookupKey, LeaseConfig)> {
        let candidates = identity::candidates4(request);
        let snapshot = self.table.snapshot();
        snapshot
            .find_first(&candidates)
            .map(|(key, lease)| (key.clone(), lease))
    }

    pub fn lookup6(&self, request: &Dhcpv6Packet) -> Option<(LookupKey, LeaseConfig)> {
        let key = identity::candidate6(request)?;
        let lease = self.table.lookup(&key)?;
        Some((key, lease))
    }
}

impl Plugin for StaticFile {
    fn name(&self) -> &'static str {
        "file"
    }

    fn handle4(&self, request: &DhcpPacket, response: &mut DhcpPacket) -> Flow {
        let Some((key, lease)) = self.lookup4(request) else {
            debug!("No static lease for {}", request.format_mac());
            return Flow::Continue;
        };
        let IpAddr::V4(address) = lease.address() else {
            debug!("Lease for {} is not IPv4", key);
            return Flow::Continue;
        };

        response.yiaddr = address;
        if let Some(netmask) = lease.netmask() {
            response.set_subnet_mask(netmask);
        }
        if let Some(gateway) = lease.gateway() {
            response.set_router(gateway);
        }

        info!("Bound {} to {} ({})", address, key, request.format_mac());
        Flow::Stop
    }

    fn handle6(&self, request: &Dhcpv6Packet, response: &mut Dhcpv6Packet) -> Flow {
        let Some((key, lease)) = self.lookup6(request) else {
            debug!("No static lease for {} request", request.message_type());
            return Flow::Continue;
        };
        let IpAddr::V6(address) = lease.address() else {
            debug!("Lease for {} is not IPv6", key);
            return Flow::Continue;
        };
        let Some(iaid) = request
            .inner_message()
            .and_then(Message::ia_na)
            .map(|ia| ia.iaid)
        else {
            debug!("Request from {} has no IA_NA to bind {} into", key, address);
            return Flow::Continue;
        };
        let Some(message) = response.inner_message_mut() else {
            return Flow::Continue;
        };

        message.add_ia_address(
            iaid,
            IaAddress::new(address, ADDRESS_LIFETIME_SECS, ADDRESS_LIFETIME_SECS),
        );
        info!("Bound {} to {} (IAID {:#010x})", address, key, iaid);
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcpv6::{Dhcpv6Option, Duid, IaNa, MessageType as MessageType6};
    use crate::key::HardwareAddr;
    use crate::options::{DhcpOption, MessageType};
    use crate::table::Snapshot;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const CLIENT_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn plugin(family: Family, records: Vec<(LookupKey, LeaseConfig)>) -> StaticFile {
        let snapshot = Snapshot::from_records(family, records).unwrap();
        StaticFile::with_table(family, Arc::new(LeaseTable::new(snapshot)))
    }

    fn mac_key() -> LookupKey {
        LookupKey::Mac(HardwareAddr::new(CLIENT_MAC))
    }

    fn discover_and_offer() -> (DhcpPacket, DhcpPacket) {
        let request =
            DhcpPacket::new_request(HardwareAddr::new(CLIENT_MAC), MessageType::Discover, 42);
        let response = DhcpPacket::create_reply(
            &request,
            MessageType::Offer,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(192, 0, 2, 254),
            vec![DhcpOption::Unknown(51, vec![0, 0, 14, 16])],
        );
        (request, response)
    }

    fn solicit_and_advertise(with_ia_na: bool) -> (Dhcpv6Packet, Dhcpv6Packet) {
        let mut solicit = Message::new(MessageType6::Solicit, [1, 2, 3]);
        solicit.options.push(Dhcpv6Option::ClientId(Duid::LinkLayerTime {
            hardware_type: 1,
            time: 0,
            link_layer_address: CLIENT_MAC.to_vec(),
        }));
        if with_ia_na {
            solicit.options.push(Dhcpv6Option::IaNa(IaNa::new(0x0102_0304)));
        }
        let advertise = Message::reply_to(&solicit, MessageType6::Advertise);
        (
            Dhcpv6Packet::Message(solicit),
            Dhcpv6Packet::Message(advertise),
        )
    }

    #[test]
    fn test_handle4_miss_leaves_response() {
        let plugin = plugin(Family::V4, vec![]);
        let (request, mut response) = discover_and_offer();
        let before = response.clone();

        assert_eq!(plugin.handle4(&request, &mut response), Flow::Continue);
        assert_eq!(response, before);
    }

    #[test]
    fn test_handle4_address_only() {
        let plugin = plugin(
            Family::V4,
            vec![(mac_key(), LeaseConfig::v4(Ipv4Addr::new(192, 0, 2, 100)))],
        );
        let (request, mut response) = discover_and_offer();

        assert_eq!(plugin.handle4(&request, &mut response), Flow::Stop);
        assert_eq!(response.yiaddr, Ipv4Addr::new(192, 0, 2, 100));
        assert_eq!(response.subnet_mask(), None);
        assert_eq!(response.routers(), None);
        assert_eq!(response.option(51), Some(&DhcpOption::Unknown(51, vec![0, 0, 14, 16])));
    }

    #[test]
    fn test_handle4_full_config() {
        let plugin = plugin(
            Family::V4,
            vec![(
                mac_key(),
                LeaseConfig::v4_with_gateway(
                    Ipv4Addr::new(10, 10, 10, 50),
                    Ipv4Addr::new(255, 255, 255, 0),
                    Ipv4Addr::new(10, 10, 10, 1),
                ),
            )],
        );
        let (request, mut response) = discover_and_offer();
        response.set_subnet_mask(Ipv4Addr::new(255, 0, 0, 0));

        assert_eq!(plugin.handle4(&request, &mut response), Flow::Stop);
        assert_eq!(response.yiaddr, Ipv4Addr::new(10, 10, 10, 50));
        assert_eq!(response.subnet_mask(), Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(response.routers(), Some(&[Ipv4Addr::new(10, 10, 10, 1)][..]));
        assert_eq!(
            response
                .options
                .iter()
                .filter(|opt| matches!(opt, DhcpOption::SubnetMask(_)))
                .count(),
            1
        );
    }

    #[test]
    fn test_handle4_relay_identity() {
        let plugin = plugin(
            Family::V4,
            vec![(
                LookupKey::SubscriberId("PORT1".to_string()),
                LeaseConfig::v4(Ipv4Addr::new(192, 0, 2, 7)),
            )],
        );
        let (mut request, mut response) = discover_and_offer();
        request
            .options
            .push(DhcpOption::RelayAgentInfo(b"\x06\x05PORT1".to_vec()));

        assert_eq!(plugin.handle4(&request, &mut response), Flow::Stop);
        assert_eq!(response.yiaddr, Ipv4Addr::new(192, 0, 2, 7));
    }

    #[test]
    fn test_handle4_mac_beats_relay_identity() {
        let plugin = plugin(
            Family::V4,
            vec![
                (mac_key(), LeaseConfig::v4(Ipv4Addr::new(192, 0, 2, 1))),
                (
                    LookupKey::CircuitId(b"Nexus".to_vec()),
                    LeaseConfig::v4(Ipv4Addr::new(192, 0, 2, 2)),
                ),
            ],
        );
        let (mut request, mut response) = discover_and_offer();
        request
            .options
            .push(DhcpOption::RelayAgentInfo(b"\x01\x07\x01\x05Nexus".to_vec()));

        let (key, _) = plugin.lookup4(&request).unwrap();
        assert_eq!(key, mac_key());
        plugin.handle4(&request, &mut response);
        assert_eq!(response.yiaddr, Ipv4Addr::new(192, 0, 2, 1));
    }

    #[test]
    fn test_handle6_miss() {
        let plugin = plugin(Family::V6, vec![]);
        let (request, mut response) = solicit_and_advertise(true);

        assert_eq!(plugin.handle6(&request, &mut response), Flow::Continue);
        assert_eq!(response.inner_message().unwrap().ia_nas().count(), 0);
    }

    #[test]
    fn test_handle6_match_adds_one_ia_na() {
        let address: Ipv6Addr = "2001:db8::10:1".parse().unwrap();
        let plugin = plugin(Family::V6, vec![(mac_key(), LeaseConfig::v6(address))]);
        let (request, mut response) = solicit_and_advertise(true);

        assert_eq!(plugin.handle6(&request, &mut response), Flow::Continue);

        let message = response.inner_message().unwrap();
        assert_eq!(message.ia_nas().count(), 1);
        let ia = message.ia_na().unwrap();
        assert_eq!(ia.iaid, 0x0102_0304);
        let bound: Vec<_> = ia.addresses().collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].address, address);
        assert_eq!(bound[0].preferred_lifetime, ADDRESS_LIFETIME_SECS);
        assert_eq!(bound[0].valid_lifetime, ADDRESS_LIFETIME_SECS);

        // Handling twice does not duplicate the binding.
        plugin.handle6(&request, &mut response);
        assert_eq!(
            response.inner_message().unwrap().ia_na().unwrap().addresses().count(),
            1
        );
    }

    #[test]
    fn test_handle6_without_ia_na_leaves_response() {
        let address: Ipv6Addr = "2001:db8::10:1".parse().unwrap();
        let plugin = plugin(Family::V6, vec![(mac_key(), LeaseConfig::v6(address))]);
        let (request, mut response) = solicit_and_advertise(false);
        let before = response.clone();

        assert_eq!(plugin.handle6(&request, &mut response), Flow::Continue);
        assert_eq!(response, before);
    }
}
