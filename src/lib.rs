//! # staticlease
//!
//! Static DHCP leases read from a text file, for DHCPv4 and DHCPv6.
//!
//! Each line of the lease file binds one client identity to an address:
//!
//! ```text
//! # MAC address, optional netmask and gateway (DHCPv4 only)
//! 00:11:22:33:44:55 192.0.2.100
//! 22:33:44:55:66:77 10.10.10.50,255.255.255.0,10.10.10.1
//!
//! # Relay agent identities (DHCPv4 option 82)
//! Subscriber-ID:"Test subscriber 1" 192.0.2.110
//! Circuit-ID:"circuit1" 192.0.2.111
//! Remote-ID:"remote1" 192.0.2.112
//! ```
//!
//! ## Features
//!
//! - Lookup by MAC, Subscriber-ID, Remote-ID or Circuit-ID
//! - Whole-file validation: one bad line rejects the file
//! - Lock-free-for-readers snapshot swap on reload
//! - Optional automatic reload when the file changes
//! - DHCPv4 and DHCPv6 packet codecs for binding responses
//!
//! ## Quick Start
//!
//! ```no_run
//! use staticlease::{Family, Plugin, StaticFile};
//!
//! #[tokio::main]
//! async fn main() -> staticlease::Result<()> {
//!     let plugin = StaticFile::setup(Family::V4, &["leases.txt", "autorefresh"]).await?;
//!     println!("{} leases", plugin.table().len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`parse_record`] - One lease line to a key and a [`LeaseConfig`]
//! - [`loader`] - Whole-file loading into a [`Snapshot`]
//! - [`LeaseTable`] - The snapshot currently served
//! - [`watcher`] - Reload on file change
//! - [`identity`] - Lookup keys from requests
//! - [`StaticFile`] - The [`Plugin`] binding leases into responses

pub mod config;
pub mod dhcpv6;
pub mod error;
pub mod identity;
pub mod key;
pub mod loader;
pub mod options;
pub mod packet;
pub mod plugin;
pub mod record;
pub mod relay;
pub mod table;
pub mod watcher;

pub use config::Config;
pub use dhcpv6::Dhcpv6Packet;
pub use error::{Error, Result};
pub use key::{HardwareAddr, LookupKey};
pub use options::{DhcpOption, MessageType};
pub use packet::DhcpPacket;
pub use plugin::{Flow, Plugin, StaticFile};
pub use record::{Family, LeaseConfig, ParseError, parse_record};
pub use relay::RelayAgentInfo;
pub use table::{LeaseTable, Snapshot, SnapshotError};
pub use watcher::{Fingerprint, ReloadEvent, WatchHandle, WatchOptions};
