//! Error types for the static lease engine.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. Line-level syntax problems are
//! described by [`ParseError`](crate::record::ParseError) and always reach
//! callers wrapped in [`Error::Parse`], so a single bad line rejects the
//! whole file.

use std::path::PathBuf;

use crate::key::LookupKey;
use crate::record::ParseError;

/// Errors that can occur while configuring or loading static leases.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error not tied to a lease file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid plugin configuration.
    ///
    /// Returned by [`Config::from_args`](crate::Config::from_args) and
    /// [`Config::validate`](crate::Config::validate), e.g. when no lease
    /// file path was given.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The lease file could not be opened or read.
    #[error("Cannot read lease file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of the lease file was rejected by the record parser.
    #[error("{}:{line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: ParseError,
    },

    /// The same identity is declared on two lines of one lease file.
    #[error("{}:{line}: duplicate lease for {key} (first declared on line {first_line})", path.display())]
    DuplicateKey {
        path: PathBuf,
        line: usize,
        first_line: usize,
        key: LookupKey,
    },

    /// Malformed DHCP packet or relay agent sub-option data.
    #[error("Invalid DHCP packet: {0}")]
    InvalidPacket(String),
}

/// A specialized Result type for static lease operations.
pub type Result<T> = std::result::Result<T, Error>;
