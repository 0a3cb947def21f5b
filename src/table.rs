//! In-memory lease table.
//!
//! A [`Snapshot`] is an immutable mapping from [`LookupKey`] to
//! [`LeaseConfig`], built once per load. The [`LeaseTable`] holds the
//! currently committed snapshot behind an `RwLock<Arc<_>>`:
//!
//! - readers take the read lock only long enough to clone the `Arc`, then
//!   look the key up on the snapshot without holding any lock
//! - [`LeaseTable::install`] takes the write lock only for the pointer swap
//!
//! Parsing never happens under the lock, so reload cost does not show up
//! as request latency. A reader sees either the old or the new snapshot,
//! never a mix of both.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::key::LookupKey;
use crate::record::{Family, LeaseConfig};

/// Why a set of records could not become a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("duplicate lease for {0}")]
    DuplicateKey(LookupKey),

    #[error("lease for {key} is not {family}")]
    WrongFamily { key: LookupKey, family: Family },
}

/// An immutable, fully loaded version of the lease table.
#[derive(Debug, Clone)]
pub struct Snapshot {
    family: Family,
    records: HashMap<LookupKey, LeaseConfig>,
    source: Option<PathBuf>,
    loaded_at: DateTime<Utc>,
    version: u64,
}

impl Snapshot {
    /// Creates an empty snapshot for the given family.
    pub fn empty(family: Family) -> Self {
        Self {
            family,
            records: HashMap::new(),
            source: None,
            loaded_at: Utc::now(),
            version: 0,
        }
    }

    /// Builds a snapshot from key/lease pairs.
    ///
    /// Fails on the first duplicated key or lease of the wrong family.
    pub fn from_records<I>(family: Family, records: I) -> Result<Self, SnapshotError>
    where
        I: IntoIterator<Item = (LookupKey, LeaseConfig)>,
    {
        let mut snapshot = Self::empty(family);
        for (key, config) in records {
            if config.family() != family {
                return Err(SnapshotError::WrongFamily { key, family });
            }
            match snapshot.records.entry(key) {
                Entry::Occupied(entry) => {
                    return Err(SnapshotError::DuplicateKey(entry.key().clone()));
                }
                Entry::Vacant(entry) => {
                    entry.insert(config);
                }
            }
        }
        Ok(snapshot)
    }

    /// Wraps records already validated by the record parser.
    pub(crate) fn from_parsed(family: Family, records: HashMap<LookupKey, LeaseConfig>) -> Self {
        Self {
            records,
            ..Self::empty(family)
        }
    }

    pub(crate) fn with_source(mut self, source: &Path) -> Self {
        self.source = Some(source.to_path_buf());
        self
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// The file this snapshot was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Install order of this snapshot; zero until installed.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &LookupKey) -> Option<&LeaseConfig> {
        self.records.get(key)
    }

    /// Tries each candidate in order and returns the first one with a lease.
    pub fn find_first<'a>(
        &self,
        candidates: &'a [LookupKey],
    ) -> Option<(&'a LookupKey, LeaseConfig)> {
        candidates
            .iter()
            .find_map(|key| self.records.get(key).map(|config| (key, *config)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LookupKey, &LeaseConfig)> {
        self.records.iter()
    }
}

/// The currently committed snapshot, shared between request handlers and
/// the reload path.
#[derive(Debug)]
pub struct LeaseTable {
    current: RwLock<Arc<Snapshot>>,
}

impl LeaseTable {
    /// Creates a table serving `snapshot` as version 1.
    pub fn new(mut snapshot: Snapshot) -> Self {
        snapshot.version = 1;
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Returns the snapshot visible right now.
    ///
    /// The returned handle stays valid, and unchanged, across later installs.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    pub fn lookup(&self, key: &LookupKey) -> Option<LeaseConfig> {
        self.snapshot().get(key).copied()
    }

    /// Atomically replaces the visible snapshot, returning its version.
    pub fn install(&self, mut snapshot: Snapshot) -> u64 {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.version = current.version + 1;
        let version = snapshot.version;
        *current = Arc::new(snapshot);
        version
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
