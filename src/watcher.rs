//! Automatic reload of a lease file.
//!
//! Two tasks cooperate:
//!
//! - the poller checks the file's fingerprint (length, modification time
//!   and, on unix, inode) every poll interval and signals on a bounded
//!   channel of capacity one, so a burst of changes collapses into a single
//!   pending signal
//! - the loader waits out the settle delay, drains pending signals, loads
//!   the file and installs the new snapshot
//!
//! A failed load leaves the installed snapshot in place. Every outcome is
//! published as a [`ReloadEvent`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::loader;
use crate::record::Family;
use crate::table::LeaseTable;

const EVENT_CAPACITY: usize = 16;

/// Timing of the reload pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet time after a change before the file is read.
    pub settle_delay: Duration,
    /// How often the file's fingerprint is checked.
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Outcome of one reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// A new snapshot is now visible to lookups.
    Installed { version: u64, records: usize },
    /// The file was rejected; the previous snapshot is still served.
    Rejected { error: String },
}

/// Keeps the reload tasks alive. Dropping it stops them.
#[derive(Debug)]
pub struct WatchHandle {
    path: PathBuf,
    poller: JoinHandle<()>,
    loader: JoinHandle<()>,
    events: broadcast::Sender<ReloadEvent>,
}

impl WatchHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribes to reload outcomes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.poller.abort();
        self.loader.abort();
        debug!("Stopped watching {}", self.path.display());
    }
}

/// What the poller compares between ticks to notice a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
    inode: u64,
}

impl Fingerprint {
    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            metadata.ino()
        };
        #[cfg(not(unix))]
        let inode = 0;

        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
            inode,
        }
    }

    /// Reads the fingerprint of `path`, or `None` if it cannot be stat'ed.
    pub async fn read(path: &Path) -> Option<Self> {
        tokio::fs::metadata(path)
            .await
            .ok()
            .map(|metadata| Self::from_metadata(&metadata))
    }
}

/// Starts watching `path`, installing every good version into `table`.
///
/// `baseline` is the fingerprint read before `table`'s current snapshot was
/// loaded. Any later difference triggers a reload, including a change made
/// while that load was running. Must be called from within a Tokio runtime.
pub fn spawn(
    path: PathBuf,
    family: Family,
    table: Arc<LeaseTable>,
    baseline: Option<Fingerprint>,
    options: WatchOptions,
) -> WatchHandle {
    let (signal_tx, signal_rx) = mpsc::channel(1);
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    let poller = tokio::spawn(poll(path.clone(), baseline, options.poll_interval, signal_tx));
    let loader = tokio::spawn(reload(
        path.clone(),
        family,
        table,
        options.settle_delay,
        signal_rx,
        events.clone(),
    ));

    info!(
        "Watching {} for changes (poll {:?}, settle {:?})",
        path.display(),
        options.poll_interval,
        options.settle_delay
    );

    WatchHandle {
        path,
        poller,
        loader,
        events,
    }
}

async fn poll(
    path: PathBuf,
    mut last: Option<Fingerprint>,
    interval: Duration,
    signal: mpsc::Sender<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let current = Fingerprint::read(&path).await;
        if current == last {
            continue;
        }
        last = current;

        if current.is_none() {
            warn!("{} is gone; keeping current leases", path.display());
            continue;
        }

        debug!("{} changed", path.display());
        if let Err(mpsc::error::TrySendError::Closed(())) = signal.try_send(()) {
            break;
        }
    }
}

async fn reload(
    path: PathBuf,
    family: Family,
    table: Arc<LeaseTable>,
    settle_delay: Duration,
    mut signal: mpsc::Receiver<()>,
    events: broadcast::Sender<ReloadEvent>,
) {
    while signal.recv().await.is_some() {
        tokio::time::sleep(settle_delay).await;
        while signal.try_recv().is_ok() {}

        let event = match loader::load(&path, family).await {
            Ok(snapshot) => {
                let records = snapshot.len();
                let version = table.install(snapshot);
                info!(
                    "Reloaded {}: {} lease(s), version {}",
                    path.display(),
                    records,
                    version
                );
                ReloadEvent::Installed { version, records }
            }
            Err(e) => {
                error!("Reload failed, keeping current leases: {}", e);
                ReloadEvent::Rejected {
                    error: e.to_string(),
                }
            }
        };

        // Nobody listening is fine.
        let _ = events.send(event);
    }
}
