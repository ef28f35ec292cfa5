//! Version tag - monotonically increasing change counter with writer identity
//!
//! Every completed write publishes a new [`Revision`] through a watch channel.
//! The channel is the single exclusive section for reading and incrementing the
//! counter, and doubles as the wake-all broadcast for long-poll waiters: each
//! receiver tracks the last version it observed, so a publish that happens
//! between subscribing and waiting is never missed.

use super::codec;
use super::types::{Branch, ClientId, FlatView};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// The state published by one write
#[derive(Debug, Clone, Default)]
pub struct Revision {
    /// Tag value after the write (0 before any write)
    pub tag: u64,
    /// Client that performed this write, if it identified itself
    pub writer: Option<ClientId>,
    /// Most recent identified writer, carried across anonymous writes
    pub last_writer: Option<ClientId>,
    /// Tree fragment merged by this write
    pub diff: Arc<Branch>,
}

impl Revision {
    /// Flat view of this revision's diff at `path`
    pub fn read_diff(&self, path: &str) -> FlatView {
        codec::view(&self.diff, path)
    }
}

/// Version tag shared by the datastore and its pollers
#[derive(Debug)]
pub struct VersionTag {
    tx: watch::Sender<Arc<Revision>>,
}

impl VersionTag {
    /// Create a tag starting at 0 with no writer
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Revision::default()));
        Self { tx }
    }

    /// Current tag value
    pub fn read_value(&self) -> u64 {
        self.tx.borrow().tag
    }

    /// Most recent identified writer
    pub fn read_last_writer(&self) -> Option<ClientId> {
        self.tx.borrow().last_writer
    }

    /// Latest published revision
    pub fn current(&self) -> Arc<Revision> {
        self.tx.borrow().clone()
    }

    /// Increment the tag, record the writer and wake every waiter.
    ///
    /// Returns the new tag value.
    pub fn increment(&self, writer: Option<ClientId>, diff: Arc<Branch>) -> u64 {
        let mut tag = 0;
        self.tx.send_modify(|current| {
            tag = current.tag + 1;
            *current = Arc::new(Revision {
                tag,
                writer,
                last_writer: writer.or(current.last_writer),
                diff,
            });
        });

        debug!(
            "New tag value: {}, set by {:?} ({} waiters)",
            tag,
            writer,
            self.tx.receiver_count()
        );
        tag
    }

    /// Register a waiter. The current revision counts as already observed.
    pub fn subscribe(&self) -> TagWatcher {
        TagWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for VersionTag {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered waiter on the version tag
pub struct TagWatcher {
    rx: watch::Receiver<Arc<Revision>>,
}

impl TagWatcher {
    /// Latest revision, marking it as observed
    pub fn current(&mut self) -> Arc<Revision> {
        self.rx.borrow_and_update().clone()
    }

    /// Wait up to `budget` for a revision newer than the last observed one.
    ///
    /// Returns true when woken by a publish, false when the budget elapsed.
    pub async fn wait(&mut self, budget: Duration) -> bool {
        matches!(
            tokio::time::timeout(budget, self.rx.changed()).await,
            Ok(Ok(()))
        )
    }
}
