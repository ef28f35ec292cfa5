//! PollCoordinator - long-poll change notification
//!
//! A client that already holds the current tag waits until another client
//! changes something under its path of interest, or until the wait budget is
//! spent. Wakeups caused by the client's own writes, or by writes elsewhere in
//! the tree, are filtered out without extending the total wait.
//!
//! Only the latest diff is kept: if several writes land while a poller is
//! busy, it reports the newest one. This is a change signal, not a change log.

use super::store::{display_client, HierarchicalStore};
use super::types::{ClientId, FlatView};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default long-poll wait budget
pub const DEFAULT_WAIT_BUDGET: Duration = Duration::from_secs(15);

/// Result of a read/poll request
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// New data: a full read, or the diff of the write that woke the poller
    Fresh { tag: u64, body: FlatView },
    /// Nothing relevant changed within the wait budget
    NotModified { tag: u64 },
}

impl PollOutcome {
    /// Tag the caller should present on its next poll
    pub fn tag(&self) -> u64 {
        match self {
            PollOutcome::Fresh { tag, .. } | PollOutcome::NotModified { tag } => *tag,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, PollOutcome::Fresh { .. })
    }
}

/// Answers read/poll requests against a shared datastore
pub struct PollCoordinator {
    store: Arc<HierarchicalStore>,
    /// Wait budget in milliseconds, adjustable at runtime
    max_wait_ms: AtomicU64,
}

impl PollCoordinator {
    /// Create a coordinator with the default 15 second budget
    pub fn new(store: Arc<HierarchicalStore>) -> Self {
        Self::with_max_wait(store, DEFAULT_WAIT_BUDGET)
    }

    pub fn with_max_wait(store: Arc<HierarchicalStore>, max_wait: Duration) -> Self {
        Self {
            store,
            max_wait_ms: AtomicU64::new(duration_ms(max_wait)),
        }
    }

    /// Current wait budget
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.load(Ordering::Relaxed))
    }

    /// Change the wait budget for polls that start after this call
    pub fn set_max_wait(&self, max_wait: Duration) {
        self.max_wait_ms
            .store(duration_ms(max_wait), Ordering::Relaxed);
    }

    pub fn store(&self) -> &Arc<HierarchicalStore> {
        &self.store
    }

    /// Read `path`, long-polling when the caller is already up to date.
    ///
    /// * `caller_tag` - tag from the caller's previous response, if any
    /// * `caller` - identity whose own writes should not end the wait
    pub async fn poll(
        &self,
        path: &str,
        caller_tag: Option<u64>,
        caller: Option<ClientId>,
    ) -> PollOutcome {
        // Subscribe before comparing, so a write racing this check still wakes us.
        let mut watcher = self.store.subscribe();
        let server_tag = watcher.current().tag;

        if caller_tag != Some(server_tag) {
            let (tag, body) = self.store.read_versioned(path);
            return PollOutcome::Fresh { tag, body };
        }

        debug!(
            "{}: tags match ({}), long poll waiting for updates",
            display_client(caller),
            server_tag
        );

        let max_wait = self.max_wait();
        let loop_start = Instant::now();

        loop {
            let remaining = max_wait.saturating_sub(loop_start.elapsed());
            if remaining.is_zero() || !watcher.wait(remaining).await {
                debug!("{}: timed out waiting for update", display_client(caller));
                break;
            }

            let revision = watcher.current();

            if caller.is_some() && revision.writer == caller {
                debug!(
                    "{}: ignoring own update (tag {}), remaining time {:?}",
                    display_client(caller),
                    revision.tag,
                    max_wait.saturating_sub(loop_start.elapsed())
                );
                continue;
            }

            let diff = revision.read_diff(path);
            if diff.is_empty() {
                debug!(
                    "{}: update by {} (tag {}) does not touch '{}'",
                    display_client(caller),
                    display_client(revision.writer),
                    revision.tag,
                    path
                );
                continue;
            }

            debug!(
                "{}: new data received after update by {}",
                display_client(caller),
                display_client(revision.writer)
            );
            return PollOutcome::Fresh {
                tag: revision.tag,
                body: diff,
            };
        }

        PollOutcome::NotModified {
            tag: self.store.tag(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
