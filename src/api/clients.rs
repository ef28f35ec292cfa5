//! Known-client bookkeeping
//!
//! Clients identify themselves with a `client=<n>` query argument. Identities
//! are opaque to the datastore; the registry only notes first contact.

use crate::datastore::ClientId;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::info;

/// Set of client identifiers seen so far
///
/// Entries are never evicted, so the set grows for the life of the process.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    known: Mutex<HashSet<ClientId>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a raw `client` argument into an identity.
    ///
    /// Absent or negative values (clients send `-1`) mean anonymous.
    pub fn identify(&self, raw: Option<i64>) -> Option<ClientId> {
        let id = ClientId(u64::try_from(raw?).ok()?);
        let mut known = self.known.lock();
        if known.insert(id) {
            info!("New client {} ({} known)", id, known.len());
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify() {
        let registry = ClientRegistry::new();

        assert_eq!(registry.identify(None), None);
        assert_eq!(registry.identify(Some(-1)), None);
        assert!(registry.known.lock().is_empty());

        assert_eq!(registry.identify(Some(1001)), Some(ClientId(1001)));
        assert_eq!(registry.identify(Some(1001)), Some(ClientId(1001)));
        assert_eq!(registry.identify(Some(7)), Some(ClientId(7)));
        assert_eq!(registry.known.lock().len(), 2);
    }
}
