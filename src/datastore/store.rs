//! HierarchicalStore - the datastore tree with versioned merge writes
//!
//! Holds the parameter tree and the diff of the most recent write. A write
//! merges, records its diff and bumps the version tag under a single lock, so
//! the tag a poller observes always belongs to the diff it reads.

use super::codec;
use super::error::StoreError;
use super::tag::{Revision, TagWatcher, VersionTag};
use super::types::{Branch, ClientId, FlatView, Node};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

struct Inner {
    /// Current datastore tree
    tree: Branch,
    /// Fragment merged by the most recent write
    last_update: Arc<Branch>,
}

/// The emulated device datastore
pub struct HierarchicalStore {
    inner: RwLock<Inner>,
    tag: VersionTag,
}

impl HierarchicalStore {
    /// Create an empty datastore
    pub fn new() -> Self {
        Self::from_branch(Branch::new())
    }

    /// Create a datastore seeded with `tree`, which must be a branch
    pub fn with_tree(tree: Node) -> Result<Self, StoreError> {
        match tree {
            Node::Branch(children) => Ok(Self::from_branch(children)),
            Node::Leaf(_) => Err(StoreError::SeedNotBranch),
        }
    }

    /// Create a datastore seeded with the children of the root
    pub fn from_branch(tree: Branch) -> Self {
        Self {
            inner: RwLock::new(Inner {
                tree,
                last_update: Arc::default(),
            }),
            tag: VersionTag::new(),
        }
    }

    /// Read the values at `path`. An empty path reads the whole datastore.
    pub fn read(&self, path: &str) -> FlatView {
        codec::view(&self.inner.read().tree, path)
    }

    /// Read the values at `path` together with the tag they belong to
    pub fn read_versioned(&self, path: &str) -> (u64, FlatView) {
        let inner = self.inner.read();
        (self.tag.read_value(), codec::view(&inner.tree, path))
    }

    /// Read the most recent write's diff at `path`
    pub fn read_last_update(&self, path: &str) -> FlatView {
        codec::view(&self.inner.read().last_update, path)
    }

    /// Merge `values` under `base_path` and return the new tag.
    ///
    /// String values are coerced to numbers where possible. The merge, the
    /// diff replacement and the tag increment happen in one critical section.
    pub fn write(
        &self,
        base_path: &str,
        values: &FlatView,
        writer: Option<ClientId>,
    ) -> Result<u64, StoreError> {
        let fragment = codec::expand(values, base_path)?;
        let diff = Arc::new(fragment.clone());

        let tag = {
            let mut inner = self.inner.write();
            codec::merge(&mut inner.tree, fragment);
            inner.last_update = Arc::clone(&diff);
            self.tag.increment(writer, diff)
        };

        info!(
            "{}: Updated datastore at '{}' ({} values), tag {}",
            display_client(writer),
            base_path,
            values.len(),
            tag
        );
        Ok(tag)
    }

    /// Current tag value
    pub fn tag(&self) -> u64 {
        self.tag.read_value()
    }

    /// Most recent identified writer
    pub fn last_writer(&self) -> Option<ClientId> {
        self.tag.read_last_writer()
    }

    /// Latest published revision
    pub fn revision(&self) -> Arc<Revision> {
        self.tag.current()
    }

    /// Register a waiter for future writes
    pub fn subscribe(&self) -> TagWatcher {
        self.tag.subscribe()
    }
}

impl Default for HierarchicalStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn display_client(client: Option<ClientId>) -> String {
    client.map_or_else(|| "anonymous".to_string(), |id| id.to_string())
}
