//! Datastore module - versioned parameter tree with long-poll notification
//!
//! This module provides the emulated device datastore: a tree of mixer and
//! routing parameters addressed by slash-delimited paths, a version tag bumped
//! on every write, and the long-poll coordinator that tells clients when other
//! clients changed something they care about.

pub mod codec;
mod error;
mod poll;
mod seed;
mod store;
mod tag;
mod types;

pub use error::StoreError;
pub use poll::{PollCoordinator, PollOutcome, DEFAULT_WAIT_BUDGET};
pub use seed::{load_seed, node_from_json};
pub use store::HierarchicalStore;
pub use tag::{Revision, TagWatcher, VersionTag};
pub use types::{Branch, ClientId, FlatView, Node, Scalar};
