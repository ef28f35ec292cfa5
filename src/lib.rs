//! AVB Datastore - emulated audio interface parameter store
//!
//! Emulates the HTTP datastore of an AVB audio interface: a tree of mixer,
//! routing and label parameters that clients read, patch, and long-poll for
//! changes made by other clients.

pub mod api;
pub mod config;
pub mod datastore;

pub use datastore::{
    ClientId, FlatView, HierarchicalStore, Node, PollCoordinator, PollOutcome, Scalar, StoreError,
};
