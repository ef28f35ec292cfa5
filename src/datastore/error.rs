//! Datastore error types

/// Errors raised for malformed datastore input
///
/// Reads never fail; unknown paths read as empty views. These errors only
/// cover payloads that cannot be expressed as a tree at all.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("cannot store a single value at the datastore root")]
    LeafAtRoot,

    #[error("datastore seed must be an object at the root")]
    SeedNotBranch,

    #[error("unsupported {kind} value at '{path}'")]
    UnsupportedValue { path: String, kind: &'static str },
}
