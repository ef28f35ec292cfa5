//! Datastore seeding from JSON
//!
//! Lets the datastore start from a captured device state, e.g. a JSON dump
//! of a real interface's datastore.

use super::error::StoreError;
use super::store::HierarchicalStore;
use super::types::{Branch, Node, Scalar};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Convert a JSON document into a datastore node.
///
/// Objects become branches, integers stay integers, other numbers become
/// floats and booleans become 0/1. Arrays and nulls have no datastore
/// representation and are rejected.
pub fn node_from_json(value: Value) -> Result<Node, StoreError> {
    convert(value, "")
}

fn convert(value: Value, path: &str) -> Result<Node, StoreError> {
    let unsupported = |kind| StoreError::UnsupportedValue {
        path: path.to_string(),
        kind,
    };

    match value {
        Value::Object(map) => {
            let mut children = Branch::new();
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}/{}", path, key)
                };
                children.insert(key, convert(child, &child_path)?);
            }
            Ok(Node::Branch(children))
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Node::Leaf(Scalar::Int(i))),
            None => n
                .as_f64()
                .map(|f| Node::Leaf(Scalar::Float(f)))
                .ok_or_else(|| unsupported("number")),
        },
        Value::String(s) => Ok(Node::Leaf(Scalar::Text(s))),
        Value::Bool(b) => Ok(Node::Leaf(Scalar::Int(i64::from(b)))),
        Value::Array(_) => Err(unsupported("array")),
        Value::Null => Err(unsupported("null")),
    }
}

/// Load a datastore seed tree from a JSON file
pub async fn load_seed(path: impl AsRef<Path>) -> Result<Node> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read datastore file: {}", path.display()))?;

    let value: Value = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse datastore JSON: {}", path.display()))?;

    let node = node_from_json(value)
        .with_context(|| format!("Invalid datastore contents: {}", path.display()))?;

    Ok(node)
}

impl HierarchicalStore {
    /// Build a datastore from a JSON seed file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = Self::with_tree(load_seed(path).await?)
            .with_context(|| format!("Invalid datastore contents: {}", path.display()))?;

        info!("Loaded datastore state from file {}", path.display());
        Ok(store)
    }
}
