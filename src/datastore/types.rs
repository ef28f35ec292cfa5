//! Datastore type definitions
//!
//! Defines the tree nodes, scalar values and client identities stored in the datastore.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Children of a branch node, keyed by path segment
pub type Branch = BTreeMap<String, Node>;

/// Flat mapping of slash-joined paths to scalar values
pub type FlatView = BTreeMap<String, Scalar>;

/// Scalar value held by a leaf: integer, float, or text
///
/// Deserializes from any JSON scalar. Booleans become `Int(0)`/`Int(1)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Signed 64-bit integer (mutes, indices, enums)
    Int(i64),
    /// 64-bit float (faders, pans, sends)
    Float(f64),
    /// Text value (channel names, labels)
    Text(String),
}

impl Scalar {
    /// Apply type inference to untyped input.
    ///
    /// Text is re-parsed as an integer or float when possible. Values that already
    /// carry a numeric type pass through untouched, so `0.0` stays a float.
    pub fn coerced(self) -> Self {
        match self {
            Scalar::Text(raw) => super::codec::coerce_scalar(&raw),
            typed => typed,
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number, string or boolean")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Scalar, E> {
        Ok(Scalar::Int(i64::from(value)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Scalar, E> {
        Ok(Scalar::Int(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Scalar, E> {
        Ok(i64::try_from(value).map_or(Scalar::Float(value as f64), Scalar::Int))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Scalar, E> {
        Ok(Scalar::Float(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Scalar, E> {
        Ok(Scalar::Text(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Scalar, E> {
        Ok(Scalar::Text(value))
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(v) => write!(f, "{:?}", v),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A node of the datastore tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    /// Named children
    Branch(Branch),
    /// A single parameter value
    Leaf(Scalar),
}

impl Node {
    /// An empty branch
    pub fn empty_branch() -> Self {
        Node::Branch(Branch::new())
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Node::Branch(_))
    }

    /// Turn this node into a branch, dropping any leaf value, and return its children
    pub(crate) fn make_branch(&mut self) -> &mut Branch {
        if let Node::Leaf(_) = self {
            *self = Node::empty_branch();
        }
        match self {
            Node::Branch(children) => children,
            Node::Leaf(_) => unreachable!("leaf was replaced by a branch"),
        }
    }
}

impl From<Scalar> for Node {
    fn from(value: Scalar) -> Self {
        Node::Leaf(value)
    }
}

impl From<Branch> for Node {
    fn from(children: Branch) -> Self {
        Node::Branch(children)
    }
}

/// Opaque identity of a datastore client, used to attribute writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
