use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one logical client connection on one node.
///
/// Socket ids are assigned by the owning connection framework; this crate
/// treats them as opaque strings.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(String);

impl SocketId {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SocketId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SocketId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for SocketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of one cluster node, drawn at random once per process lifetime.
///
/// Filters a node's own messages out of the shared channel. Defense in depth:
/// the silent-mode guard, not this id, is what prevents re-publish loops.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
