//! Connection identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a live client connection.
///
/// Allocated by the registry from a monotonically increasing counter and
/// never reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        ConnectionId(value)
    }
}
