//! Primary key value type.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Opaque record identifier.
///
/// Backends report keys as decimal text; `FromStr` is the decode path.
/// The inner value is public so adapters can carry keys natively.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PrimaryKey(pub i64);

impl FromStr for PrimaryKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PrimaryKey)
    }
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        PrimaryKey(v)
    }
}

impl From<PrimaryKey> for i64 {
    fn from(k: PrimaryKey) -> Self {
        k.0
    }
}

/// Keys compare directly against plain integers.
impl PartialEq<i64> for PrimaryKey {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<PrimaryKey> for i64 {
    fn eq(&self, other: &PrimaryKey) -> bool {
        *self == other.0
    }
}
