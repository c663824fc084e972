//! Revision identifiers: a generation number paired with an opaque hash.

use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single document revision, written `"<gen>-<hash>"` on the wire.
///
/// The hash is an opaque token chosen by the writer; settee never computes
/// it. Ordering is componentwise with the generation first, so the derived
/// `Ord` is exactly the tie-breaking rule for conflicting leaves: higher
/// generation wins, and at equal generation the lexicographically greater
/// hash wins. Peers must agree on this bit-for-bit to pick identical
/// winners.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevId {
    pub num: u64,
    pub hash: String,
}

impl RevId {
    pub fn new(num: u64, hash: impl Into<String>) -> Self {
        Self { num, hash: hash.into() }
    }
}

impl fmt::Display for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.num, self.hash)
    }
}

impl FromStr for RevId {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, hash) = s
            .split_once('-')
            .ok_or_else(|| DbError::InvalidRevision(s.to_string()))?;
        let num: u64 = num
            .parse()
            .map_err(|_| DbError::InvalidRevision(s.to_string()))?;
        if num == 0 || hash.is_empty() {
            return Err(DbError::InvalidRevision(s.to_string()));
        }
        Ok(RevId { num, hash: hash.to_string() })
    }
}

impl TryFrom<String> for RevId {
    type Error = DbError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RevId> for String {
    fn from(rev: RevId) -> String {
        rev.to_string()
    }
}
