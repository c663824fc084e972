//! Change-feed rows and revs-diff results.

use crate::revision::RevId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One row of the changes feed.
///
/// `leaf_revs` lists the leaf revision of every branch in the document's
/// tree, highest `(generation, hash)` first. `deleted` reflects the winning
/// branch only: a document with live conflicts is not deleted even if some
/// leaves are tombstones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub seq: u64,
    pub deleted: bool,
    pub leaf_revs: Vec<RevId>,
}

/// Answer to a revs-diff query: the requested revisions the database does
/// not have, anywhere in the document's tree. Set semantics; duplicates in
/// the request collapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Missing {
    pub id: String,
    pub missing: HashSet<RevId>,
}
