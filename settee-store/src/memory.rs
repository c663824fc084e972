//! The synchronous in-memory store.
//!
//! Three maps: `by_id` holds one [`DocumentRecord`] per document id,
//! `by_seq` maps each live sequence number back to its id (at most one
//! entry per id; a rewrite removes the old sequence before claiming a new
//! one), and `local` is the plain key/value side table for `_local/` ids.
//! Everything here is non-suspending; the async facade lives in
//! [`crate::db`].

use crate::revtree::{Branch, RevisionTree};
use settee_model::{is_local_id, Change, DbError, DocBody, Document, Missing, RevId, RevsSpec, Uuid};
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

const DEFAULT_REVS_LIMIT: usize = 1000;

/// Per-id entry: the revision tree, the cached winner index, and the
/// sequence assigned at the most recent write.
#[derive(Debug, Clone)]
struct DocumentRecord {
    tree: RevisionTree,
    winner_idx: usize,
    last_seq: u64,
}

/// A minimal in-memory CouchDB-compatible store.
///
/// Only leaf documents are kept (the store continuously auto-compacts), so
/// revisions are conflict bookkeeping, not a history mechanism. Writing
/// acts like `_bulk_docs` with `new_edits=false`: callers supply their own
/// revisions.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    id: String,
    update_seq: u64,
    revs_limit: usize,
    by_id: BTreeMap<String, DocumentRecord>,
    by_seq: BTreeMap<u64, String>,
    local: BTreeMap<String, DocBody>,
}

impl MemoryStore {
    /// A store with a random identity. For a volatile in-memory database a
    /// random uuid is a perfectly good identity.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string())
    }

    /// A store with a caller-chosen identity, for stable replication ids.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into() + "memory",
            update_seq: 0,
            revs_limit: DEFAULT_REVS_LIMIT,
            by_id: BTreeMap::new(),
            by_seq: BTreeMap::new(),
            local: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update_seq(&self) -> u64 {
        self.update_seq
    }

    pub fn revs_limit(&self) -> usize {
        self.revs_limit
    }

    /// The limit must stay at least 1; anything lower is a caller bug.
    pub fn set_revs_limit(&mut self, limit: usize) {
        assert!(limit >= 1, "revs_limit must be at least 1");
        self.revs_limit = limit;
    }

    /// Insert one document. Local ids go to the key/value side table
    /// (a tombstone removes the entry, silently if absent); everything else
    /// is merged into the id's revision tree and assigned a fresh sequence.
    pub fn write(&mut self, doc: Document) -> Result<(), DbError> {
        if doc.is_local() {
            match doc.body {
                Some(body) => {
                    self.local.insert(doc.id, body);
                }
                None => {
                    self.local.remove(&doc.id);
                }
            }
            return Ok(());
        }

        // wire-supplied revisions are validated here, per document, so a
        // bad input surfaces on the write error stream instead of tearing
        // down a whole pipeline
        if doc.rev_num == 0 || doc.path.is_empty() || doc.rev_num < doc.path.len() as u64 {
            return Err(DbError::InvalidRevision(format!(
                "{}: bad revision path {}-{:?}",
                doc.id, doc.rev_num, doc.path
            )));
        }

        let Document { id, rev_num, path, body } = doc;
        let mut tree = match self.by_id.remove(&id) {
            Some(record) => {
                // drop the superseded change-log entry first
                self.by_seq.remove(&record.last_seq);
                record.tree
            }
            None => RevisionTree::new(),
        };

        tree.merge_with_path(rev_num, &path, body, self.revs_limit);
        let winner_idx = tree.winner_idx();

        self.update_seq += 1;
        self.by_id.insert(
            id.clone(),
            DocumentRecord { tree, winner_idx, last_seq: self.update_seq },
        );
        self.by_seq.insert(self.update_seq, id);
        Ok(())
    }

    /// The documents selected by `revs`, or `NotFound` for an unknown id.
    ///
    /// Explicitly requested revisions that are absent from the tree yield
    /// nothing (only the id itself can be missing); duplicates collapse.
    /// A local id has exactly one, fixed revision, so every `revs` selector
    /// resolves to it. With `include_path` each document carries its full
    /// known ancestor path, otherwise just the leaf.
    pub fn read(
        &self,
        id: &str,
        revs: &RevsSpec,
        include_path: bool,
    ) -> Result<Vec<Document>, DbError> {
        if is_local_id(id) {
            let body = self
                .local
                .get(id)
                .ok_or_else(|| DbError::NotFound(id.to_string()))?;
            return Ok(vec![Document::local(id, Some(body.clone()))]);
        }

        let record = self
            .by_id
            .get(id)
            .ok_or_else(|| DbError::NotFound(id.to_string()))?;

        let docs = match revs {
            RevsSpec::Winner => {
                vec![doc_from_branch(id, record.tree.branch(record.winner_idx), include_path)]
            }
            RevsSpec::All => record
                .tree
                .branches()
                .map(|b| doc_from_branch(id, b, include_path))
                .collect(),
            RevsSpec::These(revs) => {
                let mut seen = HashSet::new();
                let mut docs = Vec::new();
                for rev in revs {
                    if !seen.insert(rev) {
                        continue;
                    }
                    for branch in record.tree.find(rev) {
                        docs.push(doc_from_branch(id, branch, include_path));
                    }
                }
                docs
            }
        };
        Ok(docs)
    }

    /// Change entries for every sequence strictly greater than `since`, in
    /// ascending order.
    pub fn changes(&self, since: Option<u64>) -> impl Iterator<Item = Change> + '_ {
        let start = match since {
            Some(seq) => Bound::Excluded(seq),
            None => Bound::Unbounded,
        };
        self.by_seq
            .range((start, Bound::Unbounded))
            .map(|(seq, id)| self.build_change(id, *seq))
    }

    /// The first change after `since`, if any. The change feed pulls these
    /// one at a time so it never holds results it has not been asked for.
    pub fn next_change(&self, since: Option<u64>) -> Option<Change> {
        self.changes(since).next()
    }

    fn build_change(&self, id: &str, seq: u64) -> Change {
        let record = self.by_id.get(id).expect("by_seq references a missing record");
        Change {
            id: id.to_string(),
            seq,
            deleted: record.tree.branch(record.winner_idx).is_deleted(),
            leaf_revs: record.tree.branches().map(Branch::leaf_rev).collect(),
        }
    }

    /// The subset of `revs` absent from the document's tree. An unknown id
    /// is missing everything.
    pub fn revs_diff(&self, id: &str, revs: Vec<RevId>) -> Missing {
        let missing = match self.by_id.get(id) {
            Some(record) => {
                let in_tree: HashSet<RevId> = record
                    .tree
                    .all_revs()
                    .filter_map(|(b, n)| b.rev(n))
                    .collect();
                revs.into_iter().filter(|r| !in_tree.contains(r)).collect()
            }
            None => revs.into_iter().collect(),
        };
        Missing { id: id.to_string(), missing }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn doc_from_branch(id: &str, branch: &Branch, include_path: bool) -> Document {
    let path = if include_path {
        branch.path.clone()
    } else {
        vec![branch.path[0].clone()]
    };
    Document {
        id: id.to_string(),
        rev_num: branch.leaf_rev_num,
        path,
        body: branch.doc.clone(),
    }
}
