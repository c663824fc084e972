//! Per-document revision trees.
//!
//! A tree like
//!
//! ```text
//! '3-a' -> '4-b'
//!
//! '1-c' -> '2-e' -> '3-f'
//!       -> '2-d'
//! ```
//!
//! is stored as one [`Branch`] per leaf, each carrying the leaf's revision
//! number, its known ancestor hashes (leaf first) and the leaf document.
//! Branches are kept sorted ascending by `(leaf_rev_num, path[0])`, so the
//! winner scan and the descending iteration both come straight off the
//! vector.

use settee_model::{DocBody, RevId};

/// One leaf of a revision tree plus its ancestor chain.
///
/// `path[i]` is the hash at generation `leaf_rev_num - i`. Revision pruning
/// may have truncated the tail, so the earliest known ancestor need not be
/// generation 1. A `None` doc is a tombstone.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub leaf_rev_num: u64,
    pub path: Vec<String>,
    pub doc: Option<DocBody>,
}

impl Branch {
    pub fn new<I, S>(leaf_rev_num: u64, path: I, doc: Option<DocBody>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            leaf_rev_num,
            path: path.into_iter().map(Into::into).collect(),
            doc,
        }
    }

    /// Convert a revision number to an index into `path`, if that
    /// generation is covered by this branch.
    pub fn index(&self, rev_num: u64) -> Option<usize> {
        let i = usize::try_from(self.leaf_rev_num.checked_sub(rev_num)?).ok()?;
        (i < self.path.len()).then_some(i)
    }

    /// The revision of this branch at the given generation, if known.
    pub fn rev(&self, rev_num: u64) -> Option<RevId> {
        self.index(rev_num)
            .map(|i| RevId::new(rev_num, self.path[i].clone()))
    }

    pub fn leaf_rev(&self) -> RevId {
        RevId::new(self.leaf_rev_num, self.path[0].clone())
    }

    pub fn is_deleted(&self) -> bool {
        self.doc.is_none()
    }

    fn sort_key(&self) -> (u64, &str) {
        (self.leaf_rev_num, self.path[0].as_str())
    }
}

/// All known revisions of one document, as a sorted set of branches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevisionTree {
    branches: Vec<Branch>,
}

impl RevisionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from branches already sorted ascending by
    /// `(leaf_rev_num, path[0])`.
    pub fn from_branches(branches: Vec<Branch>) -> Self {
        debug_assert!(branches.windows(2).all(|w| w[0].sort_key() < w[1].sort_key()));
        Self { branches }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn branch(&self, idx: usize) -> &Branch {
        &self.branches[idx]
    }

    /// All branches, highest `(leaf_rev_num, path[0])` first.
    pub fn branches(&self) -> impl DoubleEndedIterator<Item = &Branch> {
        self.branches.iter().rev()
    }

    /// Every branch whose path contains the given revision, in descending
    /// branch order. Interior revisions shared by several branches match
    /// them all.
    pub fn find<'a>(&'a self, rev: &'a RevId) -> impl Iterator<Item = &'a Branch> + 'a {
        self.branches()
            .filter(move |b| b.index(rev.num).is_some_and(|i| b.path[i] == rev.hash))
    }

    pub fn contains(&self, rev: &RevId) -> bool {
        self.find(rev).next().is_some()
    }

    /// Every `(branch, rev_num)` pair reachable in the tree, leaf first per
    /// branch, highest branch first. Shared ancestry is yielded once per
    /// branch that carries it.
    pub fn all_revs(&self) -> impl Iterator<Item = (&Branch, u64)> {
        self.branches()
            .flat_map(|b| (0..b.path.len()).map(move |i| (b, b.leaf_rev_num - i as u64)))
    }

    /// The index of the winning branch: the greatest-keyed branch that is
    /// not a tombstone, or the greatest-keyed branch outright if every leaf
    /// is deleted. Must not be called on an empty tree.
    pub fn winner_idx(&self) -> usize {
        assert!(!self.branches.is_empty(), "winner of an empty revision tree");
        self.branches
            .iter()
            .rposition(|b| b.doc.is_some())
            .unwrap_or(self.branches.len() - 1)
    }

    /// Merge a revision path into the tree, storing `doc` at the leaf.
    ///
    /// `path` lists revision hashes leaf first; `path[0]` is the revision
    /// being written and the rest its ancestors. The merge is idempotent: a
    /// revision already present anywhere in the tree is a no-op regardless
    /// of `doc`. At most `revs_limit` ancestors are kept per branch.
    ///
    /// Malformed input (zero generation, empty path, a path reaching below
    /// generation 1) is a caller bug and panics.
    pub fn merge_with_path(
        &mut self,
        rev_num: u64,
        path: &[String],
        doc: Option<DocBody>,
        revs_limit: usize,
    ) {
        assert!(rev_num >= 1, "revision numbers start at 1");
        assert!(!path.is_empty(), "revision path cannot be empty");
        assert!(rev_num >= path.len() as u64, "revision path reaches below generation 1");

        for i in (0..self.branches.len()).rev() {
            let branch = &self.branches[i];

            // 1. already known. E.g.:
            //
            //    branch: leaf_rev_num 5, path [e, d, c]
            //    incoming: rev_num 3, path [c, b, a]
            if branch.index(rev_num).is_some_and(|j| branch.path[j] == path[0]) {
                return;
            }

            // 2. extend this branch. E.g.:
            //
            //    branch: leaf_rev_num 3, path [c, b, a]
            //    incoming: rev_num 5, path [e, d, c, b]
            if let Some(k) = rev_num.checked_sub(branch.leaf_rev_num) {
                let k = k as usize;
                if k < path.len() && path[k] == branch.path[0] {
                    // the old branch goes first to keep the sort keys unique
                    let old = self.branches.remove(i);
                    let mut full_path = path[..k].to_vec();
                    full_path.extend(old.path);
                    self.insert_branch(rev_num, full_path, doc, revs_limit);
                    return;
                }
            }
        }

        self.insert_as_new_branch(rev_num, path, doc, revs_limit);
    }

    fn insert_as_new_branch(
        &mut self,
        rev_num: u64,
        path: &[String],
        doc: Option<DocBody>,
        revs_limit: usize,
    ) {
        // 3. splice onto the first branch (in descending order) that shares
        // a revision with the incoming path
        let mut full_path = None;
        for branch in self.branches() {
            let branch_start = branch.leaf_rev_num + 1 - branch.path.len() as u64;
            let doc_start = rev_num + 1 - path.len() as u64;
            let common_rev_num = branch_start.max(doc_start);

            let Some(branch_i) = branch.index(common_rev_num) else { continue };
            let Some(doc_i) = rev_num
                .checked_sub(common_rev_num)
                .and_then(|d| usize::try_from(d).ok())
                .filter(|d| *d < path.len())
            else {
                continue;
            };
            if branch.path[branch_i] == path[doc_i] {
                let mut spliced = path[..doc_i].to_vec();
                spliced.extend_from_slice(&branch.path[branch_i..]);
                full_path = Some(spliced);
                break;
            }
        }

        // 4. otherwise a new branch without shared history
        let full_path = full_path.unwrap_or_else(|| path.to_vec());
        self.insert_branch(rev_num, full_path, doc, revs_limit);
    }

    fn insert_branch(
        &mut self,
        leaf_rev_num: u64,
        mut path: Vec<String>,
        doc: Option<DocBody>,
        revs_limit: usize,
    ) {
        assert!(revs_limit >= 1, "revs_limit must be at least 1");
        // stemming: the only legitimate source of path shortening
        path.truncate(revs_limit);

        let branch = Branch { leaf_rev_num, path, doc };
        let at = self
            .branches
            .partition_point(|b| b.sort_key() <= branch.sort_key());
        self.branches.insert(at, branch);
    }
}
