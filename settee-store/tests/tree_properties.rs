//! Property tests for the revision tree algebra.
//!
//! Merge inputs are drawn from small synthetic lineages: a base history
//! that may fork once at `fork_gen` into a branch history. Tokens are
//! unique per generation within a lineage, so every generated path is a
//! well-formed revision path, while overlapping lineages still exercise
//! the extend/splice/known merge cases.

use proptest::prelude::*;
use serde_json::json;
use settee_model::{DocBody, RevId};
use settee_store::RevisionTree;

const BASES: [char; 3] = ['a', 'b', 'c'];
const BRANCHES: [char; 3] = ['p', 'q', 'r'];

#[derive(Debug, Clone, Copy)]
struct Lineage {
    base: char,
    branch: char,
    fork_gen: u64,
}

impl Lineage {
    fn token(&self, gen: u64) -> String {
        if gen > self.fork_gen {
            format!("{}{}", self.branch, gen)
        } else {
            format!("{}{}", self.base, gen)
        }
    }

    /// Leaf-first path of `len` revisions ending at generation `rev_num`.
    fn path(&self, rev_num: u64, len: usize) -> Vec<String> {
        (0..len as u64).map(|i| self.token(rev_num - i)).collect()
    }
}

/// (base, branch, fork_gen, rev_num, raw_len, deleted)
type RawOp = (usize, usize, u64, u64, u64, bool);

fn build_op(op: RawOp) -> (u64, Vec<String>, Option<DocBody>) {
    let (base, branch, fork, rev_num, raw_len, deleted) = op;
    let len = raw_len.min(rev_num) as usize;
    let lineage = Lineage {
        base: BASES[base],
        branch: BRANCHES[branch],
        fork_gen: fork,
    };
    let body = if deleted {
        None
    } else {
        json!({"gen": rev_num}).as_object().cloned()
    };
    (rev_num, lineage.path(rev_num, len), body)
}

fn raw_ops(max: usize) -> impl Strategy<Value = Vec<RawOp>> {
    prop::collection::vec(
        (0usize..3, 0usize..3, 0u64..4, 1u64..=8, 1u64..=5, any::<bool>()),
        1..max,
    )
}

fn build_tree(ops: &[RawOp], revs_limit: usize) -> RevisionTree {
    let mut tree = RevisionTree::new();
    for &op in ops {
        let (rev_num, path, body) = build_op(op);
        tree.merge_with_path(rev_num, &path, body, revs_limit);
    }
    tree
}

proptest! {
    #[test]
    fn prop_merge_idempotent(ops in raw_ops(12)) {
        let tree = build_tree(&ops, 1000);
        for &op in &ops {
            let mut again = tree.clone();
            let (rev_num, path, body) = build_op(op);
            again.merge_with_path(rev_num, &path, body, 1000);
            prop_assert_eq!(&again, &tree);
        }
    }

    #[test]
    fn prop_disjoint_merges_commute(
        op1 in (Just(0usize), Just(0usize), 0u64..4, 1u64..=8, 1u64..=5, any::<bool>()),
        op2 in (Just(1usize), Just(1usize), 0u64..4, 1u64..=8, 1u64..=5, any::<bool>()),
    ) {
        // lineage 0 uses tokens {a*, p*}, lineage 1 uses {b*, q*}: no shared ancestry
        let (rev1, path1, body1) = build_op(op1);
        let (rev2, path2, body2) = build_op(op2);

        let mut forward = RevisionTree::new();
        forward.merge_with_path(rev1, &path1, body1.clone(), 1000);
        forward.merge_with_path(rev2, &path2, body2.clone(), 1000);

        let mut backward = RevisionTree::new();
        backward.merge_with_path(rev2, &path2, body2, 1000);
        backward.merge_with_path(rev1, &path1, body1, 1000);

        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_revs_limit_bounds_every_branch(ops in raw_ops(12), limit in 1usize..4) {
        let tree = build_tree(&ops, limit);
        for branch in tree.branches() {
            prop_assert!(branch.path.len() <= limit);
            prop_assert!(!branch.path.is_empty());
        }
    }

    #[test]
    fn prop_winner_exists_and_prefers_live(ops in raw_ops(12)) {
        let tree = build_tree(&ops, 1000);
        prop_assert!(!tree.is_empty());

        let winner = tree.branch(tree.winner_idx());
        let any_live = tree.branches().any(|b| !b.is_deleted());
        if any_live {
            prop_assert!(!winner.is_deleted());
            // among live branches, the winner has the greatest key
            let best = tree
                .branches()
                .filter(|b| !b.is_deleted())
                .map(|b| b.leaf_rev())
                .max()
                .unwrap();
            prop_assert_eq!(winner.leaf_rev(), best);
        } else {
            let best = tree.branches().map(|b| b.leaf_rev()).max().unwrap();
            prop_assert_eq!(winner.leaf_rev(), best);
        }
    }

    #[test]
    fn prop_rev_diff_matches_tree_contents(
        ops in raw_ops(12),
        requested in prop::collection::vec((0usize..3, 0usize..3, 0u64..4, 1u64..=8), 0..10),
    ) {
        let tree = build_tree(&ops, 1000);
        let in_tree: std::collections::HashSet<RevId> = tree
            .all_revs()
            .filter_map(|(b, n)| b.rev(n))
            .collect();

        for (base, branch, fork, rev_num) in requested {
            let lineage = Lineage {
                base: BASES[base],
                branch: BRANCHES[branch],
                fork_gen: fork,
            };
            let rev = RevId::new(rev_num, lineage.token(rev_num));
            // `contains` walks branches, `all_revs` enumerates; both must agree
            prop_assert_eq!(tree.contains(&rev), in_tree.contains(&rev));
        }
    }

    #[test]
    fn prop_branches_stay_sorted_and_unique(ops in raw_ops(16)) {
        let tree = build_tree(&ops, 1000);
        let keys: Vec<RevId> = tree.branches().map(|b| b.leaf_rev()).collect();
        // descending iteration, strictly (no duplicate leaves)
        for pair in keys.windows(2) {
            prop_assert!(pair[0] > pair[1]);
        }
    }
}
