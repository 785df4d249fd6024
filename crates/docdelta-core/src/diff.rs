//! Change detection between two snapshots.
//!
//! [`diff`] is pure: it compares two [`FileSnapshot`]s and partitions the
//! union of their paths into added, modified and removed. Unchanged paths
//! appear in no category.
//!
//! Identity is the path. A rename shows up as one removal plus one unrelated
//! addition, never as a modification.

use serde::{Deserialize, Serialize};

use crate::snapshot::FileSnapshot;

/// The added/modified/removed partition between two snapshots.
///
/// Each list is in lexicographic path order, and no path appears in more
/// than one list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Paths present now but not in the previous snapshot.
    pub added: Vec<String>,
    /// Paths present in both with a different digest.
    pub modified: Vec<String>,
    /// Paths present previously but not now.
    pub removed: Vec<String>,
}

impl ChangeSet {
    /// `true` when nothing was added, modified or removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed paths across all three categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Compare `previous` against `current`.
///
/// Both inputs are `BTreeMap`s, so walking them yields paths in sorted order
/// and the output lists come out sorted without an extra pass.
#[must_use]
pub fn diff(previous: &FileSnapshot, current: &FileSnapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, digest) in current {
        match previous.get(path) {
            None => changes.added.push(path.clone()),
            Some(old) if old != digest => changes.modified.push(path.clone()),
            Some(_) => {}
        }
    }

    changes.removed = previous
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();

    changes
}


#[cfg(test)]
mod proptests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::snapshot::ContentDigest;
    use proptest::prelude::*;

    fn arb_snapshot() -> impl Strategy<Value = FileSnapshot> {
        prop::collection::btree_map("[a-e]{1,2}\\.(sql|md)", "[0-3]", 0..12)
            .prop_map(|m| m.into_iter().map(|(k, v)| (k, ContentDigest::new(v))).collect())
    }

    proptest! {
        #[test]
        fn prop_partitions_changed_paths(a in arb_snapshot(), b in arb_snapshot()) {
            let changes = diff(&a, &b);

            let added: BTreeSet<_> = changes.added.iter().cloned().collect();
            let modified: BTreeSet<_> = changes.modified.iter().cloned().collect();
            let removed: BTreeSet<_> = changes.removed.iter().cloned().collect();

            prop_assert!(added.is_disjoint(&modified));
            prop_assert!(added.is_disjoint(&removed));
            prop_assert!(modified.is_disjoint(&removed));

            let a_keys: BTreeSet<_> = a.keys().cloned().collect();
            let b_keys: BTreeSet<_> = b.keys().cloned().collect();
            let sym: BTreeSet<_> = a_keys.symmetric_difference(&b_keys).cloned().collect();
            let add_rem: BTreeSet<_> = added.union(&removed).cloned().collect();
            prop_assert_eq!(add_rem, sym);

            for path in &modified {
                prop_assert_ne!(a.get(path), b.get(path));
                prop_assert!(a.contains_key(path) && b.contains_key(path));
            }
        }

        #[test]
        fn prop_self_diff_is_empty(a in arb_snapshot()) {
            prop_assert!(diff(&a, &a).is_empty());
        }

        #[test]
        fn prop_output_is_sorted(a in arb_snapshot(), b in arb_snapshot()) {
            let changes = diff(&a, &b);
            for list in [&changes.added, &changes.modified, &changes.removed] {
                prop_assert!(list.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
