//! Union-find over typed ids.

use crate::{ids::Id, typed_vec::TVec};
use std::{cell::Cell, cmp::Ordering};

/// Union-find with union-by-size and path compression.
///
/// `union` reports which root survived and which id was uprooted; the e-graph
/// folds the uprooted class's node set and parent set into the survivor.
#[derive(Clone, Debug, Default)]
pub(crate) struct UnionFind<K: Id> {
    parent: TVec<K, Cell<K>>,
    size: TVec<K, u32>,
}

impl<K: Id> UnionFind<K> {
    /// Add a fresh singleton set, returning its id.
    pub(crate) fn push(&mut self) -> K {
        let id = self.parent.push(Cell::new(K::from(self.parent.len())));
        let size_slot = self.size.push(1);
        debug_assert_eq!(id, size_slot);
        id
    }

    pub(crate) fn find(&self, i: K) -> K {
        let p = self.parent[i].get();
        if p == i {
            i
        } else {
            let root = self.find(p);
            self.parent[i].set(root);
            root
        }
    }

    /// Union the sets of `a` and `b`. The larger set's root survives; on
    /// equal size the newer id wins, so a freshly synthesized class keeps its
    /// id when merged with an older singleton.
    pub(crate) fn union(&mut self, a: K, b: K) -> (K, Option<K>) {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return (a, None);
        }
        let (root, uprooted) = match self.size[a].cmp(&self.size[b]) {
            Ordering::Greater => (a, b),
            Ordering::Less => (b, a),
            Ordering::Equal => (a.max(b), a.min(b)),
        };
        self.parent[uprooted].set(root);
        let gained = self.size[uprooted];
        self.size[root] += gained;
        (root, Some(uprooted))
    }

    /// Iterate the currently visible set representatives, in id order.
    pub(crate) fn roots(&self) -> impl Iterator<Item = K> + '_ {
        self.parent
            .iter_enumerate()
            .filter_map(|(i, p)| (p.get() == i).then_some(i))
    }
}
