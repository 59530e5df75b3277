use crate::Id;

/// A disjoint-set forest over e-class [`Id`]s.
///
/// Ids handed out by [`make_set`](UnionFind::make_set) are dense and
/// monotonically increasing. After a merge, the losing id keeps resolving to
/// the winner through [`find`](UnionFind::find); the container is append-only.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parents: Vec<Id>,
    sizes: Vec<u32>,
}

impl UnionFind {
    pub fn make_set(&mut self) -> Id {
        let id = Id::from(self.parents.len());
        self.parents.push(id);
        self.sizes.push(1);
        id
    }

    pub fn size(&self) -> usize {
        self.parents.len()
    }

    fn parent(&self, query: Id) -> Id {
        self.parents[usize::from(query)]
    }

    fn set_parent(&mut self, query: Id, parent: Id) {
        self.parents[usize::from(query)] = parent;
    }

    /// Follows parent links to the root without mutating the forest.
    pub fn find(&self, mut current: Id) -> Id {
        while current != self.parent(current) {
            current = self.parent(current);
        }
        current
    }

    /// Like [`find`](UnionFind::find), but compresses the traversed path.
    pub fn find_compress(&mut self, current: Id) -> Id {
        let root = self.find(current);
        let mut current = current;
        while current != root {
            let parent = self.parent(current);
            self.set_parent(current, root);
            current = parent;
        }
        root
    }

    /// Unions the sets of `a` and `b` by size: the larger set's root becomes
    /// the parent. Returns the surviving root.
    pub fn merge(&mut self, a: Id, b: Id) -> Id {
        let a = self.find_compress(a);
        let b = self.find_compress(b);
        if a == b {
            return a;
        }
        let (winner, loser) = if self.sizes[usize::from(a)] >= self.sizes[usize::from(b)] {
            (a, b)
        } else {
            (b, a)
        };
        self.union_roots(winner, loser)
    }

    /// Given two roots, unions their sets making `winner` the surviving root.
    ///
    /// The e-graph picks its winner by parent-list size and needs the
    /// union-find to agree, so this bypasses the by-size policy of
    /// [`merge`](UnionFind::merge).
    pub fn union_roots(&mut self, winner: Id, loser: Id) -> Id {
        debug_assert_eq!(winner, self.find(winner));
        debug_assert_eq!(loser, self.find(loser));
        self.set_parent(loser, winner);
        self.sizes[usize::from(winner)] += self.sizes[usize::from(loser)];
        winner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_find() {
        let n = 10;
        let id = Id::from;

        let mut uf = UnionFind::default();
        for _ in 0..n {
            uf.make_set();
        }

        // test the initial condition of everyone in their own set
        assert_eq!(uf.parents, (0..n).map(id).collect::<Vec<_>>());

        // build up one set
        uf.union_roots(id(0), id(1));
        uf.union_roots(id(0), id(2));
        uf.union_roots(id(0), id(3));

        // build up another set
        uf.union_roots(id(6), id(7));
        uf.union_roots(id(6), id(8));
        uf.union_roots(id(6), id(9));

        // this should compress all paths
        for i in 0..n {
            uf.find_compress(id(i));
        }

        // indexes:         0, 1, 2, 3, 4, 5, 6, 7, 8, 9
        let expected = [0, 0, 0, 0, 4, 5, 6, 6, 6, 6];
        assert_eq!(
            uf.parents,
            expected.iter().map(|&x| id(x)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn merge_by_size() {
        let mut uf = UnionFind::default();
        let ids: Vec<Id> = (0..4).map(|_| uf.make_set()).collect();

        uf.merge(ids[0], ids[1]);
        uf.merge(ids[2], ids[3]);
        uf.merge(ids[1], ids[2]);

        assert_eq!(uf.find(ids[0]), uf.find(ids[3]));
        let roots: Vec<Id> = (0..4)
            .map(Id::from)
            .filter(|&i| uf.find(i) == i)
            .collect();
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn find_is_idempotent() {
        let mut uf = UnionFind::default();
        for _ in 0..5 {
            uf.make_set();
        }
        uf.merge(Id::from(0), Id::from(3));
        uf.merge(Id::from(3), Id::from(4));
        for i in 0..5 {
            let root = uf.find(Id::from(i));
            assert_eq!(uf.find(root), root);
        }
    }
}
