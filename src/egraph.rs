use log::*;
use std::mem;

use crate::util::{concat_vecs, HashMap, HashSet, IndexMap, IndexSet};
use crate::{CircNode, Dot, EClass, Id, UnionFind};

/// An e-graph over [`CircNode`]s.
///
/// The graph owns all nodes ever added. Nodes are deduplicated through the
/// hashcons on insertion and never freed; merging only moves them between
/// classes. After any sequence of [`merge`](EGraph::merge)s, call
/// [`rebuild`](EGraph::rebuild) to restore canonical child ids and congruence
/// before matching again.
#[derive(Debug, Clone, Default)]
pub struct EGraph {
    unionfind: UnionFind,
    /// The hashcons: canonicalized node -> id of the class containing it.
    memo: HashMap<CircNode, Id>,
    /// Keyed by union-find roots only.
    classes: IndexMap<Id, EClass>,
    /// Class ids whose membership changed since the last rebuild.
    pending: Vec<Id>,
    n_unions: usize,
    n_classes_created: usize,
}

impl EGraph {
    /// Canonicalizes `node`'s children, then either returns the id of the
    /// existing structurally-equal node or creates a fresh singleton class.
    pub fn add(&mut self, mut node: CircNode) -> Id {
        let uf = &mut self.unionfind;
        node.update_children(|c| uf.find_compress(c));

        if let Some(&id) = self.memo.get(&node) {
            return self.unionfind.find(id);
        }

        let id = self.unionfind.make_set();
        trace!("adding {:>4}: {}", usize::from(id), node);
        for &child in &node.children {
            let class = self
                .classes
                .get_mut(&child)
                .unwrap_or_else(|| panic!("add: child {:?} is not a known class", child));
            class.parents.push((node.clone(), id));
        }
        self.classes.insert(id, EClass::new(id, node.clone()));
        self.memo.insert(node, id);
        self.n_classes_created += 1;
        id
    }

    pub fn find(&self, id: Id) -> Id {
        self.unionfind.find(id)
    }

    pub fn find_mut(&mut self, id: Id) -> Id {
        self.unionfind.find_compress(id)
    }

    /// Unions the classes of `a` and `b`. Returns the surviving id and
    /// whether anything actually happened.
    ///
    /// The class with the larger parent list stays in place: more upward
    /// links mean more congruence repair if it moved. (This is the opposite
    /// of keeping the larger *node* set; see DESIGN.md.)
    pub fn merge(&mut self, a: Id, b: Id) -> (Id, bool) {
        let a = self.unionfind.find_compress(a);
        let b = self.unionfind.find_compress(b);
        if a == b {
            return (a, false);
        }
        assert!(
            self.classes.contains_key(&a) && self.classes.contains_key(&b),
            "merge on unknown id ({:?}, {:?})",
            a,
            b
        );

        let (winner, loser) =
            if self.classes[&a].parents.len() >= self.classes[&b].parents.len() {
                (a, b)
            } else {
                (b, a)
            };
        trace!("merging {:?} <- {:?}", winner, loser);

        self.unionfind.union_roots(winner, loser);
        let loser_class = self.classes.swap_remove(&loser).unwrap();
        let class = self.classes.get_mut(&winner).unwrap();
        debug_assert_eq!(class.nodes[0].width, loser_class.nodes[0].width);
        concat_vecs(&mut class.nodes, loser_class.nodes);
        concat_vecs(&mut class.parents, loser_class.parents);

        self.pending.push(winner);
        self.n_unions += 1;
        (winner, true)
    }

    /// Restores the e-graph invariants: every node's children are canonical
    /// ids, and structurally equal nodes share a class (congruence). Returns
    /// the number of unions performed along the way.
    pub fn rebuild(&mut self) -> usize {
        let start_unions = self.n_unions;
        let mut n_passes = 0;

        while !self.pending.is_empty() {
            n_passes += 1;
            let pending = mem::take(&mut self.pending);
            let todo: IndexSet<Id> = pending
                .into_iter()
                .map(|id| self.unionfind.find_compress(id))
                .collect();
            for id in todo {
                self.repair(id);
            }
        }

        let trimmed = self.rebuild_classes();
        let n_unions = self.n_unions - start_unions;
        debug!(
            "rebuilt in {} passes: {} unions, {} nodes trimmed, {} classes",
            n_passes,
            n_unions,
            trimmed,
            self.classes.len()
        );
        n_unions
    }

    fn repair(&mut self, id: Id) {
        let id = self.unionfind.find_compress(id);
        let mut parents = match self.classes.get_mut(&id) {
            Some(class) => mem::take(&mut class.parents),
            // already absorbed by an earlier repair this pass
            None => return,
        };

        for (node, parent_id) in parents.iter_mut() {
            self.memo.remove(node);
            let uf = &mut self.unionfind;
            node.update_children(|c| uf.find_compress(c));
            *parent_id = self.unionfind.find_compress(*parent_id);
        }

        // parents that collapsed to the same canonical node are congruent;
        // collect their unions, dedup the list, and re-register the hashcons
        let mut to_union = Vec::new();
        let mut new_parents: IndexMap<CircNode, Id> = IndexMap::default();
        for (node, parent_id) in parents {
            if let Some(&prev) = new_parents.get(&node) {
                to_union.push((prev, parent_id));
            } else {
                if let Some(old) = self.memo.insert(node.clone(), parent_id) {
                    if self.unionfind.find(old) != self.unionfind.find(parent_id) {
                        to_union.push((old, parent_id));
                    }
                }
                new_parents.insert(node, parent_id);
            }
        }

        let class = self.classes.get_mut(&id).unwrap();
        class.parents = new_parents.into_iter().collect();

        for (a, b) in to_union {
            self.merge(a, b);
        }
    }

    fn rebuild_classes(&mut self) -> usize {
        let mut trimmed = 0;
        let EGraph {
            unionfind, classes, ..
        } = self;
        for class in classes.values_mut() {
            let old_len = class.nodes.len();
            for node in class.nodes.iter_mut() {
                node.update_children(|c| unionfind.find_compress(c));
            }
            let mut seen: HashSet<CircNode> = HashSet::default();
            class.nodes.retain(|n| seen.insert(n.clone()));
            trimmed += old_len - class.nodes.len();
        }
        classes.retain(|_, class| !class.is_empty());
        trimmed
    }

    /// Iterates over the classes in insertion order (stable between
    /// rebuilds; the matcher's yield order is defined by it).
    pub fn classes(&self) -> impl ExactSizeIterator<Item = &EClass> {
        self.classes.values()
    }

    /// The class of `id`, canonicalizing first.
    pub fn eclass(&self, id: Id) -> &EClass {
        let root = self.unionfind.find(id);
        self.classes
            .get(&root)
            .unwrap_or_else(|| panic!("no class for id {:?}", id))
    }

    /// The bit width of the class of `id`.
    pub fn width(&self, id: Id) -> u32 {
        self.eclass(id).width()
    }

    pub fn number_of_classes(&self) -> usize {
        self.classes.len()
    }

    /// Total enodes across all classes.
    pub fn total_number_of_nodes(&self) -> usize {
        self.classes.values().map(|c| c.len()).sum()
    }

    /// Running counters: (unions ever performed, classes ever created). The
    /// saturation loop diffs these to detect a fixed point.
    pub fn progress(&self) -> (usize, usize) {
        (self.n_unions, self.n_classes_created)
    }

    /// A GraphViz rendering of this e-graph.
    pub fn dot(&self) -> Dot<'_> {
        Dot::new(self)
    }

    /// Checks every invariant [`rebuild`](EGraph::rebuild) promises. Meant
    /// for tests; panics with a description on the first violation.
    pub fn assert_invariants(&self) {
        assert!(self.pending.is_empty(), "pending work left behind");

        let mut canonical: HashMap<CircNode, Id> = HashMap::default();
        for (&id, class) in &self.classes {
            assert_eq!(id, self.unionfind.find(id), "class key is not a root");
            assert_eq!(id, class.id);
            assert!(!class.is_empty(), "empty class survived rebuild");

            for node in &class.nodes {
                for &child in &node.children {
                    assert_eq!(child, self.unionfind.find(child), "non-canonical child");
                }
                if let Some(&other) = canonical.get(node) {
                    panic!(
                        "congruence violation: {} is in classes {:?} and {:?}",
                        node, other, id
                    );
                }
                canonical.insert(node.clone(), id);
                let memo_id = *self
                    .memo
                    .get(node)
                    .unwrap_or_else(|| panic!("{} missing from hashcons", node));
                assert_eq!(self.unionfind.find(memo_id), id, "hashcons points astray");
            }

            for (parent, parent_id) in &class.parents {
                let parent_id = self.unionfind.find(*parent_id);
                let has_edge = parent
                    .children
                    .iter()
                    .any(|&c| self.unionfind.find(c) == id);
                assert!(
                    has_edge,
                    "parent {} of class {:?} (in {:?}) has no child edge back",
                    parent, id, parent_id
                );
            }
        }

        assert_eq!(
            self.memo.len(),
            canonical.len(),
            "hashcons carries stale entries"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::OpKind;

    fn reg(eg: &mut EGraph, name: &str) -> Id {
        eg.add(CircNode::leaf(OpKind::InputRegister(name.into()), 64))
    }

    #[test]
    fn add_is_hashconsed() {
        let mut eg = EGraph::default();
        let a = reg(&mut eg, "rax");
        let b = reg(&mut eg, "rax");
        assert_eq!(a, b);
        assert_eq!(eg.number_of_classes(), 1);
    }

    #[test]
    fn congruence_after_merge() {
        let mut eg = EGraph::default();
        let a = reg(&mut eg, "rax");
        let b = reg(&mut eg, "rbx");
        let fa = eg.add(CircNode::new(OpKind::Not, 64, [a]));
        let fb = eg.add(CircNode::new(OpKind::Not, 64, [b]));
        assert_ne!(eg.find(fa), eg.find(fb));

        eg.merge(a, b);
        eg.rebuild();

        assert_eq!(eg.find(fa), eg.find(fb));
        eg.assert_invariants();
    }

    #[test]
    fn dot_renders_every_class() {
        let mut eg = EGraph::default();
        let a = reg(&mut eg, "rax");
        let not = eg.add(CircNode::new(OpKind::Not, 64, [a]));
        let _ = not;
        let dot = eg.dot().to_string();
        assert!(dot.starts_with("digraph egraph {"));
        assert_eq!(dot.matches("subgraph").count(), eg.number_of_classes());
    }

    #[test]
    fn merge_is_idempotent() {
        let mut eg = EGraph::default();
        let a = reg(&mut eg, "rax");
        let b = reg(&mut eg, "rbx");
        let (_, did) = eg.merge(a, b);
        assert!(did);
        let (_, did) = eg.merge(a, b);
        assert!(!did);
        eg.rebuild();
        eg.assert_invariants();
    }
}
