use std::fmt::{self, Debug};

use smallvec::SmallVec;

use crate::pattern::{PatId, PatternNode};
use crate::{CircNode, EGraph, Id, Pattern};

/// A substitution mapping place indices to bound e-class [`Id`]s.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Bindings {
    vec: SmallVec<[(u32, Id); 4]>,
}

impl Bindings {
    /// Insert a binding, returning the old `Id` if present.
    pub fn insert(&mut self, place: u32, id: Id) -> Option<Id> {
        for pair in &mut self.vec {
            if pair.0 == place {
                return Some(std::mem::replace(&mut pair.1, id));
            }
        }
        self.vec.push((place, id));
        None
    }

    pub fn get(&self, place: u32) -> Option<Id> {
        self.vec
            .iter()
            .find_map(|&(p, id)| if p == place { Some(id) } else { None })
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}

impl Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (p, id) in &self.vec {
            map.entry(&format_args!("?{}", p), id);
        }
        map.finish()
    }
}

/// One successful match: the e-class the pattern root matched, and what each
/// place was bound to.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub root: Id,
    pub bindings: Bindings,
}

fn head_matches(node: &CircNode, head: crate::Symbol, width: Option<u32>) -> bool {
    node.kind.name() == head.as_str() && width.map_or(true, |w| node.width == w)
}

impl Pattern {
    /// Drives `sink` with every consistent `(root, bindings)` pair, visiting
    /// classes in the e-graph's iteration order and nodes in class-insertion
    /// order, threading child bindings left to right. Never mutates the
    /// graph.
    pub fn for_each_match(&self, egraph: &EGraph, sink: &mut dyn FnMut(MatchResult)) {
        for class in egraph.classes() {
            for node in class.iter() {
                self.match_expr(self.root, node, class.id, egraph, &Bindings::default(), &mut |b| {
                    // a match is complete only when every place is bound
                    if b.len() == self.n_places {
                        sink(MatchResult {
                            root: class.id,
                            bindings: b,
                        });
                    }
                });
            }
        }
    }

    /// Eagerly collects every match; a snapshot of the graph's current state.
    pub fn search(&self, egraph: &EGraph) -> Vec<MatchResult> {
        let mut matches = Vec::new();
        self.for_each_match(egraph, &mut |m| matches.push(m));
        matches
    }

    fn match_expr(
        &self,
        pat: PatId,
        node: &CircNode,
        class: Id,
        egraph: &EGraph,
        bindings: &Bindings,
        k: &mut dyn FnMut(Bindings),
    ) {
        match self.node(pat) {
            PatternNode::Place(p) => match bindings.get(*p) {
                Some(bound) => {
                    if egraph.find(bound) == egraph.find(class) {
                        k(bindings.clone());
                    }
                }
                None => {
                    let mut bindings = bindings.clone();
                    bindings.insert(*p, egraph.find(class));
                    k(bindings);
                }
            },
            PatternNode::Constant(v) => {
                if node.constant_value() == Some(*v) {
                    k(bindings.clone());
                }
            }
            PatternNode::Op { name, width } => {
                if head_matches(node, *name, *width) && node.is_leaf() {
                    k(bindings.clone());
                }
            }
            PatternNode::List {
                head,
                width,
                children,
            } => {
                if !head_matches(node, *head, *width) {
                    return;
                }
                if node.children.len() != children.len() {
                    return;
                }
                self.match_children(children, &node.children, egraph, bindings, k);
            }
        }
    }

    fn match_children(
        &self,
        pats: &[PatId],
        kids: &[Id],
        egraph: &EGraph,
        bindings: &Bindings,
        k: &mut dyn FnMut(Bindings),
    ) {
        let (first, rest) = match pats.split_first() {
            None => return k(bindings.clone()),
            Some(x) => x,
        };
        let class = egraph.find(kids[0]);
        // backtracking point: every node of the child's class is a candidate
        for node in egraph.eclass(class).iter() {
            self.match_expr(*first, node, class, egraph, bindings, &mut |b| {
                self.match_children(rest, &kids[1..], egraph, &b, &mut *k)
            });
        }
    }
}
