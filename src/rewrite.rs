use log::*;

use crate::matcher::{Bindings, MatchResult};
use crate::pattern::{PatId, PatternNode};
use crate::util::IndexSet;
use crate::{CircNode, EGraph, Id, OpKind, Pattern, Symbol};

/// A rewrite rule: whenever `lhs` matches a class, `rhs` is instantiated and
/// merged into it. Both sides share one place table, so right-hand-side
/// places resolve through the bindings the match produced.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub name: String,
    pub lhs: Pattern,
    pub rhs: Pattern,
    places: Vec<Symbol>,
}

impl Rewrite {
    pub fn new(
        name: impl Into<String>,
        lhs: Pattern,
        rhs: Pattern,
        places: IndexSet<Symbol>,
    ) -> Self {
        Rewrite {
            name: name.into(),
            lhs,
            rhs,
            places: places.into_iter().collect(),
        }
    }

    /// The place variables of this rule, in first-occurrence order. The
    /// index of a name here is its key in a match's [`Bindings`].
    pub fn places(&self) -> &[Symbol] {
        &self.places
    }

    /// All matches of the left-hand side against the current graph.
    pub fn search(&self, egraph: &EGraph) -> Vec<MatchResult> {
        let matches = self.lhs.search(egraph);
        debug!("rule {}: {} matches", self.name, matches.len());
        matches
    }

    /// Instantiates the right-hand side for each match and merges it with
    /// the matched root. Returns how many merges changed the graph.
    pub fn apply(&self, egraph: &mut EGraph, matches: &[MatchResult]) -> usize {
        let mut applied = 0;
        for m in matches {
            let root_width = egraph.width(m.root);
            let id = instantiate(&self.rhs, egraph, &m.bindings, root_width);
            let (_, did) = egraph.merge(m.root, id);
            if did {
                applied += 1;
            }
        }
        if applied > 0 {
            debug!("rule {}: applied {} times", self.name, applied);
        }
        applied
    }
}

/// Builds the pattern bottom-up in the e-graph, looking places up in
/// `bindings`.
///
/// Widths: an explicit `:w` suffix wins; otherwise the width is inferred
/// from the children where the operator determines it, and falls back to the
/// matched root's width (the right width for constants and extension ops at
/// the top of a rule).
fn instantiate(pattern: &Pattern, egraph: &mut EGraph, bindings: &Bindings, root_width: u32) -> Id {
    build(pattern, pattern.root, egraph, bindings, root_width)
}

fn build(
    pattern: &Pattern,
    pat: PatId,
    egraph: &mut EGraph,
    bindings: &Bindings,
    root_width: u32,
) -> Id {
    match pattern.node(pat) {
        PatternNode::Place(p) => bindings
            .get(*p)
            .unwrap_or_else(|| panic!("place ?{} unbound during instantiation", p)),
        PatternNode::Constant(v) => egraph.add(CircNode::constant(*v, root_width)),
        PatternNode::Op { name, width } => {
            let kind = constructible(*name);
            let width = width.unwrap_or(root_width);
            egraph.add(CircNode::leaf(kind, width))
        }
        PatternNode::List {
            head,
            width,
            children,
        } => {
            let kids: Vec<Id> = children
                .iter()
                .map(|&c| build(pattern, c, egraph, bindings, root_width))
                .collect();
            let kind = constructible(*head);
            let width = width
                .or_else(|| infer_width(kind, &kids, egraph))
                .unwrap_or(root_width);
            egraph.add(CircNode::new(kind, width, kids))
        }
    }
}

fn constructible(name: Symbol) -> OpKind {
    OpKind::from_name(name.as_str())
        .unwrap_or_else(|| panic!("op `{}` survived parsing but is not constructible", name))
}

fn infer_width(kind: OpKind, children: &[Id], egraph: &EGraph) -> Option<u32> {
    use OpKind::*;
    match kind {
        Add | Sub | Mul | And | Or | Xor | Not | Shl | LShr | AShr | Popcount => {
            children.first().map(|&c| egraph.width(c))
        }
        Concat => Some(children.iter().map(|&c| egraph.width(c)).sum()),
        Parity | Equal | DecodeCondition | RegConstraint | VerifyInstruction | Circuit => Some(1),
        Select => children.get(1).map(|&c| egraph.width(c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse_rules;

    #[test]
    fn add_zero_folds() {
        let mut eg = EGraph::default();
        let five = eg.add(CircNode::constant(5, 64));
        let zero = eg.add(CircNode::constant(0, 64));
        let add = eg.add(CircNode::new(OpKind::Add, 64, [five, zero]));

        let rules = parse_rules("(rule (add ?x 0) ?x)").unwrap();
        let matches = rules[0].search(&eg);
        assert_eq!(matches.len(), 1);
        let applied = rules[0].apply(&mut eg, &matches);
        assert_eq!(applied, 1);
        eg.rebuild();

        assert_eq!(eg.find(add), eg.find(five));
        eg.assert_invariants();
    }

    #[test]
    fn rhs_constants_take_the_root_width() {
        let mut eg = EGraph::default();
        let a = eg.add(CircNode::leaf(OpKind::InputRegister("rax".into()), 32));
        let xor = eg.add(CircNode::new(OpKind::Xor, 32, [a, a]));

        let rules = parse_rules("(rule (xor ?x ?x) 0)").unwrap();
        let matches = rules[0].search(&eg);
        rules[0].apply(&mut eg, &matches);
        eg.rebuild();

        let zero = eg.add(CircNode::constant(0, 32));
        assert_eq!(eg.find(xor), eg.find(zero));
    }
}
