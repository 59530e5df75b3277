use log::*;

use crate::circuit::{Circuit, OpId};
use crate::util::HashMap;
use crate::{CircNode, EGraph, Id};

/// Lowers an arena circuit into a fresh e-graph. Returns the graph and the
/// id of the class holding the circuit root.
///
/// Sharing in the arena collapses through the hashcons, so a node reachable
/// along several paths lowers to a single e-class.
pub fn lower(circuit: &Circuit) -> (EGraph, Id) {
    let mut egraph = EGraph::default();
    let mut ids: HashMap<OpId, Id> = HashMap::default();

    circuit.postorder(circuit.root(), &mut |op| {
        let operation = &circuit[op];
        let children = operation.operands().iter().map(|c| ids[c]);
        let id = egraph.add(CircNode::new(operation.kind, operation.width, children));
        ids.insert(op, id);
    });

    let root = ids[&circuit.root()];
    debug!(
        "lowered {} operations into {} classes",
        circuit.len(),
        egraph.number_of_classes()
    );
    (egraph, root)
}

/// Picks the cheapest (smallest AST) representative of every class, by
/// fixed-point cost propagation over the class graph.
pub struct Extractor<'a> {
    egraph: &'a EGraph,
    costs: HashMap<Id, (u64, CircNode)>,
}

impl<'a> Extractor<'a> {
    pub fn new(egraph: &'a EGraph) -> Self {
        let mut extractor = Extractor {
            egraph,
            costs: HashMap::default(),
        };
        extractor.find_costs();
        extractor
    }

    fn node_cost(&self, node: &CircNode) -> Option<u64> {
        let mut cost = 1u64;
        for &child in &node.children {
            let (child_cost, _) = self.costs.get(&self.egraph.find(child))?;
            cost = cost.saturating_add(*child_cost);
        }
        Some(cost)
    }

    fn find_costs(&mut self) {
        let mut did_something = true;
        let mut loops = 0;
        while did_something {
            did_something = false;
            for class in self.egraph.classes() {
                let best = class
                    .iter()
                    .filter_map(|n| self.node_cost(n).map(|c| (c, n.clone())))
                    .min_by_key(|(c, _)| *c);
                let best = match best {
                    Some(best) => best,
                    None => continue,
                };
                match self.costs.get(&class.id) {
                    Some((old, _)) if *old <= best.0 => {}
                    _ => {
                        self.costs.insert(class.id, best);
                        did_something = true;
                    }
                }
            }
            loops += 1;
        }
        debug!("extraction costs converged in {} loops", loops);
    }

    /// Rebuilds an arena circuit from the chosen representatives, rooted at
    /// the class of `root`.
    pub fn extract(&self, root: Id) -> Circuit {
        let mut circuit = Circuit::new();
        let mut built: HashMap<Id, OpId> = HashMap::default();
        let root = self.build(self.egraph.find(root), &mut circuit, &mut built);
        circuit.set_root(root);
        circuit
    }

    fn build(&self, id: Id, circuit: &mut Circuit, built: &mut HashMap<Id, OpId>) -> OpId {
        let id = self.egraph.find(id);
        if let Some(&op) = built.get(&id) {
            return op;
        }
        let (_, node) = self
            .costs
            .get(&id)
            .unwrap_or_else(|| panic!("no finite-cost representative for class {:?}", id));
        let operands: Vec<OpId> = node
            .children
            .iter()
            .map(|&c| self.build(c, circuit, built))
            .collect();
        let op = circuit.add(node.kind, node.width, &operands);
        built.insert(id, op);
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::OpKind;
    use crate::pattern::parse_rules;
    use crate::Runner;

    fn tiny_circuit() -> Circuit {
        let mut circ = Circuit::new();
        let a = circ.add(OpKind::InputRegister("rax".into()), 64, &[]);
        let xor = circ.add(OpKind::Xor, 64, &[a, a]);
        let out = circ.add(OpKind::OutputRegister("rbx".into()), 64, &[]);
        let rc = circ.add(OpKind::RegConstraint, 1, &[xor, out]);
        let vi = circ.add(OpKind::VerifyInstruction, 1, &[rc]);
        let root = circ.add(OpKind::Circuit, 1, &[vi]);
        circ.set_root(root);
        circ
    }

    #[test]
    fn lower_then_extract_round_trips() {
        let circ = tiny_circuit();
        let (egraph, root) = lower(&circ);
        let extracted = Extractor::new(&egraph).extract(root);
        assert_eq!(extracted.len(), circ.len());
        assert_eq!(extracted[extracted.root()].kind, OpKind::Circuit);
    }

    #[test]
    fn extraction_prefers_the_rewritten_form() {
        let circ = tiny_circuit();
        let (egraph, root) = lower(&circ);
        let rules = parse_rules("(rule (xor ?x ?x) 0)").unwrap();
        let runner = Runner::default().with_egraph(egraph).with_root(root).run(&rules);
        assert!(runner.is_saturated());

        let extracted = Extractor::new(&runner.egraph).extract(runner.egraph.find(root));
        // the xor collapsed to a constant, shrinking the circuit
        assert!(extracted.len() < circ.len());
        let has_xor = extracted.ids().any(|id| extracted[id].kind == OpKind::Xor);
        assert!(!has_xor);
    }
}
