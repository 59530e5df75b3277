use std::collections::VecDeque;

use crate::circuit::{Circuit, OpId};
use crate::node::OpKind;
use crate::util::{HashMap, HashSet, IndexSet};

/// Collects every operation reachable downward from `from` whose kind
/// satisfies `pred`, including `from` itself.
pub fn collect_down(
    circuit: &Circuit,
    from: OpId,
    pred: impl Fn(&OpKind) -> bool,
) -> IndexSet<OpId> {
    let mut collected = IndexSet::default();
    circuit.postorder(from, &mut |id| {
        if pred(&circuit[id].kind) {
            collected.insert(id);
        }
    });
    collected
}

/// Collects every operation reachable upward (through `users`) from `from`
/// whose kind satisfies `pred`, including `from` itself.
pub fn collect_up(circuit: &Circuit, from: OpId, pred: impl Fn(&OpKind) -> bool) -> IndexSet<OpId> {
    let mut collected = IndexSet::default();
    let mut seen: HashSet<OpId> = HashSet::default();
    let mut todo = vec![from];
    while let Some(id) = todo.pop() {
        if !seen.insert(id) {
            continue;
        }
        if pred(&circuit[id].kind) {
            collected.insert(id);
        }
        todo.extend(circuit[id].users().iter().copied());
    }
    collected
}

/// A deduplicating worklist of operations whose context sets still have to
/// flow down to their operands.
#[derive(Debug, Default)]
struct ContextWorklist {
    queued: HashSet<OpId>,
    ops: VecDeque<OpId>,
}

impl ContextWorklist {
    fn push(&mut self, op: OpId) {
        if self.queued.insert(op) {
            self.ops.push_back(op);
        }
    }

    fn pop(&mut self) -> Option<OpId> {
        let op = self.ops.pop_front()?;
        self.queued.remove(&op);
        Some(op)
    }
}

/// Per-operation context sets: which `VerifyInstruction` ancestors each
/// operation serves.
///
/// Computed as a fixed point over the operand edges, seeded with each
/// context mapped to itself; an operation shared by several instruction
/// contexts ends up annotated with all of them.
#[derive(Debug, Default)]
pub struct ContextMap {
    op_to_ctxs: HashMap<OpId, IndexSet<OpId>>,
}

impl ContextMap {
    pub fn build(circuit: &Circuit) -> Self {
        let mut map = ContextMap::default();
        let mut todo = ContextWorklist::default();

        for vi in circuit.verify_instructions() {
            let mut seed = IndexSet::default();
            seed.insert(vi);
            map.op_to_ctxs.insert(vi, seed);
            todo.push(vi);
        }

        while let Some(user) = todo.pop() {
            let user_ctxs = map.op_to_ctxs[&user].clone();
            for &operand in circuit[user].operands() {
                let ctxs = map.op_to_ctxs.entry(operand).or_default();
                let before = ctxs.len();
                ctxs.extend(user_ctxs.iter().copied());
                if ctxs.len() > before {
                    todo.push(operand);
                }
            }
        }

        map
    }

    /// The contexts of `op`; empty if it is not reachable from any.
    pub fn contexts_of(&self, op: OpId) -> impl Iterator<Item = OpId> + '_ {
        self.op_to_ctxs
            .get(&op)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn context_count(&self, op: OpId) -> usize {
        self.op_to_ctxs.get(&op).map_or(0, |s| s.len())
    }

    pub fn is_shared(&self, op: OpId) -> bool {
        self.op_to_ctxs.get(&op).map_or(false, |s| s.len() > 1)
    }
}

/// Whether `op` is a register constraint on an output register that can
/// reach an `Undefined` value, i.e. the output is a don't-care.
pub fn allows_undef(circuit: &Circuit, op: OpId) -> bool {
    let operation = &circuit[op];
    if operation.kind != OpKind::RegConstraint {
        return false;
    }
    match operation.operands().get(1) {
        Some(&reg) if matches!(circuit[reg].kind, OpKind::OutputRegister(_)) => {}
        _ => return false,
    }
    !collect_down(circuit, op, |kind| *kind == OpKind::Undefined).is_empty()
}

/// Canonical, memoized subtree strings, for structural deduplication and
/// debugging.
#[derive(Debug, Default)]
pub struct TopologyHasher {
    cache: HashMap<OpId, String>,
}

impl TopologyHasher {
    pub fn hash(&mut self, circuit: &Circuit, op: OpId) -> String {
        if let Some(h) = self.cache.get(&op) {
            return h.clone();
        }
        let mut out = String::new();
        out.push_str(&circuit.display_op(op));
        out.push_str("( ");
        for &operand in circuit[op].operands() {
            out.push_str(&self.hash(circuit, operand));
            out.push(' ');
        }
        out.push(')');
        self.cache.insert(op, out.clone());
        out
    }
}
