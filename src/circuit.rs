use std::fmt::{self, Debug, Display};
use std::ops::Index;

use crate::node::OpKind;
use crate::util::HashSet;

/// A stable index naming an [`Operation`] inside a [`Circuit`]'s arena.
#[derive(Clone, Copy, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct OpId(u32);

impl From<usize> for OpId {
    fn from(n: usize) -> OpId {
        OpId(n as u32)
    }
}

impl From<OpId> for usize {
    fn from(id: OpId) -> usize {
        id.0 as usize
    }
}

impl Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One circuit operation: a tag, a bit width, ordered operand edges, and the
/// reverse `users` edges, kept consistent by [`Circuit::add`] and
/// [`Circuit::set_operand`].
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub width: u32,
    operands: Vec<OpId>,
    users: Vec<OpId>,
}

impl Operation {
    pub fn operands(&self) -> &[OpId] {
        &self.operands
    }

    pub fn users(&self) -> &[OpId] {
        &self.users
    }
}

/// An arena-backed circuit DAG.
///
/// Operations live in a contiguous vector and refer to each other by
/// [`OpId`]; nothing is ever freed, so ids stay valid for the circuit's
/// lifetime and serialization is a linear walk.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    ops: Vec<Operation>,
    root: Option<OpId>,
}

impl Index<OpId> for Circuit {
    type Output = Operation;

    fn index(&self, id: OpId) -> &Operation {
        &self.ops[usize::from(id)]
    }
}

impl Circuit {
    pub fn new() -> Self {
        Circuit::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Appends an operation, wiring the `users` edge of every operand.
    pub fn add(&mut self, kind: OpKind, width: u32, operands: &[OpId]) -> OpId {
        let id = OpId::from(self.ops.len());
        for &operand in operands {
            self.ops[usize::from(operand)].users.push(id);
        }
        self.ops.push(Operation {
            kind,
            width,
            operands: operands.to_vec(),
            users: vec![],
        });
        id
    }

    /// Redirects operand `index` of `op` to `new`, fixing both `users` lists.
    pub fn set_operand(&mut self, op: OpId, index: usize, new: OpId) {
        let old = self.ops[usize::from(op)].operands[index];
        if old == new {
            return;
        }
        self.ops[usize::from(op)].operands[index] = new;
        let users = &mut self.ops[usize::from(old)].users;
        if let Some(pos) = users.iter().position(|&u| u == op) {
            users.remove(pos);
        }
        self.ops[usize::from(new)].users.push(op);
    }

    pub fn set_root(&mut self, root: OpId) {
        debug_assert!(usize::from(root) < self.ops.len());
        self.root = Some(root);
    }

    /// The root operation (kind `Circuit`). Panics if none was set.
    pub fn root(&self) -> OpId {
        self.root.expect("circuit has no root")
    }

    pub fn ids(&self) -> impl ExactSizeIterator<Item = OpId> {
        (0..self.ops.len()).map(OpId::from)
    }

    pub fn operations(&self) -> impl ExactSizeIterator<Item = (OpId, &Operation)> {
        self.ops.iter().enumerate().map(|(i, op)| (OpId::from(i), op))
    }

    /// The per-instruction contexts: the root's `VerifyInstruction` children.
    pub fn verify_instructions(&self) -> Vec<OpId> {
        self[self.root()]
            .operands()
            .iter()
            .copied()
            .filter(|&id| self[id].kind == OpKind::VerifyInstruction)
            .collect()
    }

    /// Visits every operation reachable downward from `from`, children
    /// before parents, each at most once.
    pub fn postorder(&self, from: OpId, f: &mut dyn FnMut(OpId)) {
        let mut seen: HashSet<OpId> = HashSet::default();
        self.postorder_rec(from, &mut seen, f);
    }

    fn postorder_rec(&self, id: OpId, seen: &mut HashSet<OpId>, f: &mut dyn FnMut(OpId)) {
        if !seen.insert(id) {
            return;
        }
        for &operand in self[id].operands() {
            self.postorder_rec(operand, seen, f);
        }
        f(id);
    }

    /// A readable one-line form of an operation, for diagnostics and
    /// printers.
    pub fn display_op(&self, id: OpId) -> String {
        let op = &self[id];
        match op.kind {
            OpKind::InputRegister(name) | OpKind::OutputRegister(name) => {
                format!("{}:{}:{}", op.kind.name(), name, op.width)
            }
            OpKind::Constant(bits) => format!("{}:{}:{}", op.kind.name(), bits, op.width),
            OpKind::Extract { low, high } => {
                format!("{}:{}:{}:{}", op.kind.name(), low, high, op.width)
            }
            _ => format!("{}:{}", op.kind.name(), op.width),
        }
    }
}
