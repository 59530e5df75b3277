/*!

`circuitry` is a symbolic circuit optimizer: it takes a bit-level circuit
lifted out of a machine-code instruction decoder, rewrites it with equality
saturation, and emits the result as a binary serialization, GraphViz DOT,
SMT-LIB2, JSON, Python, or a generated C decoder dispatcher.

The middle end is an e-graph specialized to the circuit operator set:

- [`UnionFind`] tracks which e-class ids have been merged.
- [`EGraph`] maps each canonical id to an [`EClass`] of [`CircNode`]s, with
  a hashcons for deduplication and parent back-edges for congruence repair.
- [`Rewrite`] rules pair an s-expression pattern with a replacement; the
  [`Runner`] drives them to saturation under iteration/node/time budgets.

Above the e-graph sits the arena [`Circuit`] IR the printers and the
[`decoder`] synthesizer consume, with [`extract`] converting between the
two.

## Logging

Most stages log through the [`log`](https://docs.rs/log/) crate; run the
binary (or tests) with `RUST_LOG=circuitry=debug` after initializing
`env_logger` to see saturation and rebuild statistics.

*/

mod dot;
mod eclass;
mod egraph;
mod error;
mod matcher;
mod rewrite;
mod run;
mod unionfind;
mod util;

pub mod analysis;
pub mod circuit;
pub mod decoder;
pub mod extract;
pub mod node;
pub mod pattern;
pub mod printers;
pub mod rules;
pub mod serialize;

/// A key to identify [`EClass`]es within an [`EGraph`].
#[derive(Clone, Copy, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Id(u32);

impl From<usize> for Id {
    fn from(n: usize) -> Id {
        Id(n as u32)
    }
}

impl From<Id> for usize {
    fn from(id: Id) -> usize {
        id.0 as usize
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub use {
    circuit::{Circuit, OpId, Operation},
    dot::Dot,
    eclass::EClass,
    egraph::EGraph,
    error::{Error, Result},
    matcher::{Bindings, MatchResult},
    node::{CircNode, OpKind},
    pattern::{parse_rules, Pattern},
    rewrite::Rewrite,
    run::{Iteration, Runner, StopReason},
    unionfind::UnionFind,
    util::Symbol,
};
