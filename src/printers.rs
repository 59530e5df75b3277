//! Mechanical surface forms of a circuit: GraphViz DOT, SMT-LIB2, JSON, and
//! a Python literal. All of them are single unique-visit walks over the
//! arena; none of them mutate or interpret the circuit.

use std::io::{self, Write};

use serde_json::json;

use crate::circuit::{Circuit, OpId};
use crate::node::OpKind;
use crate::util::HashSet;

/// GraphViz DOT with one HTML-table node per operation, operand ports along
/// the bottom row.
pub fn print_dot(circuit: &Circuit, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "digraph {{")?;
    writeln!(out, "node [shape=plain];")?;
    for (id, op) in circuit.operations() {
        write!(
            out,
            "o{} [label=<<TABLE cellpadding=\"0\" cellspacing=\"0\" border=\"1\"><TR><TD port=\"id\"",
            id
        )?;
        if !op.operands().is_empty() {
            write!(out, " colspan=\"{}\"", op.operands().len())?;
        }
        write!(out, ">{}</TD></TR>", circuit.display_op(id))?;
        if !op.operands().is_empty() {
            write!(out, "<TR>")?;
            for &sub in op.operands() {
                write!(out, "<TD port=\"s{}\"> &nbsp; </TD>", sub)?;
            }
            write!(out, "</TR>")?;
        }
        writeln!(out, "</TABLE>>];")?;
        for &sub in op.operands() {
            writeln!(out, "o{}:s{} -> o{}:id;", id, sub, sub)?;
        }
    }
    writeln!(out, "}}")
}

/// SMT-LIB2 over the bitvector theory. Every operation becomes a named
/// `define-fun`; inputs, advice, and undefined values become constants;
/// popcount-class operations become uninterpreted functions, declared once
/// per width. Finishes by asserting the root.
pub fn print_smt(circuit: &Circuit, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "(set-logic QF_UFBV)")?;

    // uninterpreted helpers, one per width in use
    let mut declared: HashSet<(u8, u32)> = HashSet::default();
    for (_, op) in circuit.operations() {
        match op.kind {
            OpKind::Popcount => {
                if declared.insert((0, op.width)) {
                    writeln!(
                        out,
                        "(declare-fun popcount{w} ((_ BitVec {w})) (_ BitVec {w}))",
                        w = op.width
                    )?;
                }
            }
            OpKind::Parity => {
                let w = circuit[op.operands()[0]].width;
                if declared.insert((1, w)) {
                    writeln!(
                        out,
                        "(declare-fun parity{w} ((_ BitVec {w})) (_ BitVec 1))",
                        w = w
                    )?;
                }
            }
            _ => {}
        }
    }

    let mut order = Vec::with_capacity(circuit.len());
    circuit.postorder(circuit.root(), &mut |id| order.push(id));
    for id in order {
        print_smt_op(circuit, id, out)?;
    }

    writeln!(out, "(assert (= o{} #b1))", circuit.root())?;
    writeln!(out, "(check-sat)")
}

fn print_smt_op(circuit: &Circuit, id: OpId, out: &mut dyn Write) -> io::Result<()> {
    let op = &circuit[id];
    let w = op.width;
    let operand = |i: usize| format!("o{}", op.operands()[i]);
    let all: Vec<String> = (0..op.operands().len()).map(operand).collect();

    let body = match op.kind {
        OpKind::InputRegister(name) => {
            return writeln!(out, "(declare-const o{} (_ BitVec {})) ; in {}", id, w, name)
        }
        OpKind::OutputRegister(name) => {
            return writeln!(out, "(declare-const o{} (_ BitVec {})) ; out {}", id, w, name)
        }
        OpKind::InputInstructionBits | OpKind::Advice | OpKind::Undefined => {
            return writeln!(out, "(declare-const o{} (_ BitVec {}))", id, w)
        }
        OpKind::Constant(bits) => format!("#b{}", smt_bits(bits.as_str())),
        OpKind::Extract { low, high } => {
            format!("((_ extract {} {}) {})", high - 1, low, operand(0))
        }
        // SMT concat puts the most significant part first
        OpKind::Concat => {
            let mut parts: Vec<String> = all.clone();
            parts.reverse();
            format!("(concat {})", parts.join(" "))
        }
        OpKind::Add => format!("(bvadd {})", all.join(" ")),
        OpKind::Sub => format!("(bvsub {})", all.join(" ")),
        OpKind::Mul => format!("(bvmul {})", all.join(" ")),
        OpKind::And => format!("(bvand {})", all.join(" ")),
        OpKind::Or => format!("(bvor {})", all.join(" ")),
        OpKind::Xor => format!("(bvxor {})", all.join(" ")),
        OpKind::Not => format!("(bvnot {})", operand(0)),
        OpKind::Shl => format!("(bvshl {} {})", operand(0), operand(1)),
        OpKind::LShr => format!("(bvlshr {} {})", operand(0), operand(1)),
        OpKind::AShr => format!("(bvashr {} {})", operand(0), operand(1)),
        OpKind::Popcount => format!("(popcount{} {})", w, operand(0)),
        OpKind::Parity => {
            format!("(parity{} {})", circuit[op.operands()[0]].width, operand(0))
        }
        OpKind::ZeroExt => {
            let cw = circuit[op.operands()[0]].width;
            format!("((_ zero_extend {}) {})", w - cw, operand(0))
        }
        OpKind::SignExt => {
            let cw = circuit[op.operands()[0]].width;
            format!("((_ sign_extend {}) {})", w - cw, operand(0))
        }
        OpKind::Trunc => format!("((_ extract {} 0) {})", w - 1, operand(0)),
        OpKind::Select if op.operands().len() == 3 => format!(
            "(ite (= {} #b1) {} {})",
            operand(0),
            operand(1),
            operand(2)
        ),
        OpKind::Select => format!("(bvor {})", all.join(" ")),
        OpKind::Equal | OpKind::RegConstraint | OpKind::DecodeCondition => format!(
            "(ite (= {} {}) #b1 #b0)",
            operand(0),
            operand(1)
        ),
        OpKind::VerifyInstruction => match all.len() {
            0 => "#b1".into(),
            1 => all[0].clone(),
            _ => format!("(bvand {})", all.join(" ")),
        },
        OpKind::Circuit => match all.len() {
            0 => "#b0".into(),
            1 => all[0].clone(),
            _ => format!("(bvor {})", all.join(" ")),
        },
    };

    writeln!(out, "(define-fun o{} () (_ BitVec {}) {})", id, w, body)
}

/// Bit strings are little-endian in the IR; SMT binary literals are
/// big-endian. Don't-care bits print as zero.
fn smt_bits(bits: &str) -> String {
    bits.chars()
        .rev()
        .map(|c| if c == '1' { '1' } else { '0' })
        .collect()
}

/// One JSON record per operation, arena order, immediates inline.
pub fn print_json(circuit: &Circuit, out: &mut dyn Write) -> io::Result<()> {
    let ops: Vec<serde_json::Value> = circuit
        .operations()
        .map(|(id, op)| {
            let mut record = json!({
                "id": usize::from(id),
                "kind": op.kind.name(),
                "width": op.width,
                "operands": op.operands().iter().map(|&o| usize::from(o)).collect::<Vec<_>>(),
            });
            match op.kind {
                OpKind::InputRegister(name) | OpKind::OutputRegister(name) => {
                    record["register"] = json!(name.as_str());
                }
                OpKind::Constant(bits) => record["bits"] = json!(bits.as_str()),
                OpKind::Extract { low, high } => {
                    record["low"] = json!(low);
                    record["high"] = json!(high);
                }
                _ => {}
            }
            record
        })
        .collect();

    let doc = json!({
        "version": 1,
        "root": usize::from(circuit.root()),
        "operations": ops,
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&doc)?)
}

/// A Python literal mirroring the JSON shape.
pub fn print_python(circuit: &Circuit, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "CIRCUIT = {{")?;
    writeln!(out, "    \"root\": {},", circuit.root())?;
    writeln!(out, "    \"operations\": [")?;
    for (id, op) in circuit.operations() {
        let operands: Vec<String> = op.operands().iter().map(|o| o.to_string()).collect();
        writeln!(
            out,
            "        ({}, \"{}\", {}, [{}]),",
            id,
            circuit.display_op(id),
            op.width,
            operands.join(", ")
        )?;
    }
    writeln!(out, "    ],")?;
    writeln!(out, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::bits_of_value;

    fn sample() -> Circuit {
        let mut circ = Circuit::new();
        let a = circ.add(OpKind::InputRegister("rax".into()), 8, &[]);
        let c = circ.add(OpKind::Constant(bits_of_value(0x48, 8)), 8, &[]);
        let eq = circ.add(OpKind::Equal, 1, &[a, c]);
        let vi = circ.add(OpKind::VerifyInstruction, 1, &[eq]);
        let root = circ.add(OpKind::Circuit, 1, &[vi]);
        circ.set_root(root);
        circ
    }

    #[test]
    fn smt_mentions_every_operation() {
        let circ = sample();
        let mut out = Vec::new();
        print_smt(&circ, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(set-logic QF_UFBV)"));
        assert!(text.contains("#b01001000")); // 0x48, big-endian
        assert!(text.contains("(assert (= o4 #b1))"));
    }

    #[test]
    fn json_has_a_record_per_op() {
        let circ = sample();
        let mut out = Vec::new();
        print_json(&circ, &mut out).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["operations"].as_array().unwrap().len(), circ.len());
        assert_eq!(doc["root"], 4);
    }

    #[test]
    fn dot_is_well_formed() {
        let circ = sample();
        let mut out = Vec::new();
        print_dot(&circ, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph {"));
        assert!(text.trim_end().ends_with('}'));
    }
}
