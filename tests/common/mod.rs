use circuitry::node::bits_of_value;
use circuitry::{Circuit, OpKind, Symbol};

/// Builds a decoder circuit with one verify context per `(opcode, length)`
/// pair: the context requires bits 0..8 to equal `opcode` and carries a
/// terminal condition placing the encoding end at `length` bytes.
pub fn decoder_circuit(encodings: &[(u8, u32)]) -> Circuit {
    let mut circ = Circuit::new();
    let bits = circ.add(OpKind::InputInstructionBits, 120, &[]);
    let opcode_extract = circ.add(OpKind::Extract { low: 0, high: 8 }, 8, &[bits]);

    let mut vis = Vec::new();
    for &(opcode, length) in encodings {
        let opcode_const = circ.add(OpKind::Constant(bits_of_value(opcode as u128, 8)), 8, &[]);
        let opcode_check = circ.add(OpKind::DecodeCondition, 1, &[opcode_const, opcode_extract]);

        let low = length * 8;
        let tail_width = 120 - low;
        let tail_extract = circ.add(OpKind::Extract { low, high: 120 }, tail_width, &[bits]);
        let tail_const = circ.add(
            OpKind::Constant(dont_care_bits(tail_width)),
            tail_width,
            &[],
        );
        let tail_check = circ.add(OpKind::DecodeCondition, 1, &[tail_const, tail_extract]);

        vis.push(circ.add(OpKind::VerifyInstruction, 1, &[opcode_check, tail_check]));
    }

    let root = circ.add(OpKind::Circuit, 1, &vis);
    circ.set_root(root);
    circ
}

pub fn dont_care_bits(width: u32) -> Symbol {
    Symbol::from("~".repeat(width as usize))
}
