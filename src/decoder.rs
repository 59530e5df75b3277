use std::io::{self, Write};

use log::*;

use crate::analysis::collect_down;
use crate::circuit::{Circuit, OpId};
use crate::node::OpKind;
use crate::{Error, Result};

/// Instruction encodings span at most 15 bytes; the terminal decode
/// condition sits at bit 120.
pub const INPUT_BITS: usize = 120;

/// What one decode context requires of one input bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitReq {
    Zero,
    One,
    DontCare,
}

/// The bit-level requirements of one instruction encoding, flattened out of
/// a `VerifyInstruction` subtree's decode conditions.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub name: String,
    /// Encoded instruction length in bytes, 1..=15.
    pub length: u8,
    pub bits: [BitReq; INPUT_BITS],
}

impl DecodeContext {
    /// Whether a concrete 15-byte input satisfies every required bit.
    pub fn matches(&self, input: &[u8; 15]) -> bool {
        self.bits.iter().enumerate().all(|(i, req)| {
            let bit = input[i / 8] >> (i % 8) & 1;
            match req {
                BitReq::Zero => bit == 0,
                BitReq::One => bit == 1,
                BitReq::DontCare => true,
            }
        })
    }

    /// The two 64-bit `(required, dont_care)` mask pairs the generated
    /// decoder compares against. Bits at and above 120 count as don't-care.
    pub fn words(&self) -> [(u64, u64); 2] {
        let mut words = [(0u64, 0u64); 2];
        for (w, pair) in words.iter_mut().enumerate() {
            for k in 0..64 {
                let i = w * 64 + k;
                match self.bits.get(i).copied().unwrap_or(BitReq::DontCare) {
                    BitReq::One => pair.0 |= 1 << k,
                    BitReq::DontCare => pair.1 |= 1 << k,
                    BitReq::Zero => {}
                }
            }
        }
        words
    }
}

/// Pulls the decode contexts out of a circuit, one per `VerifyInstruction`.
///
/// Each context must carry exactly one terminal condition (an extract ending
/// at bit 120) whose low bound encodes the instruction length.
pub fn extract_contexts(circuit: &Circuit) -> Result<Vec<DecodeContext>> {
    let mut contexts = Vec::new();
    for (index, vi) in circuit.verify_instructions().into_iter().enumerate() {
        let conds = collect_down(circuit, vi, |kind| *kind == OpKind::DecodeCondition);

        let mut length = None;
        let mut bits = [BitReq::DontCare; INPUT_BITS];
        for &cond in &conds {
            let (constant, low, high) = decode_condition_parts(circuit, cond)?;
            if high as usize == INPUT_BITS {
                let len = low / 8;
                if len > 15 {
                    return Err(Error::EncodingTooLong(len));
                }
                if len == 0 {
                    return Err(Error::InvariantViolation(format!(
                        "context {:?}: terminal condition implies a zero-length encoding",
                        vi
                    )));
                }
                length = Some(len as u8);
                continue;
            }
            let constant = constant.as_str().as_bytes();
            for i in low..high.min(INPUT_BITS as u32) {
                let req = match constant.get((i - low) as usize) {
                    Some(b'0') => BitReq::Zero,
                    Some(b'1') => BitReq::One,
                    Some(b'~') => continue,
                    other => {
                        return Err(Error::InvariantViolation(format!(
                            "decode constant bit {:?} at index {}",
                            other.map(|&b| b as char),
                            i
                        )))
                    }
                };
                bits[i as usize] = req;
            }
        }

        let length = length.ok_or_else(|| {
            Error::InvariantViolation(format!(
                "context {:?} has no decode condition that specifies its end",
                vi
            ))
        })?;

        contexts.push(DecodeContext {
            name: format!("decode_ctx_{}", index),
            length,
            bits,
        });
    }
    info!("extracted {} decode contexts", contexts.len());
    Ok(contexts)
}

fn decode_condition_parts(
    circuit: &Circuit,
    cond: OpId,
) -> Result<(crate::Symbol, u32, u32)> {
    let operands = circuit[cond].operands();
    let violation = |what: &str| {
        Error::InvariantViolation(format!("decode condition {:?}: {}", cond, what))
    };
    if operands.len() != 2 {
        return Err(violation("expected two operands"));
    }
    let constant = match circuit[operands[0]].kind {
        OpKind::Constant(bits) => bits,
        _ => return Err(violation("operand 0 is not a constant")),
    };
    let (low, high) = match circuit[operands[1]].kind {
        OpKind::Extract { low, high } => (low, high),
        _ => return Err(violation("operand 1 is not an extract")),
    };
    Ok((constant, low, high))
}

/// A single-pass decision tree over input bits. Leaves list the contexts
/// whose bit requirements are compatible with the path taken.
#[derive(Debug, PartialEq, Eq)]
pub enum DecoderTree {
    Leaf(Vec<usize>),
    Branch {
        bit: usize,
        zeros: Box<DecoderTree>,
        ones: Box<DecoderTree>,
    },
}

/// Builds the decision tree with a greedy split: at each node pick the
/// untested bit maximizing `min(|zeros|, |ones|)` (ties to the lowest
/// index), sending don't-care contexts down both sides.
pub fn build_tree(contexts: &[DecodeContext]) -> DecoderTree {
    let indices: Vec<usize> = (0..contexts.len()).collect();
    let tree = split(contexts, indices, 0u128);
    debug!(
        "decoder tree depth {} for {} contexts",
        tree.depth(),
        contexts.len()
    );
    tree
}

fn split(contexts: &[DecodeContext], indices: Vec<usize>, tested: u128) -> DecoderTree {
    if indices.len() <= 1 {
        return DecoderTree::Leaf(indices);
    }

    let mut best: Option<(usize, usize)> = None; // (score, bit)
    for bit in 0..INPUT_BITS {
        if tested >> bit & 1 == 1 {
            continue;
        }
        let zeros = indices
            .iter()
            .filter(|&&i| contexts[i].bits[bit] == BitReq::Zero)
            .count();
        let ones = indices
            .iter()
            .filter(|&&i| contexts[i].bits[bit] == BitReq::One)
            .count();
        let score = zeros.min(ones);
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, bit));
        }
    }

    match best {
        // no separating bit is left; the leaf tries the rest in turn
        None | Some((0, _)) => DecoderTree::Leaf(indices),
        Some((_, bit)) => {
            let zeros: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| contexts[i].bits[bit] != BitReq::One)
                .collect();
            let ones: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| contexts[i].bits[bit] != BitReq::Zero)
                .collect();
            DecoderTree::Branch {
                bit,
                zeros: Box::new(split(contexts, zeros, tested | 1 << bit)),
                ones: Box::new(split(contexts, ones, tested | 1 << bit)),
            }
        }
    }
}

impl DecoderTree {
    pub fn depth(&self) -> usize {
        match self {
            DecoderTree::Leaf(_) => 0,
            DecoderTree::Branch { zeros, ones, .. } => 1 + zeros.depth().max(ones.depth()),
        }
    }

    /// Evaluates the tree the way the generated C does: walk the bit tests,
    /// sum the leaf's context calls, `-1` when none fired.
    pub fn decode(&self, contexts: &[DecodeContext], input: &[u8; 15]) -> i32 {
        match self {
            DecoderTree::Leaf(list) => {
                let sum: i32 = list
                    .iter()
                    .map(|&i| {
                        if contexts[i].matches(input) {
                            contexts[i].length as i32
                        } else {
                            0
                        }
                    })
                    .sum();
                if sum != 0 {
                    sum
                } else {
                    -1
                }
            }
            DecoderTree::Branch { bit, zeros, ones } => {
                if input[bit / 8] >> (bit % 8) & 1 == 1 {
                    ones.decode(contexts, input)
                } else {
                    zeros.decode(contexts, input)
                }
            }
        }
    }
}

/// Emits the standalone C decoder: one predicate function per context and
/// the `circuit_decode` entry point walking the tree.
pub fn emit_c(
    contexts: &[DecodeContext],
    tree: &DecoderTree,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "#include <stdint.h>")?;
    writeln!(out)?;
    for ctx in contexts {
        emit_context_fn(ctx, out)?;
    }

    writeln!(
        out,
        "int circuit_decode(const uint8_t input[15]) {{"
    )?;
    writeln!(out, "    uint64_t first8bytes = 0;")?;
    writeln!(out, "    uint64_t second8bytes = 0;")?;
    writeln!(out, "    for (int i = 0; i < 8; i++) {{")?;
    writeln!(
        out,
        "        first8bytes += ((uint64_t)input[i]) << (8 * i);"
    )?;
    writeln!(out, "    }}")?;
    writeln!(out, "    for (int i = 8; i < 15; i++) {{")?;
    writeln!(
        out,
        "        second8bytes += ((uint64_t)input[i]) << (8 * (i - 8));"
    )?;
    writeln!(out, "    }}")?;
    emit_tree(contexts, tree, 1, out)?;
    writeln!(out, "}}")
}

/// The declaration for a consuming header.
pub fn emit_c_header(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "#include <stdint.h>")?;
    writeln!(out)?;
    writeln!(out, "int circuit_decode(const uint8_t input[15]);")
}

fn emit_context_fn(ctx: &DecodeContext, out: &mut dyn Write) -> io::Result<()> {
    let words = ctx.words();
    let args = ["first8bytes", "second8bytes"];

    writeln!(
        out,
        "static int {}(uint64_t first8bytes, uint64_t second8bytes) {{",
        ctx.name
    )?;

    // force the don't-care bits on, so one comparison per word suffices
    for (arg, &(_, dont_care)) in args.iter().zip(&words) {
        if dont_care != 0 && dont_care != u64::MAX {
            writeln!(out, "    {} |= 0x{:016x}ULL;", arg, dont_care)?;
        }
    }

    let mut compares = Vec::new();
    for (arg, &(required, dont_care)) in args.iter().zip(&words) {
        if dont_care == u64::MAX {
            continue;
        }
        compares.push(format!(
            "(({} ^ ~0x{:016x}ULL) == ~0x{:016x}ULL)",
            arg, required, dont_care
        ));
    }

    match compares.len() {
        0 => writeln!(out, "    return {};", ctx.length)?,
        1 => writeln!(out, "    return (int){} * {};", compares[0], ctx.length)?,
        _ => writeln!(
            out,
            "    return (int)({} && {}) * {};",
            compares[0], compares[1], ctx.length
        )?,
    }
    writeln!(out, "}}")?;
    writeln!(out)
}

fn emit_tree(
    contexts: &[DecodeContext],
    tree: &DecoderTree,
    depth: usize,
    out: &mut dyn Write,
) -> io::Result<()> {
    let indent = "    ".repeat(depth);
    match tree {
        DecoderTree::Leaf(list) if list.is_empty() => {
            writeln!(out, "{}return -1;", indent)
        }
        DecoderTree::Leaf(list) => {
            let calls: Vec<String> = list
                .iter()
                .map(|&i| format!("{}(first8bytes, second8bytes)", contexts[i].name))
                .collect();
            writeln!(out, "{}int result = {};", indent, calls.join(" + "))?;
            writeln!(out, "{}return result != 0 ? result : -1;", indent)
        }
        DecoderTree::Branch { bit, zeros, ones } => {
            writeln!(
                out,
                "{}if (input[{}] & (1u << {})) {{",
                indent,
                bit / 8,
                bit % 8
            )?;
            emit_tree(contexts, ones, depth + 1, out)?;
            writeln!(out, "{}}} else {{", indent)?;
            emit_tree(contexts, zeros, depth + 1, out)?;
            writeln!(out, "{}}}", indent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn context_from_byte(name: &str, byte: u8, length: u8) -> DecodeContext {
        let mut bits = [BitReq::DontCare; INPUT_BITS];
        for (k, req) in bits.iter_mut().take(8).enumerate() {
            *req = if byte >> k & 1 == 1 {
                BitReq::One
            } else {
                BitReq::Zero
            };
        }
        DecodeContext {
            name: name.into(),
            length,
            bits,
        }
    }

    #[test]
    fn word_masks_agree_with_the_bit_matcher() {
        let ctx = context_from_byte("c", 0x48, 1);
        let [(r0, d0), (r1, d1)] = ctx.words();
        assert_eq!(r0, 0x48);
        assert_eq!(d0, !0xffu64);
        assert_eq!(r1, 0);
        assert_eq!(d1, u64::MAX);

        let mut input = [0u8; 15];
        input[0] = 0x48;
        assert!(ctx.matches(&input));
        // replicate the generated comparison
        let w0 = u64::from(input[0]);
        let forced = w0 | d0;
        assert_eq!(forced ^ !r0, !d0);
    }

    #[test]
    fn distinguishing_bit_becomes_the_root() {
        let ctxs = vec![
            context_from_byte("a", 0x48, 1),
            context_from_byte("b", 0x49, 1),
        ];
        let tree = build_tree(&ctxs);
        match &tree {
            DecoderTree::Branch { bit, .. } => assert_eq!(*bit, 0),
            other => panic!("expected a branch, got {:?}", other),
        }

        let mut input = [0u8; 15];
        input[0] = 0x48;
        assert_eq!(tree.decode(&ctxs, &input), 1);
        input[0] = 0x49;
        assert_eq!(tree.decode(&ctxs, &input), 1);
        input[0] = 0x00;
        assert_eq!(tree.decode(&ctxs, &input), -1);
    }

    #[test]
    fn dont_care_contexts_land_in_both_subtrees() {
        let mut c = context_from_byte("c", 0, 2);
        // c constrains only bit 1, leaving the split bit free
        c.bits = [BitReq::DontCare; INPUT_BITS];
        c.bits[1] = BitReq::One;
        let ctxs = vec![
            context_from_byte("a", 0x48, 1),
            context_from_byte("b", 0x49, 1),
            c,
        ];
        let tree = build_tree(&ctxs);
        match &tree {
            DecoderTree::Branch { bit, zeros, ones } => {
                assert_eq!(*bit, 0);
                assert!(contains_ctx(zeros, 2));
                assert!(contains_ctx(ones, 2));
            }
            other => panic!("expected a branch, got {:?}", other),
        }
    }

    fn contains_ctx(tree: &DecoderTree, index: usize) -> bool {
        match tree {
            DecoderTree::Leaf(list) => list.contains(&index),
            DecoderTree::Branch { zeros, ones, .. } => {
                contains_ctx(zeros, index) || contains_ctx(ones, index)
            }
        }
    }
}
