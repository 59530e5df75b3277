use std::io::{self, Read, Write};

use log::*;

use crate::circuit::{Circuit, OpId};
use crate::node::OpKind;
use crate::{Error, Result, Symbol};

const MAGIC: &[u8; 4] = b"CIRC";
const VERSION: u16 = 1;

fn tag_of(kind: &OpKind) -> u8 {
    use OpKind::*;
    match kind {
        InputRegister(_) => 1,
        OutputRegister(_) => 2,
        InputInstructionBits => 3,
        Advice => 4,
        Undefined => 5,
        Constant(_) => 6,
        Extract { .. } => 7,
        Concat => 8,
        Add => 9,
        Sub => 10,
        Mul => 11,
        And => 12,
        Or => 13,
        Xor => 14,
        Not => 15,
        Shl => 16,
        LShr => 17,
        AShr => 18,
        Popcount => 19,
        Parity => 20,
        ZeroExt => 21,
        SignExt => 22,
        Trunc => 23,
        Select => 24,
        Equal => 25,
        DecodeCondition => 26,
        RegConstraint => 27,
        VerifyInstruction => 28,
        Circuit => 29,
    }
}

/// Writes the circuit as tagged little-endian records, one per operation in
/// arena order. Operand references are arena indices; user edges are implied
/// and rebuilt on read.
pub fn serialize(circuit: &Circuit, out: &mut dyn Write) -> io::Result<()> {
    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&(circuit.len() as u32).to_le_bytes())?;
    out.write_all(&(usize::from(circuit.root()) as u32).to_le_bytes())?;

    for (_, op) in circuit.operations() {
        out.write_all(&[tag_of(&op.kind)])?;
        out.write_all(&op.width.to_le_bytes())?;
        match op.kind {
            OpKind::InputRegister(name) | OpKind::OutputRegister(name) => {
                write_str(out, name.as_str())?;
            }
            OpKind::Constant(bits) => write_str(out, bits.as_str())?,
            OpKind::Extract { low, high } => {
                out.write_all(&low.to_le_bytes())?;
                out.write_all(&high.to_le_bytes())?;
            }
            _ => {}
        }
        out.write_all(&(op.operands().len() as u32).to_le_bytes())?;
        for &operand in op.operands() {
            out.write_all(&(usize::from(operand) as u32).to_le_bytes())?;
        }
    }
    Ok(())
}

fn write_str(out: &mut dyn Write, s: &str) -> io::Result<()> {
    out.write_all(&(s.len() as u32).to_le_bytes())?;
    out.write_all(s.as_bytes())
}

/// A byte cursor that remembers its offset, so failures can name where they
/// happened.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn fail(&self, reason: impl Into<String>) -> Error {
        Error::Deserialize {
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.offset + n > self.bytes.len() {
            return Err(self.fail("unexpected end of input"));
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn str(&mut self) -> Result<Symbol> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| self.fail("string is not UTF-8"))?;
        Ok(Symbol::from(s))
    }
}

/// Reads a circuit back. Rejects unknown versions and record tags, naming
/// the tag and byte offset in the error.
pub fn deserialize(input: &mut dyn Read) -> Result<Circuit> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    let mut r = Reader {
        bytes: &bytes,
        offset: 0,
    };

    if r.take(4)? != MAGIC.as_slice() {
        return Err(r.fail("bad magic, not a circuit file"));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(r.fail(format!("unsupported version {}", version)));
    }
    let count = r.u32()? as usize;
    let root = r.u32()? as usize;
    if root >= count {
        return Err(r.fail(format!("root {} out of range", root)));
    }

    let mut circuit = Circuit::new();
    for index in 0..count {
        let record_offset = r.offset;
        let tag = r.u8()?;
        let width = r.u32()?;
        let kind = match tag {
            1 => OpKind::InputRegister(r.str()?),
            2 => OpKind::OutputRegister(r.str()?),
            3 => OpKind::InputInstructionBits,
            4 => OpKind::Advice,
            5 => OpKind::Undefined,
            6 => OpKind::Constant(r.str()?),
            7 => {
                let low = r.u32()?;
                let high = r.u32()?;
                OpKind::Extract { low, high }
            }
            8 => OpKind::Concat,
            9 => OpKind::Add,
            10 => OpKind::Sub,
            11 => OpKind::Mul,
            12 => OpKind::And,
            13 => OpKind::Or,
            14 => OpKind::Xor,
            15 => OpKind::Not,
            16 => OpKind::Shl,
            17 => OpKind::LShr,
            18 => OpKind::AShr,
            19 => OpKind::Popcount,
            20 => OpKind::Parity,
            21 => OpKind::ZeroExt,
            22 => OpKind::SignExt,
            23 => OpKind::Trunc,
            24 => OpKind::Select,
            25 => OpKind::Equal,
            26 => OpKind::DecodeCondition,
            27 => OpKind::RegConstraint,
            28 => OpKind::VerifyInstruction,
            29 => OpKind::Circuit,
            unknown => {
                return Err(Error::Deserialize {
                    offset: record_offset,
                    reason: format!("unknown operation tag {:#04x}", unknown),
                })
            }
        };

        let n_operands = r.u32()? as usize;
        let mut operands = Vec::with_capacity(n_operands);
        for _ in 0..n_operands {
            let operand = r.u32()? as usize;
            // the arena is written in construction order, so references
            // always point backwards
            if operand >= index {
                return Err(r.fail(format!(
                    "operation {} references operand {} ahead of it",
                    index, operand
                )));
            }
            operands.push(OpId::from(operand));
        }
        circuit.add(kind, width, &operands);
    }

    if r.offset != bytes.len() {
        return Err(r.fail("trailing bytes after last record"));
    }

    circuit.set_root(OpId::from(root));
    debug!("deserialized {} operations", count);
    Ok(circuit)
}
