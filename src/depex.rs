//! Dependency Expression (DEPEX) opcode stream.

use crate::error::{Error, Result};
use crate::guid::Guid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DepexOp {
    Before(Guid),
    After(Guid),
    Push(Guid),
    And,
    Or,
    Not,
    True,
    False,
    End,
    /// PEI-only "schedule on request": legal only as the first opcode.
    Sor,
}

const OP_BEFORE: u8 = 0x00;
const OP_AFTER: u8 = 0x01;
const OP_PUSH: u8 = 0x02;
const OP_AND: u8 = 0x03;
const OP_OR: u8 = 0x04;
const OP_NOT: u8 = 0x05;
const OP_TRUE: u8 = 0x06;
const OP_FALSE: u8 = 0x07;
const OP_END: u8 = 0x08;
const OP_SOR: u8 = 0x09;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DepEx {
    pub opcodes: Vec<DepexOp>,
}

impl DepEx {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut opcodes = Vec::new();
        let mut cursor = 0usize;
        loop {
            if cursor >= buf.len() {
                return Err(Error::DepexNoEnd);
            }
            let op = buf[cursor];
            cursor += 1;
            let parsed = match op {
                OP_BEFORE | OP_AFTER | OP_PUSH => {
                    if cursor + 16 > buf.len() {
                        return Err(Error::ShortBuffer { need: cursor + 16, have: buf.len() });
                    }
                    let guid = Guid::from_wire_bytes(buf[cursor..cursor + 16].try_into().unwrap());
                    cursor += 16;
                    match op {
                        OP_BEFORE => DepexOp::Before(guid),
                        OP_AFTER => DepexOp::After(guid),
                        _ => DepexOp::Push(guid),
                    }
                }
                OP_AND => DepexOp::And,
                OP_OR => DepexOp::Or,
                OP_NOT => DepexOp::Not,
                OP_TRUE => DepexOp::True,
                OP_FALSE => DepexOp::False,
                OP_SOR => DepexOp::Sor,
                OP_END => {
                    opcodes.push(DepexOp::End);
                    return Ok(Self { opcodes });
                }
                other => return Err(Error::BadSignature(depex_unknown_opcode_message(other))),
            };
            opcodes.push(parsed);
        }
    }

    pub fn validate(&self) -> Vec<crate::error::ValidationError> {
        use crate::error::ValidationError;
        let mut errors = Vec::new();
        if self.opcodes.last() != Some(&DepexOp::End) {
            errors.push(ValidationError::DepexNoEnd("DEPEX opcode stream does not end with END".into()));
        }
        if let Some(pos) = self.opcodes.iter().position(|op| *op == DepexOp::Sor) {
            if pos != 0 {
                errors.push(ValidationError::Other("DEPEX SOR opcode must be first if present".into()));
            }
        }
        if self.opcodes.iter().filter(|op| **op == DepexOp::End).count() != 1 {
            errors.push(ValidationError::Other("DEPEX opcode stream has more than one END".into()));
        }
        errors
    }

    pub fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for op in &self.opcodes {
            match op {
                DepexOp::Before(g) => {
                    out.push(OP_BEFORE);
                    out.extend_from_slice(&g.to_wire_bytes());
                }
                DepexOp::After(g) => {
                    out.push(OP_AFTER);
                    out.extend_from_slice(&g.to_wire_bytes());
                }
                DepexOp::Push(g) => {
                    out.push(OP_PUSH);
                    out.extend_from_slice(&g.to_wire_bytes());
                }
                DepexOp::And => out.push(OP_AND),
                DepexOp::Or => out.push(OP_OR),
                DepexOp::Not => out.push(OP_NOT),
                DepexOp::True => out.push(OP_TRUE),
                DepexOp::False => out.push(OP_FALSE),
                DepexOp::End => out.push(OP_END),
                DepexOp::Sor => out.push(OP_SOR),
            }
        }
        out
    }
}

fn depex_unknown_opcode_message(_op: u8) -> &'static str {
    "unrecognized DEPEX opcode"
}
