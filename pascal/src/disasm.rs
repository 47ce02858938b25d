//! Disassembler.
use std::fmt::Write as FmtWrite;

use itertools::Itertools;

use crate::bytecode::{decode, Bytecode, Op};
use crate::compiler::types::SimpleType;

/// Renders one readable line per instruction word. The same format is
/// fed to the machine's debug callback and printed by the CLI `dis`
/// command.
pub struct Disassembler<'a> {
    code: &'a Bytecode,
}

impl<'a> Disassembler<'a> {
    pub fn new(code: &'a Bytecode) -> Self {
        Self { code }
    }

    pub fn line(&self, addr: usize) -> String {
        let mut out = String::new();
        let Some(&word) = self.code.istore.get(addr) else {
            return format!("{addr:04}: ???");
        };
        let (raw, a, b) = decode(word);

        let _ = match Op::from_byte(raw) {
            Some(op) => write!(out, "{addr:04}: {op} {a},{b}"),
            None => write!(out, "{addr:04}: ??? 0x{raw:02X}"),
        };

        // Show what an LDC pool operand actually loads.
        if Op::from_byte(raw) == Some(Op::Ldc) {
            let code = SimpleType::from_code(a);
            let show_pool = !matches!(code, Some(SimpleType::Boolean | SimpleType::Char));
            if show_pool {
                if let Some(value) = self.code.constants.get(b as usize) {
                    let _ = write!(out, " = {value}");
                }
            }
        }

        if let Some(comment) = self.code.comments.get(&addr) {
            let _ = write!(out, " ; {comment}");
        }
        out
    }

    /// The whole instruction store, one line per word.
    pub fn listing(&self) -> String {
        (0..self.code.istore.len())
            .map(|addr| self.line(addr))
            .join("\n")
    }
}
