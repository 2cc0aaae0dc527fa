use capstone::arch::x86::{X86Operand, X86OperandType};
use capstone::arch::ArchOperand;
use capstone::prelude::*;
use capstone::{Insn, RegAccessType};

use super::{
    decode_one, intern_operands, raw_operand_count, record, register_name, DecodeOutcome,
    InstructionDecoder, OperandAccess,
};
use crate::facts::{FactStore, Instruction, InstructionFacts, Operand, OperandTable};
use crate::loaders::{BuildLoader, Loader, LoaderError};
use crate::model::Module;

/// x86-64 decoder (Intel operand order, destination first).
pub struct X64Decoder {
    cs: Capstone,
}

/// Split capstone's `"rep movsb"` style mnemonics into prefix and mnemonic.
pub fn split_prefix(raw: &str) -> (String, String) {
    match raw.trim().split_once(' ') {
        Some((prefix, rest)) => (prefix.to_uppercase(), rest.trim().to_uppercase()),
        None => (String::new(), raw.trim().to_uppercase()),
    }
}

impl X64Decoder {
    pub fn new() -> Result<Self, LoaderError> {
        let cs = Capstone::new()
            .x86()
            .mode(arch::x86::ArchMode::Mode64)
            .syntax(arch::x86::ArchSyntax::Intel)
            .detail(true)
            .build()
            .map_err(LoaderError::capstone)?;
        Ok(Self { cs })
    }

    fn build_instruction(&self, operands: &mut OperandTable, insn: &Insn<'_>) -> DecodeOutcome {
        let Ok(detail) = self.cs.insn_detail(insn) else {
            return DecodeOutcome::Invalid;
        };
        let mut normalized = Vec::new();
        for op in detail.arch_detail().operands() {
            let ArchOperand::X86Operand(op) = op else {
                return DecodeOutcome::Invalid;
            };
            match self.build_operand(&op) {
                Some(operand) => normalized.push(operand),
                None => return DecodeOutcome::Invalid,
            }
        }

        let (prefix, mnemonic) = split_prefix(insn.mnemonic().unwrap_or(""));
        DecodeOutcome::Decoded(Instruction {
            address: insn.address(),
            size: insn.bytes().len() as u64,
            prefix,
            mnemonic,
            operands: intern_operands(operands, normalized),
            code1: 0,
            code2: 0,
        })
    }

    fn build_operand(&self, op: &X86Operand) -> Option<Operand> {
        match &op.op_type {
            X86OperandType::Reg(reg) => Some(Operand::Register(register_name(&self.cs, *reg))),
            X86OperandType::Imm(imm) => Some(Operand::Immediate(*imm)),
            X86OperandType::Mem(mem) => Some(Operand::Indirect {
                segment: register_name(&self.cs, mem.segment()),
                base: register_name(&self.cs, mem.base()),
                index: register_name(&self.cs, mem.index()),
                scale: i64::from(mem.scale()),
                displacement: mem.disp(),
                size: u64::from(op.size) * 8,
            }),
            _ => None,
        }
    }
}

impl InstructionDecoder for X64Decoder {
    fn step(&self) -> u64 {
        1
    }

    fn decode(&self, facts: &mut InstructionFacts, bytes: &[u8], address: u64) {
        let outcome = decode_one(&self.cs, bytes, address, |insn| {
            self.build_instruction(&mut facts.operands, insn)
        });
        record(facts, outcome, address);
    }

    fn operand_count(&self, bytes: &[u8], address: u64) -> Option<u8> {
        raw_operand_count(&self.cs, bytes, address)
    }

    /// `index` counts operands in capstone's order, destination first.
    fn operand_access(&self, bytes: &[u8], address: u64, index: usize) -> OperandAccess {
        let Ok(insns) = self.cs.disasm_count(bytes, address, 1) else {
            return OperandAccess::Unsupported;
        };
        let Some(insn) = insns.iter().next() else {
            return OperandAccess::Unsupported;
        };
        let Ok(detail) = self.cs.insn_detail(insn) else {
            return OperandAccess::Unsupported;
        };
        match detail.arch_detail().operands().into_iter().nth(index) {
            Some(ArchOperand::X86Operand(op)) => match op.access {
                Some(RegAccessType::ReadOnly) => OperandAccess::Read,
                Some(RegAccessType::WriteOnly) => OperandAccess::Write,
                Some(RegAccessType::ReadWrite) => OperandAccess::ReadWrite,
                None => OperandAccess::Unsupported,
            },
            _ => OperandAccess::Unsupported,
        }
    }
}

impl BuildLoader for X64Decoder {
    type Config = ();

    fn build(_: ()) -> Result<Self, LoaderError> {
        Self::new()
    }
}

impl Loader for X64Decoder {
    fn populate(&self, module: &Module, facts: &mut FactStore) {
        super::decode_sections(self, module, facts);
    }
}
