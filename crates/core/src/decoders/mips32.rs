use capstone::arch::mips::MipsOperand;
use capstone::arch::ArchOperand;
use capstone::prelude::*;
use capstone::Insn;

use super::{
    decode_one, intern_operands, raw_operand_count, record, DecodeOutcome, InstructionDecoder,
    OperandAccess,
};
use crate::facts::{FactStore, Instruction, InstructionFacts, Operand, OperandTable, NO_REGISTER};
use crate::loaders::{BuildLoader, Endian, Loader, LoaderError};
use crate::model::Module;

/// MIPS32 decoder.
pub struct Mips32Decoder {
    cs: Capstone,
}

impl Mips32Decoder {
    pub fn new(endian: Endian) -> Result<Self, LoaderError> {
        let endian = match endian {
            Endian::Big => capstone::Endian::Big,
            Endian::Little => capstone::Endian::Little,
        };
        let cs = Capstone::new()
            .mips()
            .mode(arch::mips::ArchMode::Mips32)
            .endian(endian)
            .detail(true)
            .build()
            .map_err(LoaderError::capstone)?;
        Ok(Self { cs })
    }

    fn build_instruction(&self, operands: &mut OperandTable, insn: &Insn<'_>) -> DecodeOutcome {
        let mnemonic = insn.mnemonic().unwrap_or("").to_uppercase();
        let mut indices = Vec::new();

        if mnemonic != "NOP" {
            let Ok(detail) = self.cs.insn_detail(insn) else {
                return DecodeOutcome::Invalid;
            };
            let mut normalized = Vec::new();
            for op in detail.arch_detail().operands() {
                let ArchOperand::MipsOperand(op) = op else {
                    return DecodeOutcome::Invalid;
                };
                match self.build_operand(&op) {
                    Some(operand) => normalized.push(operand),
                    None => return DecodeOutcome::Invalid,
                }
            }
            indices = intern_operands(operands, normalized);
        }

        DecodeOutcome::Decoded(Instruction {
            address: insn.address(),
            size: insn.bytes().len() as u64,
            prefix: String::new(),
            mnemonic,
            operands: indices,
            code1: 0,
            code2: 0,
        })
    }

    fn build_operand(&self, op: &MipsOperand) -> Option<Operand> {
        match op {
            MipsOperand::Reg(reg) => Some(Operand::Register(super::register_name(&self.cs, *reg))),
            MipsOperand::Imm(imm) => Some(Operand::Immediate(*imm)),
            MipsOperand::Mem(mem) => Some(Operand::Indirect {
                segment: NO_REGISTER.to_string(),
                base: super::register_name(&self.cs, mem.base()),
                index: NO_REGISTER.to_string(),
                scale: 1,
                displacement: mem.disp(),
                size: 32,
            }),
            _ => None,
        }
    }
}

impl InstructionDecoder for Mips32Decoder {
    fn step(&self) -> u64 {
        4
    }

    fn decode(&self, facts: &mut InstructionFacts, bytes: &[u8], address: u64) {
        let outcome =
            decode_one(&self.cs, bytes, address, |insn| self.build_instruction(&mut facts.operands, insn));
        record(facts, outcome, address);
    }

    fn operand_count(&self, bytes: &[u8], address: u64) -> Option<u8> {
        raw_operand_count(&self.cs, bytes, address)
    }

    fn operand_access(&self, _bytes: &[u8], _address: u64, _index: usize) -> OperandAccess {
        // Capstone reports no operand access information for MIPS.
        OperandAccess::Unsupported
    }
}

impl BuildLoader for Mips32Decoder {
    type Config = Endian;

    fn build(endian: Endian) -> Result<Self, LoaderError> {
        Self::new(endian)
    }
}

impl Loader for Mips32Decoder {
    fn populate(&self, module: &Module, facts: &mut FactStore) {
        super::decode_sections(self, module, facts);
    }
}
