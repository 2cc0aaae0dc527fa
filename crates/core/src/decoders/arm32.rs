use capstone::arch::arm::{ArmOperand, ArmOperandType};
use capstone::arch::ArchOperand;
use capstone::prelude::*;
use capstone::Insn;

use super::{
    decode_one, intern_operands, raw_operand_count, record, register_name, DecodeOutcome,
    InstructionDecoder, OperandAccess,
};
use crate::facts::{FactStore, Instruction, InstructionFacts, Operand, OperandTable, NO_REGISTER};
use crate::loaders::{BuildLoader, Endian, Loader, LoaderError};
use crate::model::Module;

/// ARM32 decoder covering both ARM and Thumb encodings.
///
/// ARM instructions are decoded at 4-byte aligned addresses. Thumb
/// instructions are decoded at every 2-byte aligned address and recorded with
/// the low address bit set, so the two never share an address.
pub struct Arm32Decoder {
    arm: Capstone,
    thumb: Capstone,
}

fn make_cs(mode: arch::arm::ArchMode, endian: Endian) -> Result<Capstone, LoaderError> {
    let endian = match endian {
        Endian::Big => capstone::Endian::Big,
        Endian::Little => capstone::Endian::Little,
    };
    Capstone::new()
        .arm()
        .mode(mode)
        .endian(endian)
        .detail(true)
        .build()
        .map_err(LoaderError::capstone)
}

impl Arm32Decoder {
    pub fn new(endian: Endian) -> Result<Self, LoaderError> {
        Ok(Self {
            arm: make_cs(arch::arm::ArchMode::Arm, endian)?,
            thumb: make_cs(arch::arm::ArchMode::Thumb, endian)?,
        })
    }

    /// Handle and real address for a possibly Thumb-tagged `address`.
    fn handle(&self, address: u64) -> (&Capstone, u64) {
        if address & 1 == 1 {
            (&self.thumb, address & !1)
        } else {
            (&self.arm, address)
        }
    }

    fn build_instruction(
        cs: &Capstone,
        operands: &mut OperandTable,
        insn: &Insn<'_>,
    ) -> DecodeOutcome {
        let Ok(detail) = cs.insn_detail(insn) else {
            return DecodeOutcome::Invalid;
        };
        let mut normalized = Vec::new();
        for op in detail.arch_detail().operands() {
            let ArchOperand::ArmOperand(op) = op else {
                return DecodeOutcome::Invalid;
            };
            match Self::build_operand(cs, &op) {
                Some(operand) => normalized.push(operand),
                None => return DecodeOutcome::Invalid,
            }
        }

        DecodeOutcome::Decoded(Instruction {
            address: insn.address(),
            size: insn.bytes().len() as u64,
            prefix: String::new(),
            mnemonic: insn.mnemonic().unwrap_or("").to_uppercase(),
            operands: intern_operands(operands, normalized),
            code1: 0,
            code2: 0,
        })
    }

    fn build_operand(cs: &Capstone, op: &ArmOperand) -> Option<Operand> {
        match &op.op_type {
            ArmOperandType::Reg(reg) | ArmOperandType::SysReg(reg) => {
                Some(Operand::Register(register_name(cs, *reg)))
            }
            ArmOperandType::Imm(imm) => Some(Operand::Immediate(i64::from(*imm))),
            ArmOperandType::Cimm(n) => Some(Operand::Register(format!("C{n}"))),
            ArmOperandType::Pimm(n) => Some(Operand::Register(format!("P{n}"))),
            ArmOperandType::Mem(mem) => Some(Operand::Indirect {
                segment: NO_REGISTER.to_string(),
                base: register_name(cs, mem.base()),
                index: register_name(cs, mem.index()),
                scale: i64::from(mem.scale()),
                displacement: i64::from(mem.disp()),
                size: 32,
            }),
            _ => None,
        }
    }
}

impl InstructionDecoder for Arm32Decoder {
    fn step(&self) -> u64 {
        2
    }

    fn decode(&self, facts: &mut InstructionFacts, bytes: &[u8], address: u64) {
        if address % 4 == 0 {
            let outcome = decode_one(&self.arm, bytes, address, |insn| {
                Self::build_instruction(&self.arm, &mut facts.operands, insn)
            });
            record(facts, outcome, address);
        }
        let outcome = decode_one(&self.thumb, bytes, address, |insn| {
            Self::build_instruction(&self.thumb, &mut facts.operands, insn)
        });
        record(facts, outcome, address | 1);
    }

    fn operand_count(&self, bytes: &[u8], address: u64) -> Option<u8> {
        let (cs, address) = self.handle(address);
        raw_operand_count(cs, bytes, address)
    }

    fn operand_access(&self, _bytes: &[u8], _address: u64, _index: usize) -> OperandAccess {
        // The capstone bindings expose no per-operand access for ARM.
        OperandAccess::Unsupported
    }
}

impl BuildLoader for Arm32Decoder {
    type Config = Endian;

    fn build(endian: Endian) -> Result<Self, LoaderError> {
        Self::new(endian)
    }
}

impl Loader for Arm32Decoder {
    fn populate(&self, module: &Module, facts: &mut FactStore) {
        super::decode_sections(self, module, facts);
    }
}
