use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::FactStore;
use crate::row;

/// Register name used when a register slot is absent.
pub const NO_REGISTER: &str = "NONE";

/// Normalized, architecture-independent operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Register(String),
    Immediate(i64),
    Indirect {
        segment: String,
        base: String,
        index: String,
        scale: i64,
        displacement: i64,
        size: u64,
    },
}

/// Normalized instruction fact. Operands are indices into the [`OperandTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: u64,
    pub size: u64,
    pub prefix: String,
    pub mnemonic: String,
    pub operands: Vec<u64>,
    pub code1: u64,
    pub code2: u64,
}

/// Deduplicating operand store.
///
/// Indices start at 1 and grow by one per distinct operand; they are never
/// reused or reordered.
#[derive(Debug, Clone, Default)]
pub struct OperandTable {
    indices: HashMap<Operand, u64>,
    ordered: Vec<Operand>,
}

impl OperandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `operand`, assigning the next one if it was never seen.
    pub fn add(&mut self, operand: Operand) -> u64 {
        if let Some(index) = self.indices.get(&operand) {
            return *index;
        }
        let index = self.ordered.len() as u64 + 1;
        self.ordered.push(operand.clone());
        self.indices.insert(operand, index);
        index
    }

    pub fn get(&self, index: u64) -> Option<&Operand> {
        let slot = usize::try_from(index).ok()?.checked_sub(1)?;
        self.ordered.get(slot)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Operands with their indices, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Operand)> {
        self.ordered.iter().enumerate().map(|(i, op)| (i as u64 + 1, op))
    }
}

/// Decoder output for one module: instructions, invalid addresses, operands.
///
/// An address lives in at most one of the instruction table and the invalid
/// set.
#[derive(Debug, Clone, Default)]
pub struct InstructionFacts {
    instructions: BTreeMap<u64, Instruction>,
    invalid: BTreeSet<u64>,
    pub operands: OperandTable,
}

impl InstructionFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instruction: Instruction) {
        self.invalid.remove(&instruction.address);
        self.instructions.insert(instruction.address, instruction);
    }

    /// Record `address` as undecodable unless an instruction already lives there.
    pub fn invalid(&mut self, address: u64) {
        if !self.instructions.contains_key(&address) {
            self.invalid.insert(address);
        }
    }

    pub fn instruction(&self, address: u64) -> Option<&Instruction> {
        self.instructions.get(&address)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    pub fn invalid_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.invalid.iter().copied()
    }

    pub fn is_invalid(&self, address: u64) -> bool {
        self.invalid.contains(&address)
    }

    /// Append the decoded facts to `store` using the instruction relations.
    pub fn insert_into(&self, store: &mut FactStore) {
        store.insert(
            "instruction",
            self.instructions.values().map(|i| {
                row![
                    i.address,
                    i.size,
                    i.prefix.as_str(),
                    i.mnemonic.as_str(),
                    i.operands.clone(),
                    i.code1,
                    i.code2
                ]
            }),
        );
        store.insert("invalid_instruction", self.invalid.iter().map(|a| row![*a]));

        let mut registers = Vec::new();
        let mut immediates = Vec::new();
        let mut indirects = Vec::new();
        for (index, operand) in self.operands.iter() {
            match operand {
                Operand::Register(name) => registers.push(row![index, name.as_str()]),
                Operand::Immediate(value) => immediates.push(row![index, *value]),
                Operand::Indirect { segment, base, index: index_reg, scale, displacement, size } => {
                    indirects.push(row![
                        index,
                        segment.as_str(),
                        base.as_str(),
                        index_reg.as_str(),
                        *scale,
                        *displacement,
                        *size
                    ])
                }
            }
        }
        store.insert("operand_register", registers);
        store.insert("operand_immediate", immediates);
        store.insert("operand_indirect", indirects);
    }
}
