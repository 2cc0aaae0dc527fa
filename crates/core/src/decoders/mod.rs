//! Instruction decoders.
//!
//! Each decoder wraps one capstone handle configured for an instruction set
//! and normalizes its output into [`Instruction`] and [`Operand`] facts.
//! The handle is opened when the decoder is built and released when it is
//! dropped.
//!
//! Instruction sets that report the destination as the first operand have
//! their operand list rotated left by one so the destination comes last.

mod arm32;
mod mips32;
mod x64;

use capstone::{Capstone, Insn, RegId};

use crate::facts::{
    FactStore, Instruction, InstructionFacts, Operand, OperandTable, NO_REGISTER,
};
use crate::model::Module;

pub use arm32::Arm32Decoder;
pub use mips32::Mips32Decoder;
pub use x64::{split_prefix, X64Decoder};

/// Result of normalizing one raw instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decoded(Instruction),
    Invalid,
}

/// Access mode of an operand, when the decoding library reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandAccess {
    Read,
    Write,
    ReadWrite,
    Unsupported,
}

/// Trait implemented by per-ISA decoders.
pub trait InstructionDecoder {
    /// Distance in bytes between candidate instruction addresses.
    fn step(&self) -> u64;

    /// Decode one instruction at `address` into `facts`; undecodable addresses
    /// are recorded as invalid.
    fn decode(&self, facts: &mut InstructionFacts, bytes: &[u8], address: u64);

    /// Number of operands the library reports for the instruction at `address`.
    fn operand_count(&self, bytes: &[u8], address: u64) -> Option<u8>;

    /// Access mode of operand `index`, or [`OperandAccess::Unsupported`] when
    /// the library cannot tell.
    fn operand_access(&self, bytes: &[u8], address: u64, index: usize) -> OperandAccess;
}

/// Canonical register name; register id 0 is the invalid register in every
/// capstone architecture.
pub(crate) fn register_name(cs: &Capstone, reg: RegId) -> String {
    if reg.0 == 0 {
        return NO_REGISTER.to_string();
    }
    cs.reg_name(reg).map(|n| n.to_uppercase()).unwrap_or_else(|| NO_REGISTER.to_string())
}

/// Run the decoding primitive once and normalize the result with `build`.
pub(crate) fn decode_one<F>(cs: &Capstone, bytes: &[u8], address: u64, build: F) -> DecodeOutcome
where
    F: FnOnce(&Insn<'_>) -> DecodeOutcome,
{
    match cs.disasm_count(bytes, address, 1) {
        Ok(insns) => match insns.iter().next() {
            Some(insn) => build(insn),
            None => DecodeOutcome::Invalid,
        },
        Err(_) => DecodeOutcome::Invalid,
    }
}

/// Intern normalized operands and apply the destination-last convention.
///
/// `operands` must already be fully normalized so a rejected instruction
/// never leaves entries behind in the table.
pub(crate) fn intern_operands(table: &mut OperandTable, operands: Vec<Operand>) -> Vec<u64> {
    let mut indices: Vec<u64> = operands.into_iter().map(|op| table.add(op)).collect();
    rotate_destination(&mut indices);
    indices
}

/// Move the first (destination) operand to the end.
pub fn rotate_destination(indices: &mut [u64]) {
    if indices.len() > 1 {
        indices.rotate_left(1);
    }
}

/// Operand count of the instruction at `address`, as reported by capstone.
pub(crate) fn raw_operand_count(cs: &Capstone, bytes: &[u8], address: u64) -> Option<u8> {
    let insns = cs.disasm_count(bytes, address, 1).ok()?;
    let insn = insns.iter().next()?;
    let detail = cs.insn_detail(insn).ok()?;
    u8::try_from(detail.arch_detail().operands().len()).ok()
}

/// Record an outcome, at `record_at` for decoders that tag addresses.
pub(crate) fn record(facts: &mut InstructionFacts, outcome: DecodeOutcome, record_at: u64) {
    match outcome {
        DecodeOutcome::Decoded(mut instruction) => {
            instruction.address = record_at;
            facts.add(instruction);
        }
        DecodeOutcome::Invalid => facts.invalid(record_at),
    }
}

/// Decode every candidate address of every executable section.
pub fn decode_sections<D>(decoder: &D, module: &Module, store: &mut FactStore)
where
    D: InstructionDecoder + ?Sized,
{
    let mut facts = InstructionFacts::new();
    let step = decoder.step().max(1);
    for section in module.sections.iter().filter(|s| s.flags.executable) {
        let Some(bytes) = section.bytes.as_deref() else {
            log::warn!("executable section {} has no bytes to decode", section.name);
            continue;
        };
        log::debug!("decoding {} ({} bytes) at {:#x}", section.name, bytes.len(), section.address);
        let mut offset = 0u64;
        while (offset as usize) < bytes.len() {
            let Some(address) = section.address.checked_add(offset) else {
                log::warn!("{} runs past the end of the address space", section.name);
                break;
            };
            decoder.decode(&mut facts, &bytes[offset as usize..], address);
            offset += step;
        }
    }
    facts.insert_into(store);
}
