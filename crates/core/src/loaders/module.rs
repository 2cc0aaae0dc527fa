use super::{BuildLoader, Endian, Loader, LoaderError};
use crate::facts::FactStore;
use crate::model::{ByteOrder, FileFormat, Isa, Module};
use crate::row;

pub fn binary_format(format: FileFormat) -> &'static str {
    match format {
        FileFormat::Coff => "COFF",
        FileFormat::Elf => "ELF",
        FileFormat::Pe => "PE",
        FileFormat::IdaProDb32 => "IdaProDb32",
        FileFormat::IdaProDb64 => "IdaProDb64",
        FileFormat::Xcoff => "XCOFF",
        FileFormat::MachO => "MACHO",
        FileFormat::Raw => "RAW",
        FileFormat::Undefined => "Undefined",
    }
}

pub fn binary_isa(isa: Isa) -> &'static str {
    match isa {
        Isa::Ia32 => "X86",
        Isa::X64 => "X64",
        Isa::Arm => "ARM",
        Isa::Arm64 => "ARM64",
        Isa::Mips32 | Isa::Mips64 => "MIPS",
        Isa::Undefined => "Undefined",
    }
}

pub fn binary_endianness(byte_order: ByteOrder) -> &'static str {
    match byte_order {
        ByteOrder::Big => "BE",
        ByteOrder::Little => "LE",
        ByteOrder::Undefined => "Undefined",
    }
}

/// Binary type from container metadata.
///
/// Missing metadata defaults to `EXEC`; metadata that is present but empty
/// yields `Undefined`.
pub fn binary_type(module: &Module) -> String {
    match &module.binary_type {
        None => "EXEC".to_string(),
        Some(types) => types.first().cloned().unwrap_or_else(|| "Undefined".to_string()),
    }
}

/// Module-level scalar facts: type, format, ISA, base address, entry point, endianness.
pub fn module_loader(module: &Module, facts: &mut FactStore) {
    facts.insert_row("binary_type", row![binary_type(module)]);
    facts.insert_row("binary_format", row![binary_format(module.file_format)]);
    facts.insert_row("binary_isa", row![binary_isa(module.isa)]);
    facts.insert_row("base_address", row![module.preferred_address]);
    facts.insert_row("entry_point", row![module.entry_point.unwrap_or(0)]);
    facts.insert_row("endianness", row![binary_endianness(module.byte_order)]);
}

pub fn section_loader(module: &Module, facts: &mut FactStore) {
    let mut sections = Vec::with_capacity(module.sections.len());
    let mut properties = Vec::new();
    for section in &module.sections {
        sections.push(row![
            section.name.as_str(),
            section.size,
            section.address,
            section.kind.as_str(),
            section.align
        ]);
        let flags = [
            ("Readable", section.flags.readable),
            ("Writable", section.flags.writable),
            ("Executable", section.flags.executable),
            ("Loaded", section.flags.loaded),
            ("Initialized", section.flags.initialized),
        ];
        for (property, set) in flags {
            if set {
                properties.push(row![section.name.as_str(), property]);
            }
        }
    }
    facts.insert("section", sections);
    facts.insert("section_property", properties);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSize {
    Dword = 4,
    Qword = 8,
}

/// Data bytes of loaded, initialized, non-executable sections, and the
/// pointer-sized values in them that land inside loaded sections.
#[derive(Debug, Clone, Copy)]
pub struct DataLoader {
    pointer: PointerSize,
    endian: Endian,
}

impl DataLoader {
    pub fn new(pointer: PointerSize, endian: Endian) -> Self {
        Self { pointer, endian }
    }

    fn read_pointer(&self, window: &[u8]) -> u64 {
        let fold_be = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        match self.endian {
            Endian::Big => window.iter().fold(0, fold_be),
            Endian::Little => window.iter().rev().fold(0, fold_be),
        }
    }
}

impl BuildLoader for DataLoader {
    type Config = (PointerSize, Endian);

    fn build((pointer, endian): Self::Config) -> Result<Self, LoaderError> {
        Ok(Self::new(pointer, endian))
    }
}

impl Loader for DataLoader {
    fn populate(&self, module: &Module, facts: &mut FactStore) {
        let width = self.pointer as usize;
        let mut data_bytes = Vec::new();
        let mut addresses = Vec::new();

        for section in &module.sections {
            if section.flags.executable || !section.flags.loaded || !section.flags.initialized {
                continue;
            }
            let Some(bytes) = section.bytes.as_deref() else {
                log::warn!("section {} is initialized but has no bytes", section.name);
                continue;
            };
            for (offset, byte) in bytes.iter().enumerate() {
                data_bytes.push(row![section.address.wrapping_add(offset as u64), u64::from(*byte)]);
            }
            for (offset, window) in bytes.windows(width).enumerate() {
                let value = self.read_pointer(window);
                let lands_in_section =
                    module.sections.iter().any(|s| s.flags.loaded && s.contains(value));
                if lands_in_section {
                    addresses.push(row![section.address.wrapping_add(offset as u64), value]);
                }
            }
        }

        log::debug!(
            "data loader: {} bytes, {} candidate pointers",
            data_bytes.len(),
            addresses.len()
        );
        facts.insert("data_byte", data_bytes);
        facts.insert("address_in_data", addresses);
    }
}
