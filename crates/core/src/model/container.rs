use goblin::elf::section_header::{sht_to_str, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS};
use goblin::{elf, pe, Object};
use thiserror::Error;

use super::{ByteOrder, DynamicEntry, FileFormat, Isa, Module, Section, SectionFlags, Symbol};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to parse container: {0}")]
    Parse(#[from] goblin::error::Error),
    #[error("unsupported container: {0}")]
    Unsupported(String),
}

impl Module {
    /// Parse an ELF or PE image into a module.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, ContainerError> {
        let name = name.into();
        match Object::parse(bytes)? {
            Object::Elf(elf) => Ok(elf_module(name, &elf, bytes)),
            Object::PE(pe) => Ok(pe_module(name, &pe, bytes)),
            Object::Mach(_) => Err(ContainerError::Unsupported("Mach-O".into())),
            Object::Archive(_) => Err(ContainerError::Unsupported("archive".into())),
            _ => Err(ContainerError::Unsupported("unknown magic".into())),
        }
    }
}

fn elf_isa(machine: u16) -> Isa {
    match machine {
        elf::header::EM_X86_64 => Isa::X64,
        elf::header::EM_386 => Isa::Ia32,
        elf::header::EM_AARCH64 => Isa::Arm64,
        elf::header::EM_ARM => Isa::Arm,
        elf::header::EM_MIPS => Isa::Mips32,
        _ => Isa::Undefined,
    }
}

fn elf_binary_type(e_type: u16) -> Option<&'static str> {
    match e_type {
        elf::header::ET_EXEC => Some("EXEC"),
        elf::header::ET_DYN => Some("DYN"),
        elf::header::ET_REL => Some("REL"),
        _ => None,
    }
}

fn file_slice(bytes: &[u8], offset: u64, size: u64) -> Option<Vec<u8>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    bytes.get(start..end).map(<[u8]>::to_vec)
}

fn elf_module(name: String, elf: &elf::Elf, bytes: &[u8]) -> Module {
    let mut isa = elf_isa(elf.header.e_machine);
    if isa == Isa::Mips32 && elf.is_64 {
        isa = Isa::Mips64;
    }
    let byte_order = if elf.little_endian { ByteOrder::Little } else { ByteOrder::Big };
    let mut module = Module::new(name, FileFormat::Elf, isa, byte_order);

    module.binary_type = elf_binary_type(elf.header.e_type).map(|t| vec![t.to_string()]);
    if elf.entry != 0 {
        module.entry_point = Some(elf.entry);
    }
    module.preferred_address = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == elf::program_header::PT_LOAD)
        .map(|ph| ph.p_vaddr)
        .min()
        .unwrap_or(0);

    for sh in elf.section_headers.iter().skip(1) {
        let section_name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("").to_string();
        let nobits = sh.sh_type == SHT_NOBITS;
        let flags = SectionFlags {
            readable: sh.sh_flags & u64::from(SHF_ALLOC) != 0,
            writable: sh.sh_flags & u64::from(SHF_WRITE) != 0,
            executable: sh.sh_flags & u64::from(SHF_EXECINSTR) != 0,
            loaded: sh.sh_flags & u64::from(SHF_ALLOC) != 0,
            initialized: !nobits,
        };
        let section_bytes = if nobits { None } else { file_slice(bytes, sh.sh_offset, sh.sh_size) };
        module.sections.push(Section {
            name: section_name,
            address: sh.sh_addr,
            size: sh.sh_size,
            kind: sht_to_str(sh.sh_type).trim_start_matches("SHT_").to_string(),
            align: sh.sh_addralign,
            flags,
            bytes: section_bytes,
        });
    }

    let tables = [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)];
    for (symtab, strtab) in tables {
        for sym in symtab.iter() {
            let sym_name = strtab.get_at(sym.st_name).unwrap_or("");
            if sym_name.is_empty() {
                continue;
            }
            let defined = sym.st_shndx != elf::section_header::SHN_UNDEF as usize;
            module.add_symbol(Symbol {
                name: sym_name.to_string(),
                address: defined.then_some(sym.st_value),
                size: sym.st_size,
                kind: elf::sym::type_to_str(sym.st_type()).to_string(),
                binding: elf::sym::bind_to_str(sym.st_bind()).to_string(),
                visibility: elf::sym::visibility_to_str(sym.st_visibility()).to_string(),
                section_index: sym.st_shndx as u64,
            });
        }
    }

    if let Some(dynamic) = &elf.dynamic {
        for dyn_entry in &dynamic.dyns {
            if dyn_entry.d_tag == elf::dynamic::DT_NULL {
                continue;
            }
            module.dynamic_entries.push(DynamicEntry {
                tag: elf::dynamic::tag_to_str(dyn_entry.d_tag).trim_start_matches("DT_").to_string(),
                value: dyn_entry.d_val,
            });
        }
    }

    module
}

fn pe_isa(machine: u16) -> Isa {
    match machine {
        pe::header::COFF_MACHINE_X86 => Isa::Ia32,
        pe::header::COFF_MACHINE_X86_64 => Isa::X64,
        pe::header::COFF_MACHINE_ARM => Isa::Arm,
        pe::header::COFF_MACHINE_ARM64 => Isa::Arm64,
        _ => Isa::Undefined,
    }
}

fn pe_module(name: String, pe: &pe::PE, bytes: &[u8]) -> Module {
    use pe::section_table::{
        IMAGE_SCN_CNT_UNINITIALIZED_DATA, IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ,
        IMAGE_SCN_MEM_WRITE,
    };

    let isa = pe_isa(pe.header.coff_header.machine);
    let mut module = Module::new(name, FileFormat::Pe, isa, ByteOrder::Little);
    let image_base = pe.image_base as u64;
    module.preferred_address = image_base;
    module.entry_point = Some(image_base + pe.entry as u64);
    module.binary_type = Some(vec![if pe.is_lib { "DLL" } else { "EXEC" }.to_string()]);

    for sec in &pe.sections {
        let characteristics = sec.characteristics;
        let uninitialized = characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0;
        let size = if sec.virtual_size == 0 { sec.size_of_raw_data } else { sec.virtual_size };
        let raw_len = u64::from(sec.size_of_raw_data.min(size));
        module.sections.push(Section {
            name: sec.name().unwrap_or_default().to_string(),
            address: image_base + u64::from(sec.virtual_address),
            size: u64::from(size),
            kind: if uninitialized { "NOBITS" } else { "PROGBITS" }.to_string(),
            align: 1,
            flags: SectionFlags {
                readable: characteristics & IMAGE_SCN_MEM_READ != 0,
                writable: characteristics & IMAGE_SCN_MEM_WRITE != 0,
                executable: characteristics & IMAGE_SCN_MEM_EXECUTE != 0,
                loaded: true,
                initialized: !uninitialized,
            },
            bytes: if uninitialized {
                None
            } else {
                file_slice(bytes, u64::from(sec.pointer_to_raw_data), raw_len)
            },
        });
    }

    for export in &pe.exports {
        let Some(export_name) = export.name else { continue };
        if export.rva == 0 || export_name.is_empty() {
            continue;
        }
        module.add_symbol(Symbol {
            name: export_name.to_string(),
            address: Some(image_base + export.rva as u64),
            size: 0,
            kind: "NOTYPE".into(),
            binding: "GLOBAL".into(),
            visibility: "DEFAULT".into(),
            section_index: 0,
        });
    }

    module
}
