//! In-memory container/IR module.
//!
//! Loaders only read a [`Module`]; transform stages of analysis passes are the
//! only code allowed to mutate it. Containers are built either from raw bytes
//! ([`Module::raw`]) or by parsing an executable image ([`Module::from_bytes`]).

mod container;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use container::ContainerError;

/// Container file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileFormat {
    Coff,
    Elf,
    Pe,
    IdaProDb32,
    IdaProDb64,
    Xcoff,
    MachO,
    Raw,
    Undefined,
}

/// Instruction set of the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Isa {
    Ia32,
    X64,
    Arm,
    Arm64,
    Mips32,
    Mips64,
    Undefined,
}

impl Isa {
    /// Native pointer width in bits, if the ISA is known.
    pub fn pointer_width(self) -> Option<u8> {
        match self {
            Isa::Ia32 | Isa::Arm | Isa::Mips32 => Some(32),
            Isa::X64 | Isa::Arm64 | Isa::Mips64 => Some(64),
            Isa::Undefined => None,
        }
    }

    /// Parse the names accepted on the command line (`mips32`, `arm`, `x64`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "ia32" => Some(Isa::Ia32),
            "x64" | "x86_64" | "amd64" => Some(Isa::X64),
            "arm" | "arm32" | "armv7" => Some(Isa::Arm),
            "arm64" | "aarch64" => Some(Isa::Arm64),
            "mips" | "mips32" => Some(Isa::Mips32),
            "mips64" => Some(Isa::Mips64),
            _ => None,
        }
    }
}

/// Byte order of the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ByteOrder {
    Big,
    Little,
    Undefined,
}

/// Section flags as seen by the fact loaders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFlags {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub loaded: bool,
    pub initialized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub address: u64,
    pub size: u64,
    /// Container-specific section type (`PROGBITS`, `NOBITS`, ...).
    pub kind: String,
    pub align: u64,
    pub flags: SectionFlags,
    /// Initialized contents; `None` for zero-fill sections.
    pub bytes: Option<Vec<u8>>,
}

impl Section {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address - self.address < self.size
    }

    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub address: Option<u64>,
    pub size: u64,
    /// `FUNC`, `OBJECT`, `NOTYPE`, ...
    pub kind: String,
    /// `GLOBAL`, `LOCAL`, `WEAK`, ...
    pub binding: String,
    pub visibility: String,
    pub section_index: u64,
}

impl Symbol {
    /// A defined global function symbol, as created by transforms.
    pub fn function(name: impl Into<String>, address: u64) -> Self {
        Self {
            name: name.into(),
            address: Some(address),
            size: 0,
            kind: "FUNC".into(),
            binding: "GLOBAL".into(),
            visibility: "DEFAULT".into(),
            section_index: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicEntry {
    /// Tag name without the `DT_` prefix (`NEEDED`, `INIT`, ...).
    pub tag: String,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub address: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: u64,
    pub to: u64,
    /// `fallthrough`, `branch`, `call`, `return`, ...
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Function {
    pub entry: u64,
    pub blocks: Vec<u64>,
}

/// Externally owned binary document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub file_format: FileFormat,
    pub isa: Isa,
    pub byte_order: ByteOrder,
    pub preferred_address: u64,
    pub entry_point: Option<u64>,
    /// Binary type metadata: `None` when the container carries none at all.
    pub binary_type: Option<Vec<String>>,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    pub dynamic_entries: Vec<DynamicEntry>,
    pub code_blocks: BTreeMap<u64, CodeBlock>,
    pub cfg_edges: Vec<CfgEdge>,
    pub functions: BTreeMap<u64, Function>,
}

impl Module {
    pub fn new(name: impl Into<String>, file_format: FileFormat, isa: Isa, byte_order: ByteOrder) -> Self {
        Self {
            name: name.into(),
            file_format,
            isa,
            byte_order,
            preferred_address: 0,
            entry_point: None,
            binary_type: None,
            sections: Vec::new(),
            symbols: Vec::new(),
            dynamic_entries: Vec::new(),
            code_blocks: BTreeMap::new(),
            cfg_edges: Vec::new(),
            functions: BTreeMap::new(),
        }
    }

    /// Build a RAW container holding `bytes` as one executable section at `base`.
    pub fn raw(bytes: impl Into<Vec<u8>>, isa: Isa, byte_order: ByteOrder, base: u64) -> Self {
        let bytes = bytes.into();
        let mut module = Self::new("raw", FileFormat::Raw, isa, byte_order);
        module.preferred_address = base;
        module.sections.push(Section {
            name: ".text".into(),
            address: base,
            size: bytes.len() as u64,
            kind: "PROGBITS".into(),
            align: 1,
            flags: SectionFlags {
                readable: true,
                writable: false,
                executable: true,
                loaded: true,
                initialized: true,
            },
            bytes: Some(bytes),
        });
        module
    }

    pub fn with_entry_point(mut self, address: u64) -> Self {
        self.entry_point = Some(address);
        self
    }

    /// Target descriptor used to select the loader pipeline.
    pub fn target_descriptor(&self) -> crate::targets::TargetDescriptor {
        crate::targets::TargetDescriptor {
            format: self.file_format,
            isa: self.isa,
            byte_order: self.byte_order,
            pointer_width: self.isa.pointer_width().unwrap_or(0),
        }
    }

    pub fn section_named(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn section_containing(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.contains(address))
    }

    /// Initialized bytes starting at `address`, clamped to `len` and to the
    /// end of the containing section.
    pub fn bytes_at(&self, address: u64, len: usize) -> Option<&[u8]> {
        let section = self.section_containing(address)?;
        let bytes = section.bytes.as_deref()?;
        let start = usize::try_from(address - section.address).ok()?;
        if start >= bytes.len() {
            return None;
        }
        let end = start.saturating_add(len).min(bytes.len());
        Some(&bytes[start..end])
    }

    pub fn symbol_at(&self, address: u64) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.address == Some(address))
    }

    pub fn add_code_block(&mut self, address: u64, size: u64) {
        self.code_blocks.insert(address, CodeBlock { address, size });
    }

    pub fn add_cfg_edge(&mut self, from: u64, to: u64, kind: impl Into<String>) {
        let edge = CfgEdge { from, to, kind: kind.into() };
        if !self.cfg_edges.contains(&edge) {
            self.cfg_edges.push(edge);
        }
    }

    /// Drop the fall-through edges leaving `block`. Returns how many were removed.
    pub fn remove_fallthrough_edges(&mut self, block: u64) -> usize {
        let before = self.cfg_edges.len();
        self.cfg_edges.retain(|e| !(e.from == block && e.kind == "fallthrough"));
        before - self.cfg_edges.len()
    }

    /// Add a symbol unless one with the same name already sits at the same address.
    pub fn add_symbol(&mut self, symbol: Symbol) {
        let exists =
            self.symbols.iter().any(|s| s.name == symbol.name && s.address == symbol.address);
        if !exists {
            self.symbols.push(symbol);
        }
    }

    pub fn add_function(&mut self, entry: u64) -> &mut Function {
        self.functions.entry(entry).or_insert_with(|| Function { entry, blocks: Vec::new() })
    }
}
