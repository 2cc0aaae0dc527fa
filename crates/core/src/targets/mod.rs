//! Target pipeline registry.
//!
//! Each supported `(format, ISA, byte order, pointer width)` combination maps
//! to a [`TargetSpec`] describing which loaders its pipeline runs and which
//! rule program consumes the facts. The registry is read-only configuration:
//! every lookup assembles a fresh [`CompositeLoader`] with its own decoder
//! handles, so independent modules never share decoding state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decoders::{Arm32Decoder, Mips32Decoder, X64Decoder};
use crate::loaders::{
    elf_dynamic_entry_loader, elf_exception_loader, elf_symbol_loader, module_loader,
    raw_entry_loader, section_loader, CompositeLoader, DataLoader, Endian, LoaderError,
    PointerSize,
};
use crate::model::{ByteOrder, FileFormat, Isa};

/// Selects the loader pipeline and rule program for a module.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TargetDescriptor {
    pub format: FileFormat,
    pub isa: Isa,
    pub byte_order: ByteOrder,
    pub pointer_width: u8,
}

impl TargetDescriptor {
    pub const fn new(format: FileFormat, isa: Isa, byte_order: ByteOrder, pointer_width: u8) -> Self {
        Self { format, isa, byte_order, pointer_width }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            crate::loaders::binary_format(self.format),
            format!("{:?}", self.isa).to_uppercase(),
            crate::loaders::binary_endianness(self.byte_order),
            self.pointer_width
        )
    }
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("unsupported target {0}")]
    UnsupportedTarget(TargetDescriptor),
    #[error("failed to assemble pipeline {program}: {source}")]
    Assembly {
        program: String,
        #[source]
        source: LoaderError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    Mips32(Endian),
    Arm32(Endian),
    X64,
}

/// Container-specific loaders appended after the data loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatLoaders {
    Elf,
    Raw,
}

/// One registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub descriptor: TargetDescriptor,
    pub program: &'static str,
    pub decoder: DecoderKind,
    pub pointer: PointerSize,
    pub data_endian: Endian,
    pub format: FormatLoaders,
}

impl TargetSpec {
    /// Assemble the ordered loader pipeline for this target.
    ///
    /// Module and section loaders come first; the decoder relies on the
    /// section information they describe.
    pub fn assemble(&self) -> Result<CompositeLoader, LoaderError> {
        let mut loader = CompositeLoader::new(self.program);
        loader.add(module_loader);
        loader.add(section_loader);
        match self.decoder {
            DecoderKind::Mips32(endian) => loader.add_built::<Mips32Decoder>(endian)?,
            DecoderKind::Arm32(endian) => loader.add_built::<Arm32Decoder>(endian)?,
            DecoderKind::X64 => loader.add_built::<X64Decoder>(())?,
        };
        loader.add_built::<DataLoader>((self.pointer, self.data_endian))?;
        match self.format {
            FormatLoaders::Elf => {
                loader.add(elf_dynamic_entry_loader);
                loader.add(elf_symbol_loader);
                loader.add(elf_exception_loader);
            }
            FormatLoaders::Raw => {
                loader.add(raw_entry_loader);
            }
        }
        Ok(loader)
    }
}

const fn spec(
    format: FileFormat,
    isa: Isa,
    byte_order: ByteOrder,
    program: &'static str,
    decoder: DecoderKind,
) -> TargetSpec {
    let (width, pointer) = match isa {
        Isa::X64 | Isa::Arm64 | Isa::Mips64 => (64, PointerSize::Qword),
        _ => (32, PointerSize::Dword),
    };
    let data_endian = match byte_order {
        ByteOrder::Big => Endian::Big,
        _ => Endian::Little,
    };
    let format_loaders = match format {
        FileFormat::Raw => FormatLoaders::Raw,
        _ => FormatLoaders::Elf,
    };
    TargetSpec {
        descriptor: TargetDescriptor::new(format, isa, byte_order, width),
        program,
        decoder,
        pointer,
        data_endian,
        format: format_loaders,
    }
}

/// Targets registered by [`default_target_registry`].
pub const DEFAULT_TARGETS: &[TargetSpec] = &[
    spec(FileFormat::Elf, Isa::Mips32, ByteOrder::Big, "disasm_mips32", DecoderKind::Mips32(Endian::Big)),
    spec(FileFormat::Elf, Isa::Mips32, ByteOrder::Little, "disasm_mips32", DecoderKind::Mips32(Endian::Little)),
    spec(FileFormat::Elf, Isa::Arm, ByteOrder::Little, "disasm_arm32", DecoderKind::Arm32(Endian::Little)),
    spec(FileFormat::Elf, Isa::Arm, ByteOrder::Big, "disasm_arm32", DecoderKind::Arm32(Endian::Big)),
    spec(FileFormat::Elf, Isa::X64, ByteOrder::Little, "disasm_x64", DecoderKind::X64),
    spec(FileFormat::Raw, Isa::Mips32, ByteOrder::Big, "disasm_mips32", DecoderKind::Mips32(Endian::Big)),
    spec(FileFormat::Raw, Isa::Mips32, ByteOrder::Little, "disasm_mips32", DecoderKind::Mips32(Endian::Little)),
    spec(FileFormat::Raw, Isa::Arm, ByteOrder::Little, "disasm_arm32", DecoderKind::Arm32(Endian::Little)),
    spec(FileFormat::Raw, Isa::X64, ByteOrder::Little, "disasm_x64", DecoderKind::X64),
];

/// Registry of target pipelines; callers select by descriptor.
#[derive(Debug, Default, Clone)]
pub struct TargetRegistry {
    specs: BTreeMap<TargetDescriptor, TargetSpec>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self { specs: BTreeMap::new() }
    }

    pub fn register(&mut self, spec: TargetSpec) -> &mut Self {
        self.specs.insert(spec.descriptor, spec);
        self
    }

    pub fn get(&self, descriptor: &TargetDescriptor) -> Option<&TargetSpec> {
        self.specs.get(descriptor)
    }

    /// Assemble a fresh pipeline for `descriptor`.
    pub fn pipeline(&self, descriptor: &TargetDescriptor) -> Result<CompositeLoader, TargetError> {
        let spec = self.get(descriptor).ok_or(TargetError::UnsupportedTarget(*descriptor))?;
        spec.assemble()
            .map_err(|source| TargetError::Assembly { program: spec.program.to_string(), source })
    }

    pub fn specs(&self) -> impl Iterator<Item = &TargetSpec> {
        self.specs.values()
    }

    /// Sorted, de-duplicated rule program names.
    pub fn programs(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.specs.values().map(|s| s.program).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Registry populated with every built-in target.
pub fn default_target_registry() -> TargetRegistry {
    let mut registry = TargetRegistry::new();
    for spec in DEFAULT_TARGETS {
        registry.register(*spec);
    }
    registry
}
