use std::collections::HashMap;

use crate::facts::FactStore;
use crate::model::{ByteOrder, Module, Section};
use crate::row;

pub fn elf_symbol_loader(module: &Module, facts: &mut FactStore) {
    let rows = module.symbols.iter().filter_map(|sym| {
        let address = sym.address?;
        Some(row![
            address,
            sym.size,
            sym.kind.as_str(),
            sym.binding.as_str(),
            sym.visibility.as_str(),
            sym.section_index,
            sym.name.as_str()
        ])
    });
    facts.insert("elf_symbol", rows);
}

pub fn elf_dynamic_entry_loader(module: &Module, facts: &mut FactStore) {
    facts.insert(
        "dynamic_entry",
        module.dynamic_entries.iter().map(|entry| row![entry.tag.as_str(), entry.value]),
    );
}

/// CIE and FDE records from `.eh_frame`.
pub fn elf_exception_loader(module: &Module, facts: &mut FactStore) {
    let Some(section) = module.section_named(".eh_frame") else {
        return;
    };
    let Some(bytes) = section.bytes.as_deref() else {
        return;
    };
    let pointer_size = module.isa.pointer_width().map(|w| usize::from(w / 8)).unwrap_or(8);
    let frame = EhFrame {
        section,
        bytes,
        big_endian: module.byte_order == ByteOrder::Big,
        pointer_size,
    };
    let (cies, fdes) = frame.walk();
    facts.insert(
        "cie_encoding",
        cies.iter().map(|c| row![c.address, u64::from(c.fde_encoding), u64::from(c.lsda_encoding)]),
    );
    facts.insert("fde_addresses", fdes.iter().map(|(start, end)| row![*start, *end]));
}

const DW_EH_PE_ABSPTR: u8 = 0x00;
const DW_EH_PE_OMIT: u8 = 0xff;
const DW_EH_PE_PCREL: u8 = 0x10;
const DW_EH_PE_INDIRECT: u8 = 0x80;

#[derive(Debug, Clone, Copy)]
struct Cie {
    address: u64,
    fde_encoding: u8,
    lsda_encoding: u8,
}

struct EhFrame<'a> {
    section: &'a Section,
    bytes: &'a [u8],
    big_endian: bool,
    pointer_size: usize,
}

struct Cursor<'a> {
    frame: &'a EhFrame<'a>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.frame.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    fn unsigned(&mut self, n: usize) -> Option<u64> {
        let raw = self.take(n)?;
        let fold_be = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        Some(if self.frame.big_endian {
            raw.iter().fold(0, fold_be)
        } else {
            raw.iter().rev().fold(0, fold_be)
        })
    }

    fn signed(&mut self, n: usize) -> Option<u64> {
        let value = self.unsigned(n)?;
        let shift = 64 - 8 * n as u32;
        Some((((value << shift) as i64) >> shift) as u64)
    }

    fn uleb(&mut self) -> Option<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.take(1)?[0];
            if shift < 64 {
                result |= u64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                return Some(result);
            }
        }
    }

    fn sleb(&mut self) -> Option<i64> {
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.take(1)?[0];
            if shift < 64 {
                result |= i64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Some(result);
            }
        }
    }

    fn cstr(&mut self) -> Option<&'a [u8]> {
        let rest = self.frame.bytes.get(self.pos..)?;
        let len = rest.iter().position(|b| *b == 0)?;
        let out = &rest[..len];
        self.pos += len + 1;
        Some(out)
    }

    fn address(&self) -> u64 {
        self.frame.section.address.wrapping_add(self.pos as u64)
    }

    /// Read a pointer with DWARF exception-header encoding `encoding`.
    ///
    /// The indirect bit is ignored: the slot address is returned, not the
    /// pointer stored there.
    fn encoded(&mut self, encoding: u8) -> Option<u64> {
        if encoding == DW_EH_PE_OMIT {
            return None;
        }
        let encoding = encoding & !DW_EH_PE_INDIRECT;
        let field = self.address();
        let value = match encoding & 0x0f {
            0x00 => self.unsigned(self.frame.pointer_size)?,
            0x01 => self.uleb()?,
            0x02 => self.unsigned(2)?,
            0x03 => self.unsigned(4)?,
            0x04 => self.unsigned(8)?,
            0x09 => self.sleb()? as u64,
            0x0a => self.signed(2)?,
            0x0b => self.signed(4)?,
            0x0c => self.unsigned(8)?,
            _ => return None,
        };
        match encoding & 0x70 {
            0x00 => Some(value),
            DW_EH_PE_PCREL => Some(field.wrapping_add(value)),
            _ => None,
        }
    }
}

impl<'a> EhFrame<'a> {
    fn cursor(&'a self, pos: usize) -> Cursor<'a> {
        Cursor { frame: self, pos }
    }

    fn walk(&'a self) -> (Vec<Cie>, Vec<(u64, u64)>) {
        let mut cies: HashMap<usize, Cie> = HashMap::new();
        let mut cie_order = Vec::new();
        let mut fdes = Vec::new();
        let mut pos = 0usize;

        while pos + 4 <= self.bytes.len() {
            let record = pos;
            let mut cursor = self.cursor(pos);
            let Some(length) = cursor.unsigned(4) else { break };
            if length == 0 {
                break;
            }
            if length == 0xffff_ffff {
                log::warn!("64-bit .eh_frame records are not supported; stopping at {record:#x}");
                break;
            }
            let body = cursor.pos;
            let end = body + length as usize;
            if end > self.bytes.len() {
                log::warn!(".eh_frame record at {record:#x} overruns the section");
                break;
            }
            let Some(id) = cursor.unsigned(4) else { break };

            if id == 0 {
                match self.parse_cie(&mut cursor, record) {
                    Some(cie) => {
                        cies.insert(record, cie);
                        cie_order.push(cie);
                    }
                    None => {
                        log::warn!("malformed CIE at {record:#x}");
                        break;
                    }
                }
            } else {
                let cie = body.checked_sub(id as usize).and_then(|offset| cies.get(&offset));
                let Some(cie) = cie.copied() else {
                    log::warn!("FDE at {record:#x} references an unknown CIE");
                    break;
                };
                let begin = cursor.encoded(cie.fde_encoding);
                let range = cursor.encoded(cie.fde_encoding & 0x0f);
                match (begin, range) {
                    (Some(begin), Some(range)) => fdes.push((begin, begin.wrapping_add(range))),
                    _ => {
                        log::warn!("unsupported FDE pointer encoding {:#x}", cie.fde_encoding);
                        break;
                    }
                }
            }
            pos = end;
        }

        (cie_order, fdes)
    }

    fn parse_cie(&self, cursor: &mut Cursor<'_>, record: usize) -> Option<Cie> {
        let version = cursor.take(1)?[0];
        let augmentation = cursor.cstr()?;
        cursor.uleb()?;
        cursor.sleb()?;
        if version == 1 {
            cursor.take(1)?;
        } else {
            cursor.uleb()?;
        }

        let mut cie = Cie {
            address: self.section.address.wrapping_add(record as u64),
            fde_encoding: DW_EH_PE_ABSPTR,
            lsda_encoding: DW_EH_PE_OMIT,
        };
        if augmentation.first() != Some(&b'z') {
            return Some(cie);
        }
        cursor.uleb()?;
        for ch in &augmentation[1..] {
            match ch {
                b'R' => cie.fde_encoding = cursor.take(1)?[0],
                b'L' => cie.lsda_encoding = cursor.take(1)?[0],
                b'P' => {
                    let personality = cursor.take(1)?[0];
                    cursor.encoded(personality)?;
                }
                b'S' | b'B' => {}
                _ => break,
            }
        }
        Some(cie)
    }
}
