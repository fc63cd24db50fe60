//! DWARF line-table lookup.
//!
//! Resolves a program-counter address to a `(source file name, 1-based
//! line)` pair through the `.debug_line` section of the cross-compiled ELF,
//! the same association `addr2line` performs. Only exact line-program row
//! addresses match; an address between rows resolves to nothing, which the
//! preprocessor treats as "not attributable to an assembly line".

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use gimli::{EndianSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection};
use tracing::debug;

use crate::common::error::{Error, Result};

/// Resolves a hex program counter to a source file name and 1-based line.
///
/// `pc_address` is a hexadecimal string, with or without a `0x` prefix.
/// Returns `None` when the ELF carries no matching line-program entry.
///
/// # Errors
///
/// [`Error::Io`] when the ELF cannot be read, [`Error::Dwarf`] on a
/// malformed container, debug section, or PC string.
pub fn addr2line(elf_file: impl AsRef<Path>, pc_address: &str) -> Result<Option<(String, u64)>> {
    let elf_file = elf_file.as_ref();

    let address = u64::from_str_radix(pc_address.trim().trim_start_matches("0x"), 16)
        .map_err(|_| Error::Dwarf {
            path: elf_file.to_path_buf(),
            message: format!("program counter {pc_address:?} is not a hex address"),
        })?;

    let data = fs::read(elf_file).map_err(|e| Error::io(elf_file, e))?;
    let file = object::File::parse(&*data).map_err(|e| Error::Dwarf {
        path: elf_file.to_path_buf(),
        message: e.to_string(),
    })?;

    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let load_section = |id: SectionId| -> std::result::Result<Cow<'_, [u8]>, gimli::Error> {
        Ok(file
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[])))
    };

    let dwarf_sections = gimli::Dwarf::load(&load_section).map_err(|e| Error::Dwarf {
        path: elf_file.to_path_buf(),
        message: e.to_string(),
    })?;
    let dwarf = dwarf_sections.borrow(|section| EndianSlice::new(section, endian));

    let lookup = (|| -> std::result::Result<Option<(String, u64)>, gimli::Error> {
        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            let Some(program) = unit.line_program.clone() else {
                continue;
            };

            let mut rows = program.rows();
            while let Some((header, row)) = rows.next_row()? {
                if row.end_sequence() {
                    continue;
                }
                if row.address() != address {
                    continue;
                }

                let Some(file_entry) = row.file(header) else {
                    continue;
                };
                let name = dwarf
                    .attr_string(&unit, file_entry.path_name())?
                    .to_string_lossy()
                    .into_owned();
                let Some(line) = row.line() else {
                    continue;
                };

                return Ok(Some((name, line.get())));
            }
        }
        Ok(None)
    })()
    .map_err(|e| Error::Dwarf {
        path: elf_file.to_path_buf(),
        message: e.to_string(),
    })?;

    if lookup.is_none() {
        debug!(
            "address {pc_address} has no line-program entry in {}",
            elf_file.display()
        );
    }
    Ok(lookup)
}
