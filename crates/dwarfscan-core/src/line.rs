//! # Line Program Headers
//!
//! Decode the header of a line-number program in `.debug_line`: the opcode
//! parameters, the include directories and the file table. The opcode stream
//! itself is not interpreted.
//!
//! DWARF 2 through 4 store directories and files as inline string lists;
//! DWARF 5 describes each entry with a list of (`DW_LNCT_*`, form) pairs, so
//! the entry fields go through the same form dispatch as DIE attributes.

use gimli::constants::{self, DwForm, DwLnct};
use gimli::Format;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{DwarfError, DwarfResult};
use crate::names::{string_for_form, string_for_lnct};
use crate::reader::{form_encoding, is_string_form, FormEncoding, SectionReader};
use crate::unit::length_end;

/// One entry of the directory or file table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry
{
    pub path: String,
    /// Index into the directory table
    pub directory_index: u64,
    pub modification_time: Option<u64>,
    pub size: Option<u64>,
    pub md5: Option<[u8; 16]>,
}

/// Header of one line-number program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineProgramHeader
{
    /// Offset of the program within `.debug_line`
    pub section_offset: u64,
    pub unit_length: u64,
    pub format: Format,
    pub version: u16,
    /// Only present in DWARF 5 headers
    pub address_size: Option<u8>,
    /// Only present in DWARF 5 headers
    pub segment_selector_size: Option<u8>,
    pub header_length: u64,
    pub minimum_instruction_length: u8,
    pub maximum_operations_per_instruction: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    /// Operand counts of standard opcodes `1..opcode_base`
    pub standard_opcode_lengths: Vec<u8>,
    pub include_directories: Vec<String>,
    pub files: Vec<FileEntry>,
    /// Absolute offset of the first opcode
    pub program_offset: u64,
    /// Absolute offset one past the program
    pub end: u64,
}

type EntryFormat = SmallVec<[(DwLnct, DwForm); 5]>;

impl LineProgramHeader
{
    /// Parse the header of the program `offset` bytes into `.debug_line`.
    ///
    /// `strings` and `line_strings` resolve `DW_FORM_strp` and
    /// `DW_FORM_line_strp` paths; pass disabled readers for tables the file
    /// lacks. On success `line` is narrowed to the program and positioned on
    /// its first opcode.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::UnsupportedVersion`] outside 2..=5,
    /// [`DwarfError::InvalidSetting`] for a zero `line_range` or
    /// `opcode_base` or an impossible entry count, and any reader error.
    pub fn parse(
        line: &mut SectionReader<'_>,
        offset: u64,
        strings: &mut SectionReader<'_>,
        line_strings: &mut SectionReader<'_>,
    ) -> DwarfResult<Self>
    {
        line.reset_end_offset()?;
        line.skip_to_section_offset(offset)?;

        let unit_length = line.read_initial_length()?;
        let end = length_end(line, unit_length)?;
        line.set_end_offset(end)?;
        let format = line.offset_size().ok_or(DwarfError::OffsetSizeUnknown)?;

        let version = line.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(DwarfError::UnsupportedVersion(version));
        }

        let (address_size, segment_selector_size) = if version >= 5 {
            (Some(line.read_address_size()?), Some(line.read_u8()?))
        } else {
            (None, None)
        };

        let header_length = line.read_section_offset()?;
        let program_offset = line.offset().saturating_add(header_length);

        let minimum_instruction_length = line.read_u8()?;
        let maximum_operations_per_instruction = if version >= 4 { line.read_u8()? } else { 1 };
        let default_is_stmt = line.read_u8()? != 0;
        let line_base = line.read_value::<i8>()?;

        let line_range = line.read_u8()?;
        if line_range == 0 {
            return Err(DwarfError::InvalidSetting {
                field: "line_range",
                value: 0,
            });
        }
        let opcode_base = line.read_u8()?;
        if opcode_base == 0 {
            return Err(DwarfError::InvalidSetting {
                field: "opcode_base",
                value: 0,
            });
        }

        let mut standard_opcode_lengths = vec![0; usize::from(opcode_base - 1)];
        line.read_bytes(&mut standard_opcode_lengths)?;

        let mut header = Self {
            section_offset: offset,
            unit_length,
            format,
            version,
            address_size,
            segment_selector_size,
            header_length,
            minimum_instruction_length,
            maximum_operations_per_instruction,
            default_is_stmt,
            line_base,
            line_range,
            opcode_base,
            standard_opcode_lengths,
            include_directories: Vec::new(),
            files: Vec::new(),
            program_offset,
            end,
        };

        if version >= 5 {
            let formats = read_entry_formats(line)?;
            header.include_directories = read_entries(line, &formats, strings, line_strings, "directory count")?
                .into_iter()
                .map(|entry| entry.path)
                .collect();
            let formats = read_entry_formats(line)?;
            header.files = read_entries(line, &formats, strings, line_strings, "file count")?;
        } else {
            header.include_directories = read_directories(line)?;
            header.files = read_files(line)?;
        }

        line.skip_to(program_offset)?;
        Ok(header)
    }

    /// Directory a file entry refers to, if the index is in range.
    ///
    /// Before DWARF 5, index 0 stands for the compilation directory, which
    /// the header does not record, and the table proper starts at index 1.
    #[must_use]
    pub fn directory(&self, file: &FileEntry) -> Option<&str>
    {
        let index = usize::try_from(file.directory_index).ok()?;
        let index = if self.version >= 5 { index } else { index.checked_sub(1)? };
        self.include_directories.get(index).map(String::as_str)
    }
}

/// DWARF 2-4 include directories: strings up to an empty one.
fn read_directories(line: &mut SectionReader<'_>) -> DwarfResult<Vec<String>>
{
    let mut directories = Vec::new();
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        line.read_string(&mut scratch)?;
        if scratch.is_empty() {
            return Ok(directories);
        }
        directories.push(String::from_utf8_lossy(&scratch).into_owned());
    }
}

/// DWARF 2-4 file names: (path, directory, mtime, size) up to an empty path.
fn read_files(line: &mut SectionReader<'_>) -> DwarfResult<Vec<FileEntry>>
{
    let mut files = Vec::new();
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        line.read_string(&mut scratch)?;
        if scratch.is_empty() {
            return Ok(files);
        }
        files.push(FileEntry {
            path: String::from_utf8_lossy(&scratch).into_owned(),
            directory_index: line.read_uleb128()?,
            modification_time: Some(line.read_uleb128()?),
            size: Some(line.read_uleb128()?),
            md5: None,
        });
    }
}

fn read_entry_formats(line: &mut SectionReader<'_>) -> DwarfResult<EntryFormat>
{
    let count = line.read_u8()?;
    let mut formats = EntryFormat::new();
    for _ in 0..count {
        let content = DwLnct(line.read_uleb128()?);
        let form = DwForm(line.read_uleb128()?);
        formats.push((content, form));
    }
    Ok(formats)
}

fn read_entries(
    line: &mut SectionReader<'_>,
    formats: &EntryFormat,
    strings: &mut SectionReader<'_>,
    line_strings: &mut SectionReader<'_>,
    field: &'static str,
) -> DwarfResult<Vec<FileEntry>>
{
    let count: u64 = line.read_uleb128()?;
    if count == 0 {
        return Ok(Vec::new());
    }

    // Entries without encoded bytes carry no path, and a count larger than
    // the remaining bytes can hold is corrupt.
    let entry_size = min_entry_size(line, formats);
    if entry_size == 0 || count > line.remaining() / entry_size {
        return Err(DwarfError::InvalidSetting { field, value: count });
    }

    let mut entries = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    let mut scratch = Vec::new();
    for _ in 0..count {
        let mut entry = FileEntry::default();
        for &(content, form) in formats {
            match content {
                constants::DW_LNCT_path if is_string_form(form) => {
                    scratch.clear();
                    line.read_string_from_form(&mut scratch, strings, line_strings, form)?;
                    entry.path = String::from_utf8_lossy(&scratch).into_owned();
                }
                constants::DW_LNCT_directory_index => entry.directory_index = line.read_offset_from_form(form)?,
                constants::DW_LNCT_timestamp => entry.modification_time = read_optional_constant(line, form)?,
                constants::DW_LNCT_size => entry.size = read_optional_constant(line, form)?,
                constants::DW_LNCT_MD5 if form == constants::DW_FORM_data16 => {
                    let mut digest = [0u8; 16];
                    line.read_bytes(&mut digest)?;
                    entry.md5 = Some(digest);
                }
                _ => {
                    trace!(
                        content = string_for_lnct(content),
                        form = string_for_form(form),
                        "skipping line table entry field"
                    );
                    line.skip_form(form)?;
                }
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Fewest bytes one entry described by `formats` can occupy.
fn min_entry_size(line: &SectionReader<'_>, formats: &EntryFormat) -> u64
{
    formats
        .iter()
        .map(|&(_, form)| match form_encoding(form) {
            Some(FormEncoding::Empty) => 0,
            Some(FormEncoding::Fixed(width) | FormEncoding::Block(width)) => u64::from(width),
            Some(FormEncoding::Address) => u64::from(line.address_size().unwrap_or(1)),
            Some(FormEncoding::Offset) => line.offset_size().map_or(4, |format| u64::from(format.word_size())),
            _ => 1,
        })
        .sum()
}

/// Integer-valued entry fields; a block-encoded timestamp is skipped.
fn read_optional_constant(line: &mut SectionReader<'_>, form: DwForm) -> DwarfResult<Option<u64>>
{
    match form_encoding(form) {
        Some(FormEncoding::Fixed(width)) if width <= 8 => line.read_offset_from_form(form).map(Some),
        Some(FormEncoding::Uleb128) => line.read_offset_from_form(form).map(Some),
        _ => line.skip_form(form).map(|()| None),
    }
}
