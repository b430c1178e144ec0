//! # Compile Units
//!
//! Unit headers, abbreviation tables, and the root DIE of each unit in
//! `.debug_info`, decoded through [`SectionReader`]s.
//!
//! Only the root entry of each unit is decoded: that is where the unit's
//! name, compilation directory and line program offset live. Corrupt units
//! are abandoned individually; as long as a unit's length could be read, the
//! walk carries on with the next one.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dwarfscan_core::elf::DebugSections;
//! use dwarfscan_core::reader::ReaderOptions;
//! use dwarfscan_core::unit::DwarfReaders;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let image = std::fs::read("/path/to/binary")?;
//!     let sections = DebugSections::parse(&image)?;
//!     let file = std::fs::File::open("/path/to/binary")?;
//!
//!     let options = ReaderOptions::default();
//!     let mut buffers: Vec<Vec<u8>> = (0..DwarfReaders::BUFFER_COUNT).map(|_| options.allocate_buffer()).collect();
//!     let mut readers = DwarfReaders::bind(&file, &mut buffers, &sections)?;
//!     readers.for_each_unit(|offset, report| match report {
//!         Ok(report) => println!("0x{offset:08x} {:?}", report.summary.name),
//!         Err(err) => println!("0x{offset:08x} skipped: {err}"),
//!     })?;
//!     Ok(())
//! }
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use gimli::constants::{self, DwAt, DwForm, DwLang, DwTag, DwUt};
use gimli::Format;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::elf::DebugSections;
use crate::error::{DwarfError, DwarfResult};
use crate::file::FileAccess;
use crate::reader::{is_indexed_string_form, is_string_form, AddressValue, SectionReader};

/// Header of one unit in `.debug_info`.
///
/// Offsets named `*_offset` are relative to their section; `start`, `entries`
/// and `end` are absolute file offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader
{
    /// Offset of the unit within `.debug_info`
    pub section_offset: u64,
    /// Absolute offset of the unit's initial length
    pub start: u64,
    /// Absolute offset of the first DIE
    pub entries: u64,
    /// Absolute offset one past the unit
    pub end: u64,
    /// Length from the initial length field
    pub unit_length: u64,
    /// 32- or 64-bit DWARF
    pub format: Format,
    pub version: u16,
    /// Unit type (always `DW_UT_compile` before DWARF 5)
    pub unit_type: DwUt,
    /// Offset of the unit's abbreviations within `.debug_abbrev`
    pub debug_abbrev_offset: u64,
    pub address_size: u8,
    /// Split-DWARF id of skeleton and split compile units
    pub dwo_id: Option<u64>,
    /// Signature of type units
    pub type_signature: Option<u64>,
    /// Offset of the type DIE within a type unit
    pub type_offset: Option<u64>,
}

impl UnitHeader
{
    /// Parse the unit header at the cursor.
    ///
    /// On success the reader's window is narrowed to the unit and the cursor
    /// sits on the first DIE.
    ///
    /// ## Errors
    ///
    /// Any reader error, [`DwarfError::UnsupportedVersion`] for versions
    /// outside 2..=5, and [`DwarfError::Truncated`] when the unit length runs
    /// past the section.
    pub fn parse(reader: &mut SectionReader<'_>) -> DwarfResult<Self>
    {
        let section_offset = reader.section_offset();
        let start = reader.offset();
        let unit_length = reader.read_initial_length()?;
        let end = length_end(reader, unit_length)?;
        Self::parse_body(reader, section_offset, start, unit_length, end)
    }

    fn parse_body(
        reader: &mut SectionReader<'_>,
        section_offset: u64,
        start: u64,
        unit_length: u64,
        end: u64,
    ) -> DwarfResult<Self>
    {
        reader.set_end_offset(end)?;
        let format = reader.offset_size().ok_or(DwarfError::OffsetSizeUnknown)?;
        let version = reader.read_u16()?;
        reader.set_dwarf_version(version);

        let mut header = Self {
            section_offset,
            start,
            entries: 0,
            end,
            unit_length,
            format,
            version,
            unit_type: constants::DW_UT_compile,
            debug_abbrev_offset: 0,
            address_size: 0,
            dwo_id: None,
            type_signature: None,
            type_offset: None,
        };

        match version {
            2..=4 => {
                header.debug_abbrev_offset = reader.read_section_offset()?;
                header.address_size = reader.read_address_size()?;
            }
            5 => {
                header.unit_type = DwUt(reader.read_u8()?);
                header.address_size = reader.read_address_size()?;
                header.debug_abbrev_offset = reader.read_section_offset()?;
                match header.unit_type {
                    constants::DW_UT_skeleton | constants::DW_UT_split_compile => {
                        header.dwo_id = Some(reader.read_u64()?);
                    }
                    constants::DW_UT_type | constants::DW_UT_split_type => {
                        header.type_signature = Some(reader.read_u64()?);
                        header.type_offset = Some(reader.read_section_offset()?);
                    }
                    _ => {}
                }
            }
            _ => return Err(DwarfError::UnsupportedVersion(version)),
        }

        header.entries = reader.offset();
        Ok(header)
    }
}

/// Absolute end of a structure whose length was just read at the cursor.
pub(crate) fn length_end(reader: &SectionReader<'_>, length: u64) -> DwarfResult<u64>
{
    let body = reader.offset();
    body.checked_add(length)
        .filter(|end| *end <= reader.section_end())
        .ok_or(DwarfError::Truncated {
            offset: body,
            needed: usize::try_from(length).unwrap_or(usize::MAX),
            remaining: reader.section_end() - body,
        })
}

/// One attribute of an abbreviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec
{
    pub name: DwAt,
    pub form: DwForm,
    /// Value of a `DW_FORM_implicit_const` attribute, stored in the abbreviation
    pub implicit_const: Option<i64>,
}

/// Shape of a DIE: its tag, whether children follow, and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation
{
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: SmallVec<[AttributeSpec; 8]>,
}

/// The abbreviations of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbbreviationTable
{
    entries: Vec<Abbreviation>,
}

impl AbbreviationTable
{
    /// Parse the table starting `offset` bytes into `.debug_abbrev`.
    ///
    /// The table ends at a zero code or at the end of the section.
    ///
    /// ## Errors
    ///
    /// Any reader error.
    pub fn parse(reader: &mut SectionReader<'_>, offset: u64) -> DwarfResult<Self>
    {
        reader.reset_end_offset()?;
        reader.skip_to_section_offset(offset)?;

        let mut entries = Vec::new();
        while !reader.at_end_of_section() {
            let code: u64 = reader.read_uleb128()?;
            if code == 0 {
                break;
            }

            let tag = DwTag(reader.read_uleb128()?);
            let has_children = reader.read_u8()? == constants::DW_CHILDREN_yes.0;
            let mut attributes = SmallVec::new();
            loop {
                let name = DwAt(reader.read_uleb128()?);
                let form = DwForm(reader.read_uleb128()?);
                if name.0 == 0 && form.0 == 0 {
                    break;
                }
                let implicit_const = if form == constants::DW_FORM_implicit_const {
                    Some(reader.read_sleb128()?)
                } else {
                    None
                };
                attributes.push(AttributeSpec {
                    name,
                    form,
                    implicit_const,
                });
            }

            entries.push(Abbreviation {
                code,
                tag,
                has_children,
                attributes,
            });
        }

        Ok(Self { entries })
    }

    /// Look up an abbreviation by code.
    ///
    /// Codes are usually assigned densely from 1, so the entry at `code - 1`
    /// is tried before scanning.
    pub fn get(&self, code: u64) -> Option<&Abbreviation>
    {
        let direct = usize::try_from(code)
            .ok()
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| self.entries.get(index))
            .filter(|entry| entry.code == code);
        direct.or_else(|| self.entries.iter().find(|entry| entry.code == code))
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

/// What the root DIE of a unit says about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSummary
{
    pub tag: Option<DwTag>,
    pub name: Option<String>,
    pub comp_dir: Option<String>,
    pub producer: Option<String>,
    pub language: Option<DwLang>,
    /// Offset of the unit's line program within `.debug_line`
    pub stmt_list: Option<u64>,
    pub low_pc: Option<AddressValue>,
}

impl UnitSummary
{
    /// Decode the root DIE at the cursor of `info`.
    ///
    /// String attributes in inline, `.debug_str` or `.debug_line_str` form are
    /// resolved directly. String indices (`DW_FORM_strx*`) go through
    /// `str_offsets` once the whole entry is read, since
    /// `DW_AT_str_offsets_base` may follow them; without that attribute the
    /// table is assumed to start right after the first table header.
    /// Everything else the summary does not keep is skipped.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::MissingAbbreviation`] for an unknown code, and any
    /// reader error.
    pub fn parse(
        info: &mut SectionReader<'_>,
        abbreviations: &AbbreviationTable,
        strings: &mut SectionReader<'_>,
        line_strings: &mut SectionReader<'_>,
        str_offsets: &mut SectionReader<'_>,
    ) -> DwarfResult<Self>
    {
        let mut summary = Self::default();
        let code: u64 = info.read_uleb128()?;
        if code == 0 {
            return Ok(summary);
        }

        let abbreviation = abbreviations.get(code).ok_or(DwarfError::MissingAbbreviation(code))?;
        summary.tag = Some(abbreviation.tag);

        let mut scratch = Vec::new();
        let mut indexed: SmallVec<[(DwAt, u64); 3]> = SmallVec::new();
        let mut str_offsets_base = None;
        for spec in &abbreviation.attributes {
            match spec.name {
                constants::DW_AT_name | constants::DW_AT_comp_dir | constants::DW_AT_producer
                    if is_string_form(spec.form) =>
                {
                    scratch.clear();
                    info.read_string_from_form(&mut scratch, strings, line_strings, spec.form)?;
                    summary.set_string(spec.name, &scratch);
                }
                constants::DW_AT_name | constants::DW_AT_comp_dir | constants::DW_AT_producer
                    if is_indexed_string_form(spec.form) =>
                {
                    indexed.push((spec.name, info.read_offset_from_form(spec.form)?));
                }
                constants::DW_AT_str_offsets_base => str_offsets_base = read_constant(info, spec)?,
                constants::DW_AT_language => {
                    summary.language = read_constant(info, spec)?
                        .and_then(|value| u16::try_from(value).ok())
                        .map(DwLang);
                }
                constants::DW_AT_stmt_list => summary.stmt_list = read_constant(info, spec)?,
                constants::DW_AT_low_pc => summary.low_pc = Some(info.read_address_from_form(spec.form)?),
                _ => info.skip_form(spec.form)?,
            }
        }

        if !indexed.is_empty() {
            let format = info.offset_size().ok_or(DwarfError::OffsetSizeUnknown)?;
            let base = str_offsets_base.unwrap_or(match format {
                Format::Dwarf32 => 8,
                Format::Dwarf64 => 16,
            });
            for (name, index) in indexed {
                scratch.clear();
                str_offsets.read_indexed_string(&mut scratch, strings, base, index, format)?;
                summary.set_string(name, &scratch);
            }
        }
        Ok(summary)
    }

    fn set_string(&mut self, name: DwAt, bytes: &[u8])
    {
        let value = Some(String::from_utf8_lossy(bytes).into_owned());
        match name {
            constants::DW_AT_name => self.name = value,
            constants::DW_AT_comp_dir => self.comp_dir = value,
            _ => self.producer = value,
        }
    }
}

/// Read a constant-class attribute, including one stored as an implicit constant.
fn read_constant(info: &mut SectionReader<'_>, spec: &AttributeSpec) -> DwarfResult<Option<u64>>
{
    if let Some(value) = spec.implicit_const {
        return Ok(u64::try_from(value).ok());
    }
    info.read_offset_from_form(spec.form).map(Some)
}

/// A decoded unit: its header and root DIE summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport
{
    pub header: UnitHeader,
    pub summary: UnitSummary,
}

/// The readers needed to walk compile units, one per section.
///
/// Readers for sections the file lacks stay disabled; decoding anything that
/// needs them fails for that unit only.
#[derive(Debug, Default)]
pub struct DwarfReaders<'a>
{
    pub info: SectionReader<'a>,
    pub abbrev: SectionReader<'a>,
    pub strings: SectionReader<'a>,
    pub line_strings: SectionReader<'a>,
    pub str_offsets: SectionReader<'a>,
    pub line: SectionReader<'a>,
}

impl<'a> DwarfReaders<'a>
{
    /// Number of scratch buffers [`bind`](Self::bind) expects.
    pub const BUFFER_COUNT: usize = 6;

    /// Bind one reader per section found in `sections`.
    ///
    /// `buffers` must hold at least [`BUFFER_COUNT`](Self::BUFFER_COUNT)
    /// scratch buffers; each reader takes one.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::InvalidSetting`] if too few buffers are supplied, and
    /// any error from [`SectionReader::init`] other than an empty section.
    pub fn bind(file: &'a dyn FileAccess, buffers: &'a mut [Vec<u8>], sections: &DebugSections) -> DwarfResult<Self>
    {
        let count = buffers.len() as u64;
        let [info, abbrev, strings, line_strings, str_offsets, line, ..] = buffers else {
            return Err(DwarfError::InvalidSetting {
                field: "buffer count",
                value: count,
            });
        };

        let file_size = sections.file_size();
        let bind = |name: &str, buffer: &'a mut Vec<u8>| -> DwarfResult<SectionReader<'a>> {
            let Some(section) = sections.get(name) else {
                debug!(section = name, "section not present");
                return Ok(SectionReader::new());
            };
            match SectionReader::bound(file, buffer.as_mut_slice(), section, file_size) {
                Ok(reader) => Ok(reader),
                Err(DwarfError::EmptySection { .. }) => Ok(SectionReader::new()),
                Err(err) => Err(err),
            }
        };

        Ok(Self {
            info: bind(".debug_info", info)?,
            abbrev: bind(".debug_abbrev", abbrev)?,
            strings: bind(".debug_str", strings)?,
            line_strings: bind(".debug_line_str", line_strings)?,
            str_offsets: bind(".debug_str_offsets", str_offsets)?,
            line: bind(".debug_line", line)?,
        })
    }

    /// Walk every unit in `.debug_info`, handing each result to `visit`
    /// along with the unit's section offset.
    ///
    /// A unit whose header or root DIE cannot be decoded is reported as an
    /// error and skipped.
    ///
    /// ## Errors
    ///
    /// Stops with an error only when the next unit cannot be located: its
    /// initial length is unreadable or reserved, or it runs past the section.
    /// Returns the number of units visited otherwise.
    pub fn for_each_unit(&mut self, mut visit: impl FnMut(u64, DwarfResult<UnitReport>)) -> DwarfResult<usize>
    {
        let Self {
            info,
            abbrev,
            strings,
            line_strings,
            str_offsets,
            ..
        } = self;

        info.reset_end_offset()?;
        info.skip_to(info.begin_offset())?;

        let mut tables: HashMap<u64, AbbreviationTable> = HashMap::new();
        let mut count = 0;
        while !info.at_end_of_section() {
            let section_offset = info.section_offset();
            let start = info.offset();
            let unit_length = info.read_initial_length()?;
            let end = length_end(info, unit_length)?;

            let report = UnitHeader::parse_body(info, section_offset, start, unit_length, end).and_then(|header| {
                let table = match tables.entry(header.debug_abbrev_offset) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(AbbreviationTable::parse(abbrev, header.debug_abbrev_offset)?),
                };
                let summary = UnitSummary::parse(info, table, strings, line_strings, str_offsets)?;
                Ok(UnitReport { header, summary })
            });

            if let Err(err) = &report {
                warn!(unit = section_offset, error = %err, "abandoning unit");
            }
            visit(section_offset, report);
            count += 1;

            info.reset_end_offset()?;
            info.skip_to(end)?;
        }
        Ok(count)
    }
}
