//! DWARF section discovery in object files.
//!
//! The section reader works on file offsets, so this module only has to find
//! where each debug section lives in the file. Parsing uses the `object`
//! crate and covers ELF as well as Mach-O (`__debug_*`) names. `object` also
//! resolves a `.debug_*` name to its `.zdebug_*` spelling; such sections are
//! listed but flagged as compressed.

use object::{CompressionFormat, Object, ObjectSection};
use tracing::{debug, warn};

use crate::error::DwarfResult;
use crate::section::Section;

/// Canonical DWARF section names and the spellings they appear under.
const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_types", &[".debug_types", "__debug_types"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
    (".debug_frame", &[".debug_frame", "__debug_frame"]),
    (".debug_names", &[".debug_names", "__debug_names"]),
];

/// One DWARF section located in an object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEntry
{
    /// Canonical name, e.g. `.debug_info`
    pub name: &'static str,
    /// File range of the section contents
    pub section: Section,
    /// Compressed contents cannot be streamed by a `SectionReader`
    pub compressed: bool,
}

/// The DWARF sections of one object file.
#[derive(Debug, Clone, Default)]
pub struct DebugSections
{
    entries: Vec<SectionEntry>,
    file_size: u64,
}

impl DebugSections
{
    /// Locate the DWARF sections in an object file image.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::Object`](crate::error::DwarfError::Object) if `data` is not an object file `object` can parse.
    pub fn parse(data: &[u8]) -> DwarfResult<Self>
    {
        let file = object::File::parse(data)?;
        let mut entries = Vec::new();
        for &(canonical, aliases) in DWARF_SECTIONS {
            let Some(section) = aliases.iter().find_map(|name| file.section_by_name(name)) else {
                continue;
            };

            let (range, compressed) = match section.compressed_file_range() {
                Ok(range) if range.format != CompressionFormat::None => (Some((range.offset, range.compressed_size)), true),
                _ => (section.file_range(), false),
            };

            // Sections without file contents (SHT_NOBITS) have nothing to read.
            let Some((offset, size)) = range else {
                debug!(section = canonical, "section has no file data");
                continue;
            };

            if compressed {
                warn!(section = canonical, "compressed section cannot be streamed");
            }
            entries.push(SectionEntry {
                name: canonical,
                section: Section::new(offset, size),
                compressed,
            });
        }

        Ok(Self {
            entries,
            file_size: data.len() as u64,
        })
    }

    /// Size of the parsed file in bytes.
    pub fn file_size(&self) -> u64
    {
        self.file_size
    }

    /// File range of a readable (uncompressed) section by canonical name.
    pub fn get(&self, name: &str) -> Option<Section>
    {
        self.entries
            .iter()
            .find(|entry| entry.name == name && !entry.compressed)
            .map(|entry| entry.section)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionEntry>
    {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}
