//! # Section Reader
//!
//! A bounded, buffered cursor over one section of an object file.
//!
//! The reader keeps a window of the section in a caller-owned scratch buffer
//! and refills it on demand through a [`FileAccess`] collaborator. It never
//! allocates and never reads outside the section it is bound to, so it can be
//! driven from crash handlers where heap allocation is off the table.
//!
//! ## Cursor model
//!
//! ```text
//! file:    |.... begin ........ buffer_offset ==== cursor ==== filled .... end ....|
//!                                  ^ buffer[0]      ^ offset()   ^ buffer[filled]
//! ```
//!
//! - `offset() == buffer_offset + cursor` is the absolute position of the next byte
//! - `[cursor, filled)` is the unconsumed, already-loaded part of the buffer
//! - `begin <= buffer_offset <= offset() <= end` always holds
//!
//! Skipping past the loaded window does not touch the file: the reader only
//! records the new position and the next read triggers the reload there.
//!
//! ## Usage
//!
//! ```rust
//! use dwarfscan_core::reader::SectionReader;
//! use dwarfscan_core::section::Section;
//!
//! # fn main() -> Result<(), dwarfscan_core::DwarfError> {
//! let image = vec![0u8, 0, 0x2a, 0, 0, 0, 0xe5, 0x8e, 0x26];
//! let mut scratch = [0u8; 64];
//! let mut reader = SectionReader::new();
//! reader.init(&image, &mut scratch, Section::new(2, 7), image.len() as u64)?;
//!
//! assert_eq!(reader.read_value::<u32>()?, u32::from_ne_bytes([0x2a, 0, 0, 0]));
//! assert_eq!(reader.read_uleb128::<u32>()?, 624_485);
//! assert!(reader.at_end_of_section());
//! # Ok(())
//! # }
//! ```

mod forms;
mod strings;
mod values;

pub use forms::{form_encoding, is_indexed_string_form, is_string_form, AddressValue, FormEncoding};
pub use values::{validate_address_size, Primitive};

use gimli::Format;
use tracing::trace;

use crate::error::{DwarfError, DwarfResult};
use crate::file::FileAccess;
use crate::section::Section;

/// Scratch buffer size callers should allocate for sequential reads.
///
/// A little under 32 KiB so the buffer plus allocator bookkeeping stays within
/// eight pages.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024 - 64;

/// Smallest scratch buffer [`SectionReader::init`] accepts.
///
/// The widest fixed-size value the reader decodes in one piece is a
/// `DW_FORM_data16` constant.
pub const MIN_BUFFER_SIZE: usize = 16;

/// Reader tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions
{
    /// Capacity of each reader's scratch buffer in bytes
    pub buffer_size: usize,
}

impl Default for ReaderOptions
{
    fn default() -> Self
    {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ReaderOptions
{
    /// Check the options against the reader's hard limits.
    ///
    /// ## Errors
    ///
    /// Returns [`DwarfError::BufferTooSmall`] when `buffer_size` is below
    /// [`MIN_BUFFER_SIZE`].
    pub fn validate(self) -> DwarfResult<Self>
    {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(DwarfError::BufferTooSmall {
                got: self.buffer_size,
                min: MIN_BUFFER_SIZE,
            });
        }
        Ok(self)
    }

    /// Allocate one zeroed scratch buffer of the configured size.
    ///
    /// This is the only allocation in the reader's lifecycle and happens
    /// before any reader is bound.
    #[must_use]
    pub fn allocate_buffer(self) -> Vec<u8>
    {
        vec![0; self.buffer_size]
    }
}

/// Buffered, bounds-checked cursor over a single object-file section.
///
/// A reader starts out disabled ([`SectionReader::new`]) and becomes usable
/// once [`init`](SectionReader::init) binds it to a file, a scratch buffer and
/// a [`Section`]. Every decode operation on a disabled reader fails with
/// [`DwarfError::Disabled`].
///
/// The reader borrows both the file and the buffer for `'a` and owns no heap
/// memory. One reader per thread: there is no internal locking.
pub struct SectionReader<'a>
{
    file: Option<&'a dyn FileAccess>,
    buffer: Option<&'a mut [u8]>,
    file_size: u64,
    /// File offset of `buffer[0]`
    buffer_offset: u64,
    cursor: usize,
    filled: usize,
    begin_offset: u64,
    end_offset: u64,
    /// Hard limit: end of the bound section clamped to the file size
    section_end: u64,
    offset_size: Option<Format>,
    address_size: Option<u8>,
    /// Version of the unit being decoded, where form sizes depend on it
    version: Option<u16>,
}

impl Default for SectionReader<'_>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl std::fmt::Debug for SectionReader<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("SectionReader")
            .field("enabled", &self.is_enabled())
            .field("offset", &self.offset())
            .field("begin_offset", &self.begin_offset)
            .field("end_offset", &self.end_offset)
            .field("buffered", &(self.filled - self.cursor))
            .field("offset_size", &self.offset_size)
            .field("address_size", &self.address_size)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<'a> SectionReader<'a>
{
    /// Create a disabled reader.
    #[must_use]
    pub const fn new() -> Self
    {
        Self {
            file: None,
            buffer: None,
            file_size: 0,
            buffer_offset: 0,
            cursor: 0,
            filled: 0,
            begin_offset: 0,
            end_offset: 0,
            section_end: 0,
            offset_size: None,
            address_size: None,
            version: None,
        }
    }

    /// Create a reader already bound to `section`.
    ///
    /// ## Errors
    ///
    /// See [`init`](Self::init).
    pub fn bound(file: &'a dyn FileAccess, buffer: &'a mut [u8], section: Section, file_size: u64) -> DwarfResult<Self>
    {
        let mut reader = Self::new();
        reader.init(file, buffer, section, file_size)?;
        Ok(reader)
    }

    /// Bind the reader to a file, a scratch buffer and a section.
    ///
    /// Afterwards `offset() == section.offset` and the buffer is empty, so the
    /// first read loads from the file. The readable window ends at
    /// `min(section.offset + section.size, file_size)`.
    ///
    /// ## Errors
    ///
    /// - [`DwarfError::BufferTooSmall`] if `buffer` is shorter than [`MIN_BUFFER_SIZE`]
    /// - [`DwarfError::EmptySection`] if the section is empty or starts at or past `file_size`
    ///
    /// The reader is left disabled on failure.
    pub fn init(
        &mut self,
        file: &'a dyn FileAccess,
        buffer: &'a mut [u8],
        section: Section,
        file_size: u64,
    ) -> DwarfResult<()>
    {
        *self = Self::new();
        if buffer.len() < MIN_BUFFER_SIZE {
            return Err(DwarfError::BufferTooSmall {
                got: buffer.len(),
                min: MIN_BUFFER_SIZE,
            });
        }

        self.file = Some(file);
        self.buffer = Some(buffer);
        self.file_size = file_size;
        if let Err(err) = self.bind(section) {
            *self = Self::new();
            return Err(err);
        }
        Ok(())
    }

    /// Rebind an enabled reader to another section of the same file.
    ///
    /// Keeps the file and scratch buffer, forgets everything else including
    /// the offset and address sizes and the unit version.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::Disabled`] on a disabled reader, [`DwarfError::EmptySection`]
    /// as for [`init`](Self::init).
    pub fn reset(&mut self, section: Section) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        self.bind(section)
    }

    fn bind(&mut self, section: Section) -> DwarfResult<()>
    {
        let end = section.end().min(self.file_size);
        if section.is_empty() || end <= section.offset {
            return Err(DwarfError::EmptySection { offset: section.offset });
        }

        self.begin_offset = section.offset;
        self.end_offset = end;
        self.section_end = end;
        self.buffer_offset = section.offset;
        self.cursor = 0;
        self.filled = 0;
        self.offset_size = None;
        self.address_size = None;
        self.version = None;
        trace!(section = %section, end = end, "bound section reader");
        Ok(())
    }

    /// Drop the bindings and return to the disabled state.
    pub fn disable(&mut self)
    {
        *self = Self::new();
    }

    /// Whether the reader is bound to a buffer and a file.
    pub fn is_enabled(&self) -> bool
    {
        self.buffer.is_some() && self.file.is_some()
    }

    /// Absolute file offset of the next unread byte.
    pub fn offset(&self) -> u64
    {
        self.buffer_offset + self.cursor as u64
    }

    /// Offset of the next unread byte relative to the start of the section.
    pub fn section_offset(&self) -> u64
    {
        self.offset() - self.begin_offset
    }

    pub fn begin_offset(&self) -> u64
    {
        self.begin_offset
    }

    /// Current logical end of the readable window.
    pub fn end_offset(&self) -> u64
    {
        self.end_offset
    }

    /// End of the bound section, clamped to the file size.
    pub fn section_end(&self) -> u64
    {
        self.section_end
    }

    /// Bytes left between the cursor and the end of the window.
    pub fn remaining(&self) -> u64
    {
        self.end_offset - self.offset()
    }

    /// True iff the cursor sits exactly on the end of the window.
    pub fn at_end_of_section(&self) -> bool
    {
        self.is_enabled() && self.offset() == self.end_offset
    }

    /// Width of section offsets (4 or 8 bytes), once an initial length was read.
    pub fn offset_size(&self) -> Option<Format>
    {
        self.offset_size
    }

    /// Force the offset width, for sections whose width comes from another header.
    pub fn set_offset_size(&mut self, format: Format)
    {
        self.offset_size = Some(format);
    }

    /// Width of target addresses, once established.
    pub fn address_size(&self) -> Option<u8>
    {
        self.address_size
    }

    /// DWARF version of the unit being decoded, if one was recorded.
    pub fn dwarf_version(&self) -> Option<u16>
    {
        self.version
    }

    /// Record the unit version. DWARF 2 sizes `DW_FORM_ref_addr` by address
    /// rather than by offset.
    pub fn set_dwarf_version(&mut self, version: u16)
    {
        self.version = Some(version);
    }

    /// Capacity of the scratch buffer, zero when disabled.
    pub fn capacity(&self) -> usize
    {
        self.buffer.as_deref().map_or(0, <[u8]>::len)
    }

    /// Advance the cursor by `count` bytes without reading them.
    ///
    /// Skips within the loaded window just move the cursor. Larger skips only
    /// record the target; the file is touched on the next read.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::OutOfBounds`] if the target lies past the end of the window.
    pub fn skip_bytes(&mut self, count: u64) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        if count <= self.available() as u64 {
            #[allow(clippy::cast_possible_truncation)]
            let count = count as usize;
            self.cursor += count;
            return Ok(());
        }

        let target = self.offset().checked_add(count).ok_or(DwarfError::OutOfBounds {
            offset: u64::MAX,
            begin: self.begin_offset,
            end: self.end_offset,
        })?;
        self.skip_to(target)
    }

    /// Move the cursor to absolute file `offset`, forwards or backwards.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::OutOfBounds`] unless `begin_offset() <= offset <= end_offset()`.
    pub fn skip_to(&mut self, offset: u64) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        if offset < self.begin_offset || offset > self.end_offset {
            return Err(DwarfError::OutOfBounds {
                offset,
                begin: self.begin_offset,
                end: self.end_offset,
            });
        }

        let window_end = self.buffer_offset + self.filled as u64;
        if offset >= self.buffer_offset && offset <= window_end {
            #[allow(clippy::cast_possible_truncation)]
            let cursor = (offset - self.buffer_offset) as usize;
            self.cursor = cursor;
            return Ok(());
        }

        trace!(from = self.offset(), to = offset, "deferred seek");
        self.buffer_offset = offset;
        self.cursor = 0;
        self.filled = 0;
        Ok(())
    }

    /// Move the cursor to `offset` bytes past the start of the section.
    ///
    /// ## Errors
    ///
    /// As for [`skip_to`](Self::skip_to).
    pub fn skip_to_section_offset(&mut self, offset: u64) -> DwarfResult<()>
    {
        let target = self.begin_offset.checked_add(offset).ok_or(DwarfError::OutOfBounds {
            offset: u64::MAX,
            begin: self.begin_offset,
            end: self.end_offset,
        })?;
        self.skip_to(target)
    }

    /// Move the logical end of the window, typically to the end of a
    /// length-prefixed structure that was just entered.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::OutOfBounds`] unless `offset() <= end <= section_end()`.
    pub fn set_end_offset(&mut self, end: u64) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        if end < self.offset() || end > self.section_end {
            return Err(DwarfError::OutOfBounds {
                offset: end,
                begin: self.offset(),
                end: self.section_end,
            });
        }

        self.end_offset = end;
        let window_end = self.buffer_offset + self.filled as u64;
        if window_end > end {
            #[allow(clippy::cast_possible_truncation)]
            let filled = (end - self.buffer_offset) as usize;
            self.filled = filled;
        }
        Ok(())
    }

    /// Widen the window back to the whole section.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::Disabled`] on a disabled reader.
    pub fn reset_end_offset(&mut self) -> DwarfResult<()>
    {
        self.set_end_offset(self.section_end)
    }

    fn ensure_enabled(&self) -> DwarfResult<()>
    {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(DwarfError::Disabled)
        }
    }

    fn available(&self) -> usize
    {
        self.filled - self.cursor
    }

    /// Make sure `count` unconsumed bytes are loaded at the cursor.
    fn need_bytes(&mut self, count: usize) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        if self.available() >= count {
            return Ok(());
        }
        self.reload(count, usize::MAX)
    }

    /// Refill the buffer starting at the cursor.
    ///
    /// Loads `min(capacity, window, remaining)` bytes and fails unless at
    /// least `needed` arrive. The loaded window is discarded before the read,
    /// so a failed read never leaves stale bytes addressable.
    fn reload(&mut self, needed: usize, window: usize) -> DwarfResult<()>
    {
        let position = self.offset();
        let remaining = self.end_offset - position;
        if needed as u64 > remaining {
            return Err(DwarfError::Truncated {
                offset: position,
                needed,
                remaining,
            });
        }

        let file = self.file.ok_or(DwarfError::Disabled)?;
        let buffer = self.buffer.as_deref_mut().ok_or(DwarfError::Disabled)?;
        if needed > buffer.len() {
            return Err(DwarfError::BufferTooSmall {
                got: buffer.len(),
                min: needed,
            });
        }

        let length = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(window.max(needed))
            .min(buffer.len());

        self.buffer_offset = position;
        self.cursor = 0;
        self.filled = 0;

        let got = file
            .read_at(position, &mut buffer[..length])
            .map_err(|err| DwarfError::Io {
                offset: position,
                length,
                kind: err.kind(),
            })?
            .min(length);
        trace!(offset = position, requested = length, got = got, "reloaded section buffer");

        self.filled = got;
        if got < needed {
            return Err(DwarfError::ShortRead {
                offset: position,
                needed,
                got,
            });
        }
        Ok(())
    }

    /// Consume `count` loaded bytes, reloading first if needed.
    fn take(&mut self, count: usize) -> DwarfResult<&[u8]>
    {
        self.need_bytes(count)?;
        let start = self.cursor;
        self.cursor += count;
        let buffer = self.buffer.as_deref().ok_or(DwarfError::Disabled)?;
        Ok(&buffer[start..start + count])
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn image() -> Vec<u8>
    {
        (0u8..=255).collect()
    }

    #[test]
    fn test_new_reader_is_disabled()
    {
        let mut reader = SectionReader::new();
        assert!(!reader.is_enabled());
        assert!(!reader.at_end_of_section());
        assert_eq!(reader.read_value::<u8>(), Err(DwarfError::Disabled));
        assert_eq!(reader.skip_bytes(1), Err(DwarfError::Disabled));
    }

    #[test]
    fn test_init_positions_at_section_start()
    {
        let data = image();
        let mut scratch = [0u8; 32];
        let mut reader = SectionReader::new();
        reader.init(&data, &mut scratch, Section::new(10, 20), 256).unwrap();
        assert!(reader.is_enabled());
        assert_eq!(reader.offset(), 10);
        assert_eq!(reader.end_offset(), 30);
        assert_eq!(reader.read_value::<u8>().unwrap(), 10);
    }

    #[test]
    fn test_init_rejects_bad_arguments()
    {
        let data = image();
        let mut small = [0u8; MIN_BUFFER_SIZE - 1];
        let mut reader = SectionReader::new();
        assert!(matches!(
            reader.init(&data, &mut small, Section::new(0, 10), 256),
            Err(DwarfError::BufferTooSmall { .. })
        ));

        let mut scratch = [0u8; 32];
        assert_eq!(
            reader.init(&data, &mut scratch, Section::new(0, 0), 256),
            Err(DwarfError::EmptySection { offset: 0 })
        );
        assert!(!reader.is_enabled());

        let mut scratch = [0u8; 32];
        assert_eq!(
            reader.init(&data, &mut scratch, Section::new(300, 10), 256),
            Err(DwarfError::EmptySection { offset: 300 })
        );
    }

    #[test]
    fn test_end_clamped_to_file_size()
    {
        let data = image();
        let mut scratch = [0u8; 32];
        let reader = SectionReader::bound(&data, &mut scratch, Section::new(250, 100), 256).unwrap();
        assert_eq!(reader.end_offset(), 256);
        assert_eq!(reader.remaining(), 6);
    }

    #[test]
    fn test_skip_is_lazy_and_bounded()
    {
        let data = image();
        let mut scratch = [0u8; 16];
        let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(0, 200), 256).unwrap();
        assert_eq!(reader.read_value::<u8>().unwrap(), 0);
        reader.skip_bytes(100).unwrap();
        assert_eq!(reader.offset(), 101);
        assert_eq!(reader.filled, 0);
        assert_eq!(reader.read_value::<u8>().unwrap(), 101);

        assert!(matches!(reader.skip_bytes(200), Err(DwarfError::OutOfBounds { .. })));
        assert_eq!(reader.offset(), 102);
        reader.skip_to(200).unwrap();
        assert!(reader.at_end_of_section());
        assert!(reader.read_value::<u8>().is_err());
    }

    #[test]
    fn test_skip_within_window_keeps_buffer()
    {
        let data = image();
        let mut scratch = [0u8; 64];
        let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(0, 200), 256).unwrap();
        reader.read_value::<u8>().unwrap();
        reader.skip_bytes(10).unwrap();
        assert_eq!(reader.filled, 64);
        reader.skip_to(3).unwrap();
        assert_eq!(reader.filled, 64);
        assert_eq!(reader.read_value::<u8>().unwrap(), 3);
    }

    #[test]
    fn test_skip_to_outside_section_fails()
    {
        let data = image();
        let mut scratch = [0u8; 16];
        let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(50, 10), 256).unwrap();
        assert!(reader.skip_to(49).is_err());
        assert!(reader.skip_to(61).is_err());
        reader.skip_to(60).unwrap();
        assert!(reader.at_end_of_section());
    }

    #[test]
    fn test_set_end_offset_narrows_window()
    {
        let data = image();
        let mut scratch = [0u8; 64];
        let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(0, 100), 256).unwrap();
        reader.read_value::<u8>().unwrap();
        reader.set_end_offset(4).unwrap();
        assert_eq!(reader.filled, 4);
        assert_eq!(reader.read_value::<u16>().unwrap(), u16::from_ne_bytes([1, 2]));
        assert!(matches!(reader.read_value::<u16>(), Err(DwarfError::Truncated { .. })));
        assert_eq!(reader.read_value::<u8>().unwrap(), 3);
        assert!(reader.at_end_of_section());

        assert!(reader.set_end_offset(3).is_err());
        assert!(reader.set_end_offset(101).is_err());
        reader.reset_end_offset().unwrap();
        assert_eq!(reader.read_value::<u8>().unwrap(), 4);
    }

    #[test]
    fn test_reset_rebinds_and_forgets_sizes()
    {
        let data = image();
        let mut scratch = [0u8; 16];
        let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(0, 10), 256).unwrap();
        reader.set_address_size(4).unwrap();
        reader.set_offset_size(Format::Dwarf64);
        reader.set_dwarf_version(2);
        reader.reset(Section::new(20, 10)).unwrap();
        assert_eq!(reader.address_size(), None);
        assert_eq!(reader.offset_size(), None);
        assert_eq!(reader.dwarf_version(), None);
        assert_eq!(reader.read_value::<u8>().unwrap(), 20);
    }

    #[test]
    fn test_options_validate()
    {
        assert!(ReaderOptions::default().validate().is_ok());
        assert!(ReaderOptions { buffer_size: 8 }.validate().is_err());
        assert_eq!(ReaderOptions { buffer_size: 16 }.allocate_buffer().len(), 16);
    }
}
