//! Null-terminated strings, inline and through string tables.

use gimli::constants::{self, DwForm};
use gimli::Format;

use super::SectionReader;
use crate::error::{DwarfError, DwarfResult};

/// Bytes loaded per reload when looking up a string by offset.
///
/// Table lookups jump around the section, so reading a full buffer ahead of
/// every lookup mostly fetches bytes that are never used.
const STRING_AT_WINDOW: usize = 256;

impl SectionReader<'_>
{
    /// Read a null-terminated string at the cursor and append its bytes,
    /// without the terminator, to `dst`.
    ///
    /// The string may span any number of buffer reloads; its length is
    /// bounded only by the end of the window.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::UnterminatedString`] if the window ends before a
    /// terminator, and any underlying read failure. `dst` may hold a partial
    /// string on failure.
    pub fn read_string(&mut self, dst: &mut Vec<u8>) -> DwarfResult<()>
    {
        self.scan_string(usize::MAX, |chunk| dst.extend_from_slice(chunk))
    }

    /// Step over a null-terminated string without copying it.
    ///
    /// ## Errors
    ///
    /// As for [`read_string`](Self::read_string).
    pub fn skip_string(&mut self) -> DwarfResult<()>
    {
        self.scan_string(usize::MAX, |_| {})
    }

    /// Read a null-terminated string at the cursor without copying it.
    ///
    /// The returned bytes live in the scratch buffer and stay valid until the
    /// next call on this reader. The whole string plus terminator must fit in
    /// the buffer, so strings longer than `capacity() - 1` bytes fail here and
    /// have to go through [`read_string`](Self::read_string) instead.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::StringTooLong`], [`DwarfError::UnterminatedString`], and
    /// any underlying read failure.
    pub fn read_str(&mut self) -> DwarfResult<&[u8]>
    {
        self.ensure_enabled()?;
        let start = self.offset();

        let terminator = match self.find_terminator() {
            Some(end) => end,
            None => {
                if self.remaining() == 0 {
                    return Err(DwarfError::UnterminatedString { offset: start });
                }
                // Restart the window at the string so all of it can be loaded.
                self.reload(1, usize::MAX)?;
                match self.find_terminator() {
                    Some(end) => end,
                    None if self.filled == self.capacity() => {
                        return Err(DwarfError::StringTooLong {
                            offset: start,
                            capacity: self.capacity(),
                        });
                    }
                    None => return Err(DwarfError::UnterminatedString { offset: start }),
                }
            }
        };

        let begin = self.cursor;
        self.cursor = terminator + 1;
        let buffer = self.buffer.as_deref().ok_or(DwarfError::Disabled)?;
        Ok(&buffer[begin..terminator])
    }

    /// Read the string that starts `offset` bytes into the section.
    ///
    /// Meant for string tables such as `.debug_str`: the cursor moves to the
    /// string, and reloads fetch a small window rather than a full buffer.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::OutOfBounds`] if `offset` is not inside the section, and
    /// anything [`read_string`](Self::read_string) can return.
    pub fn read_string_at(&mut self, dst: &mut Vec<u8>, offset: u64) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        let target = self
            .begin_offset
            .checked_add(offset)
            .filter(|target| *target < self.end_offset)
            .ok_or(DwarfError::OutOfBounds {
                offset: self.begin_offset.saturating_add(offset),
                begin: self.begin_offset,
                end: self.end_offset,
            })?;

        self.skip_to(target)?;
        self.scan_string(STRING_AT_WINDOW, |chunk| dst.extend_from_slice(chunk))
    }

    /// Read a string attribute value of the given form.
    ///
    /// - `DW_FORM_string`: inline, read from this reader
    /// - `DW_FORM_strp`: an offset into `.debug_str`, resolved with `str_reader`
    /// - `DW_FORM_line_strp`: an offset into `.debug_line_str`, resolved with `line_str_reader`
    ///
    /// Pass a disabled reader for a table the file does not have.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::UnsupportedForm`] for any other form, and any failure of
    /// the reads involved.
    pub fn read_string_from_form(
        &mut self,
        dst: &mut Vec<u8>,
        str_reader: &mut SectionReader<'_>,
        line_str_reader: &mut SectionReader<'_>,
        form: DwForm,
    ) -> DwarfResult<()>
    {
        match form {
            constants::DW_FORM_string => self.read_string(dst),
            constants::DW_FORM_strp => {
                let offset = self.read_section_offset()?;
                str_reader.read_string_at(dst, offset)
            }
            constants::DW_FORM_line_strp => {
                let offset = self.read_section_offset()?;
                line_str_reader.read_string_at(dst, offset)
            }
            _ => Err(DwarfError::UnsupportedForm(form)),
        }
    }

    /// Resolve a string index (`DW_FORM_strx*`) through this
    /// `.debug_str_offsets` reader and read the string it names from
    /// `str_reader`.
    ///
    /// `base` is the unit's `DW_AT_str_offsets_base`: the section offset of
    /// the first entry of its table, just past the table header. Entries are
    /// `format`-sized.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::OutOfBounds`] if the entry lies outside the section,
    /// and anything [`read_string_at`](Self::read_string_at) can return.
    pub fn read_indexed_string(
        &mut self,
        dst: &mut Vec<u8>,
        str_reader: &mut SectionReader<'_>,
        base: u64,
        index: u64,
        format: Format,
    ) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        let entry = index
            .checked_mul(u64::from(format.word_size()))
            .and_then(|delta| delta.checked_add(base))
            .ok_or(DwarfError::OutOfBounds {
                offset: u64::MAX,
                begin: self.begin_offset,
                end: self.section_end,
            })?;

        self.reset_end_offset()?;
        self.skip_to_section_offset(entry)?;
        let offset = self.read_offset(format)?;
        str_reader.read_string_at(dst, offset)
    }

    /// Index of the first NUL in the loaded, unconsumed bytes.
    fn find_terminator(&self) -> Option<usize>
    {
        let buffer = self.buffer.as_deref()?;
        buffer[self.cursor..self.filled]
            .iter()
            .position(|&byte| byte == 0)
            .map(|index| self.cursor + index)
    }

    /// Feed the string at the cursor to `sink` chunk by chunk and consume it
    /// along with its terminator.
    fn scan_string(&mut self, window: usize, mut sink: impl FnMut(&[u8])) -> DwarfResult<()>
    {
        self.ensure_enabled()?;
        let start = self.offset();
        loop {
            if self.available() == 0 {
                if self.remaining() == 0 {
                    return Err(DwarfError::UnterminatedString { offset: start });
                }
                self.reload(1, window)?;
            }

            let buffer = self.buffer.as_deref().ok_or(DwarfError::Disabled)?;
            let chunk = &buffer[self.cursor..self.filled];
            if let Some(index) = chunk.iter().position(|&byte| byte == 0) {
                sink(&chunk[..index]);
                self.cursor += index + 1;
                return Ok(());
            }

            sink(chunk);
            self.cursor = self.filled;
        }
    }
}
