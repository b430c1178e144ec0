//! Form-driven decoding.
//!
//! Every attribute value in `.debug_info` is encoded according to its form.
//! [`form_encoding`] maps each form the reader understands onto one decode
//! strategy; skipping, offset reads and address reads all dispatch through it
//! so the set of supported forms is defined in exactly one place.

use gimli::constants::{self, DwForm};
use tracing::debug;

use super::SectionReader;
use crate::error::{DwarfError, DwarfResult};
use crate::names::string_for_form;

/// How the bytes of one attribute value are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormEncoding
{
    /// No bytes in the entry (`flag_present`, `implicit_const`)
    Empty,
    /// A fixed number of bytes
    Fixed(u8),
    /// A target address of the unit's address size
    Address,
    /// A section offset of the unit's offset size
    Offset,
    /// An unsigned LEB128 integer
    Uleb128,
    /// A signed LEB128 integer
    Sleb128,
    /// A null-terminated string stored inline
    String,
    /// A block preceded by a fixed-width length of 1, 2 or 4 bytes
    Block(u8),
    /// A block preceded by an unsigned LEB128 length
    BlockUleb128,
    /// The actual form follows as an unsigned LEB128 code
    Indirect,
}

/// Decode strategy for `form`, or `None` if the reader does not know it.
///
/// Covers the DWARF 3, 4 and 5 form sets plus the GNU extensions emitted for
/// split and supplementary debug info.
#[must_use]
pub fn form_encoding(form: DwForm) -> Option<FormEncoding>
{
    let encoding = match form {
        constants::DW_FORM_flag_present | constants::DW_FORM_implicit_const => FormEncoding::Empty,

        constants::DW_FORM_data1
        | constants::DW_FORM_ref1
        | constants::DW_FORM_flag
        | constants::DW_FORM_strx1
        | constants::DW_FORM_addrx1 => FormEncoding::Fixed(1),
        constants::DW_FORM_data2 | constants::DW_FORM_ref2 | constants::DW_FORM_strx2 | constants::DW_FORM_addrx2 => {
            FormEncoding::Fixed(2)
        }
        constants::DW_FORM_strx3 | constants::DW_FORM_addrx3 => FormEncoding::Fixed(3),
        constants::DW_FORM_data4
        | constants::DW_FORM_ref4
        | constants::DW_FORM_ref_sup4
        | constants::DW_FORM_strx4
        | constants::DW_FORM_addrx4 => FormEncoding::Fixed(4),
        constants::DW_FORM_data8 | constants::DW_FORM_ref8 | constants::DW_FORM_ref_sig8 | constants::DW_FORM_ref_sup8 => {
            FormEncoding::Fixed(8)
        }
        constants::DW_FORM_data16 => FormEncoding::Fixed(16),

        constants::DW_FORM_addr => FormEncoding::Address,

        // Address-sized in DWARF 2 units; see `SectionReader::encoding_for`.
        constants::DW_FORM_ref_addr
        | constants::DW_FORM_sec_offset
        | constants::DW_FORM_strp
        | constants::DW_FORM_line_strp
        | constants::DW_FORM_strp_sup
        | constants::DW_FORM_GNU_ref_alt
        | constants::DW_FORM_GNU_strp_alt => FormEncoding::Offset,

        constants::DW_FORM_udata
        | constants::DW_FORM_ref_udata
        | constants::DW_FORM_strx
        | constants::DW_FORM_addrx
        | constants::DW_FORM_rnglistx
        | constants::DW_FORM_loclistx
        | constants::DW_FORM_GNU_addr_index
        | constants::DW_FORM_GNU_str_index => FormEncoding::Uleb128,
        constants::DW_FORM_sdata => FormEncoding::Sleb128,

        constants::DW_FORM_string => FormEncoding::String,

        constants::DW_FORM_block1 => FormEncoding::Block(1),
        constants::DW_FORM_block2 => FormEncoding::Block(2),
        constants::DW_FORM_block4 => FormEncoding::Block(4),
        constants::DW_FORM_block | constants::DW_FORM_exprloc => FormEncoding::BlockUleb128,

        constants::DW_FORM_indirect => FormEncoding::Indirect,

        _ => return None,
    };
    Some(encoding)
}

/// Whether [`SectionReader::read_string_from_form`] can decode `form`.
#[must_use]
pub fn is_string_form(form: DwForm) -> bool
{
    matches!(
        form,
        constants::DW_FORM_string | constants::DW_FORM_strp | constants::DW_FORM_line_strp
    )
}

/// Whether `form` is an index into `.debug_str_offsets`, resolved with
/// [`SectionReader::read_indexed_string`].
#[must_use]
pub fn is_indexed_string_form(form: DwForm) -> bool
{
    matches!(
        form,
        constants::DW_FORM_strx
            | constants::DW_FORM_strx1
            | constants::DW_FORM_strx2
            | constants::DW_FORM_strx3
            | constants::DW_FORM_strx4
            | constants::DW_FORM_GNU_str_index
    )
}

/// An address-class attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressValue
{
    /// A target address (`DW_FORM_addr`)
    Address(u64),
    /// An index into `.debug_addr` (`DW_FORM_addrx*`)
    Index(u64),
    /// A constant, such as a `DW_AT_high_pc` length relative to `DW_AT_low_pc`
    Offset(u64),
}

impl SectionReader<'_>
{
    /// Advance past one attribute value of the given form.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::UnsupportedForm`] for forms without a decode strategy
    /// (including an indirect form that names another indirect form), and
    /// any underlying read or bounds failure.
    pub fn skip_form(&mut self, form: DwForm) -> DwarfResult<()>
    {
        match self.encoding_for(form)? {
            FormEncoding::Empty => Ok(()),
            FormEncoding::Fixed(width) => self.skip_bytes(u64::from(width)),
            FormEncoding::Address => {
                let width = self.address_size.ok_or(DwarfError::AddressSizeUnknown)?;
                self.skip_bytes(u64::from(width))
            }
            FormEncoding::Offset => {
                let format = self.offset_size.ok_or(DwarfError::OffsetSizeUnknown)?;
                self.skip_bytes(u64::from(format.word_size()))
            }
            FormEncoding::Uleb128 => self.read_uleb128::<u64>().map(drop),
            FormEncoding::Sleb128 => self.read_sleb128::<i64>().map(drop),
            FormEncoding::String => self.skip_string(),
            FormEncoding::Block(width) => {
                let length = self.read_uint(width)?;
                self.skip_bytes(length)
            }
            FormEncoding::BlockUleb128 => {
                let length = self.read_uleb128::<u64>()?;
                self.skip_bytes(length)
            }
            FormEncoding::Indirect => {
                let actual = self.read_indirect_form()?;
                self.skip_form(actual)
            }
        }
    }

    /// Read an offset, index, reference or small constant of the given form,
    /// zero-extended to 64 bits.
    ///
    /// Accepts the fixed-width forms up to 8 bytes, the section offset forms
    /// and the unsigned LEB128 forms. `DW_FORM_ref_addr` in a DWARF 2 unit is
    /// read with the address size.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::UnsupportedForm`] for any other form, and any underlying
    /// read failure.
    pub fn read_offset_from_form(&mut self, form: DwForm) -> DwarfResult<u64>
    {
        match self.encoding_for(form)? {
            FormEncoding::Fixed(width) if width <= 8 => self.read_uint(width),
            FormEncoding::Offset => self.read_section_offset(),
            FormEncoding::Address if form == constants::DW_FORM_ref_addr => self.read_address(),
            FormEncoding::Uleb128 => self.read_uleb128(),
            FormEncoding::Indirect => {
                let actual = self.read_indirect_form()?;
                self.read_offset_from_form(actual)
            }
            _ => Err(unsupported(form)),
        }
    }

    /// Read an address-class value.
    ///
    /// `DW_FORM_addr` uses the established address size; the `addrx` forms
    /// yield a `.debug_addr` index whose width comes from the form itself;
    /// data forms yield an offset.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::UnsupportedForm`] for non-address forms,
    /// [`DwarfError::AddressSizeUnknown`] for `DW_FORM_addr` before the
    /// address size is known, and any underlying read failure.
    pub fn read_address_from_form(&mut self, form: DwForm) -> DwarfResult<AddressValue>
    {
        match form {
            constants::DW_FORM_addr => self.read_address().map(AddressValue::Address),
            constants::DW_FORM_addrx1 => self.read_uint(1).map(AddressValue::Index),
            constants::DW_FORM_addrx2 => self.read_uint(2).map(AddressValue::Index),
            constants::DW_FORM_addrx3 => self.read_uint(3).map(AddressValue::Index),
            constants::DW_FORM_addrx4 => self.read_uint(4).map(AddressValue::Index),
            constants::DW_FORM_addrx | constants::DW_FORM_GNU_addr_index => {
                self.read_uleb128().map(AddressValue::Index)
            }
            constants::DW_FORM_data1 => self.read_uint(1).map(AddressValue::Offset),
            constants::DW_FORM_data2 => self.read_uint(2).map(AddressValue::Offset),
            constants::DW_FORM_data4 => self.read_uint(4).map(AddressValue::Offset),
            constants::DW_FORM_data8 => self.read_uint(8).map(AddressValue::Offset),
            constants::DW_FORM_udata => self.read_uleb128().map(AddressValue::Offset),
            constants::DW_FORM_indirect => {
                let actual = self.read_indirect_form()?;
                self.read_address_from_form(actual)
            }
            _ => Err(unsupported(form)),
        }
    }

    /// [`form_encoding`] adjusted for the unit version recorded on the reader.
    fn encoding_for(&self, form: DwForm) -> DwarfResult<FormEncoding>
    {
        if form == constants::DW_FORM_ref_addr && self.version == Some(2) {
            return Ok(FormEncoding::Address);
        }
        form_encoding(form).ok_or_else(|| unsupported(form))
    }

    /// Read the form code that follows a `DW_FORM_indirect`.
    fn read_indirect_form(&mut self) -> DwarfResult<DwForm>
    {
        let form = DwForm(self.read_uleb128()?);
        if form == constants::DW_FORM_indirect {
            return Err(unsupported(form));
        }
        Ok(form)
    }
}

fn unsupported(form: DwForm) -> DwarfError
{
    debug!(form = form.0, name = string_for_form(form), "unsupported form");
    DwarfError::UnsupportedForm(form)
}
