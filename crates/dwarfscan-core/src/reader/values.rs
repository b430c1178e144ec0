//! Fixed-width values, LEB128 integers, initial lengths, offsets and addresses.
//!
//! All multi-byte values are taken in host byte order: the reader targets
//! debug info built for the machine that is reading it.

use std::mem::size_of;

use gimli::Format;
use tracing::debug;

use super::SectionReader;
use crate::error::{DwarfError, DwarfResult};

/// Plain integer types that can be decoded straight from host-order bytes.
pub trait Primitive: Copy + sealed::Sealed
{
    /// Encoded width in bytes
    const SIZE: usize;

    /// Build a value from exactly `SIZE` host-order bytes.
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

mod sealed
{
    pub trait Sealed {}
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Primitive for $ty
            {
                const SIZE: usize = size_of::<$ty>();

                fn from_ne_slice(bytes: &[u8]) -> Self
                {
                    let mut raw = [0u8; size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_primitive!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

/// First initial-length word of the reserved range.
const RESERVED_LENGTH_START: u32 = 0xffff_fff0;

/// Initial-length escape announcing a 64-bit DWARF length.
const DWARF64_ESCAPE: u32 = 0xffff_ffff;

/// Accept an address size of 4 bytes or the host pointer width.
///
/// ## Errors
///
/// [`DwarfError::InvalidAddressSize`] for any other value.
pub fn validate_address_size(size: u8) -> DwarfResult<u8>
{
    let width = usize::from(size);
    if width == size_of::<u32>() || width == size_of::<*const u8>() {
        Ok(size)
    } else {
        Err(DwarfError::InvalidAddressSize(size))
    }
}

impl SectionReader<'_>
{
    /// Read one fixed-width value in host byte order.
    ///
    /// ## Errors
    ///
    /// Fails if fewer than `T::SIZE` bytes remain in the window or the file
    /// read fails. The cursor does not move on failure.
    pub fn read_value<T: Primitive>(&mut self) -> DwarfResult<T>
    {
        self.take(T::SIZE).map(T::from_ne_slice)
    }

    pub fn read_u8(&mut self) -> DwarfResult<u8>
    {
        self.read_value()
    }

    pub fn read_u16(&mut self) -> DwarfResult<u16>
    {
        self.read_value()
    }

    pub fn read_u32(&mut self) -> DwarfResult<u32>
    {
        self.read_value()
    }

    pub fn read_u64(&mut self) -> DwarfResult<u64>
    {
        self.read_value()
    }

    /// Read an unsigned integer of `width` bytes (1 to 8), zero-extended.
    ///
    /// Covers the odd widths such as `DW_FORM_strx3`.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::InvalidSetting`] for a width outside 1..=8, otherwise as
    /// for [`read_value`](Self::read_value).
    pub fn read_uint(&mut self, width: u8) -> DwarfResult<u64>
    {
        let count = usize::from(width);
        if !(1..=8).contains(&count) {
            return Err(DwarfError::InvalidSetting {
                field: "integer width",
                value: u64::from(width),
            });
        }

        let bytes = self.take(count)?;
        let mut raw = [0u8; 8];
        if cfg!(target_endian = "little") {
            raw[..count].copy_from_slice(bytes);
        } else {
            raw[8 - count..].copy_from_slice(bytes);
        }
        Ok(u64::from_ne_bytes(raw))
    }

    /// Copy `dst.len()` bytes out of the section, across reloads if needed.
    ///
    /// ## Errors
    ///
    /// Fails if the window ends first or a file read fails.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> DwarfResult<()>
    {
        let mut copied = 0;
        while copied < dst.len() {
            let chunk = (dst.len() - copied).min(self.capacity().max(1));
            let bytes = self.take(chunk)?;
            dst[copied..copied + chunk].copy_from_slice(bytes);
            copied += chunk;
        }
        Ok(())
    }

    /// Read an unsigned LEB128 integer and narrow it to `T`.
    ///
    /// Overflow is always checked: an encoding whose value does not fit `T`,
    /// or that carries bits past the 64th, is rejected.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::Leb128Overflow`] as above, or any underlying read failure.
    pub fn read_uleb128<T: TryFrom<u64>>(&mut self) -> DwarfResult<T>
    {
        let start = self.offset();
        let value = self.read_uleb128_u64(start)?;
        T::try_from(value).map_err(|_| leb128_overflow(start, size_of::<T>()))
    }

    /// Read a signed LEB128 integer and narrow it to `T`.
    ///
    /// The value is sign-extended from the last 7-bit group before narrowing.
    ///
    /// ## Errors
    ///
    /// As for [`read_uleb128`](Self::read_uleb128).
    pub fn read_sleb128<T: TryFrom<i64>>(&mut self) -> DwarfResult<T>
    {
        let start = self.offset();
        let value = self.read_sleb128_i64(start)?;
        T::try_from(value).map_err(|_| leb128_overflow(start, size_of::<T>()))
    }

    fn read_uleb128_u64(&mut self, start: u64) -> DwarfResult<u64>
    {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            // The tenth byte may only contribute bit 63, and must end the value.
            if shift == 63 && byte > 1 {
                return Err(leb128_overflow(start, size_of::<u64>()));
            }

            result |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    fn read_sleb128_i64(&mut self, start: u64) -> DwarfResult<i64>
    {
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte != 0x00 && byte != 0x7f {
                return Err(leb128_overflow(start, size_of::<i64>()));
            }

            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Read a DWARF initial length and record the offset width it implies.
    ///
    /// - below `0xfffffff0`: a 32-bit length, offsets are 4 bytes wide
    /// - `0xffffffff`: the real length follows as 8 bytes, offsets are 8 bytes wide
    /// - anything else is reserved and rejected
    ///
    /// ## Errors
    ///
    /// [`DwarfError::ReservedInitialLength`] for the reserved range, or any
    /// underlying read failure.
    pub fn read_initial_length(&mut self) -> DwarfResult<u64>
    {
        let word = self.read_u32()?;
        if word < RESERVED_LENGTH_START {
            self.offset_size = Some(Format::Dwarf32);
            return Ok(u64::from(word));
        }

        if word == DWARF64_ESCAPE {
            let length = self.read_u64()?;
            self.offset_size = Some(Format::Dwarf64);
            return Ok(length);
        }

        debug!(offset = self.offset() - 4, value = word, "reserved initial length");
        Err(DwarfError::ReservedInitialLength(word))
    }

    /// Read a 4- or 8-byte offset, zero-extended to 64 bits.
    ///
    /// ## Errors
    ///
    /// Any underlying read failure.
    pub fn read_offset(&mut self, format: Format) -> DwarfResult<u64>
    {
        match format {
            Format::Dwarf32 => self.read_u32().map(u64::from),
            Format::Dwarf64 => self.read_u64(),
        }
    }

    /// Read an offset using the width set by the last initial length.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::OffsetSizeUnknown`] before any initial length was read.
    pub fn read_section_offset(&mut self) -> DwarfResult<u64>
    {
        let format = self.offset_size.ok_or(DwarfError::OffsetSizeUnknown)?;
        self.read_offset(format)
    }

    /// Read a target address of the established address size.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::AddressSizeUnknown`] before the address size was set.
    pub fn read_address(&mut self) -> DwarfResult<u64>
    {
        let size = self.address_size.ok_or(DwarfError::AddressSizeUnknown)?;
        self.read_uint(size)
    }

    /// Read the one-byte address size field of a header and adopt it.
    ///
    /// ## Errors
    ///
    /// [`DwarfError::InvalidAddressSize`] unless the byte is 4 or the host
    /// pointer width.
    pub fn read_address_size(&mut self) -> DwarfResult<u8>
    {
        let size = self.read_u8()?;
        self.set_address_size(size).inspect_err(|_| {
            debug!(offset = self.offset() - 1, size = size, "rejected address size");
        })?;
        Ok(size)
    }

    /// Set the address size explicitly.
    ///
    /// ## Errors
    ///
    /// As for [`read_address_size`](Self::read_address_size).
    pub fn set_address_size(&mut self, size: u8) -> DwarfResult<()>
    {
        self.address_size = Some(validate_address_size(size)?);
        Ok(())
    }
}

fn leb128_overflow(offset: u64, bytes: usize) -> DwarfError
{
    #[allow(clippy::cast_possible_truncation)]
    let bits = (bytes * 8) as u32;
    debug!(offset = offset, bits = bits, "LEB128 overflow");
    DwarfError::Leb128Overflow { offset, bits }
}
