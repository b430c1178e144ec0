//! # Error Types
//!
//! Error handling for the section reader and the DWARF walkers built on it.
//!
//! We use `thiserror` to generate the `Error` trait implementations. Every
//! payload is `Copy`, so constructing an error never touches the heap: the
//! reader runs during crash capture where allocation may not be safe.

use std::io;

use gimli::constants::DwForm;
use thiserror::Error;

/// Broad classification of a [`DwarfError`].
///
/// Callers walking compile units use this to decide whether to abandon the
/// current unit (everything but [`ErrorClass::Misuse`]) or to stop outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass
{
    /// The file could not supply the bytes.
    Io,
    /// A read, skip, or seek would leave the bound section.
    Bounds,
    /// The bytes were there but do not form a valid encoding.
    Malformed,
    /// The reader was driven incorrectly.
    Misuse,
}

/// Main error type for section reader operations
///
/// ## Error Categories
///
/// 1. **I/O errors**: Io, ShortRead
/// 2. **Bounds errors**: OutOfBounds, Truncated
/// 3. **Malformed input**: ReservedInitialLength, InvalidAddressSize, Leb128Overflow,
///    UnsupportedForm, UnterminatedString, StringTooLong, UnsupportedVersion,
///    MissingAbbreviation, InvalidSetting, Object
/// 4. **Misuse**: Disabled, AddressSizeUnknown, OffsetSizeUnknown, BufferTooSmall,
///    EmptySection
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwarfError
{
    /// The file access collaborator reported an error.
    #[error("I/O error reading {length} bytes at offset 0x{offset:x}: {kind}")]
    Io
    {
        /// Absolute file offset of the failed read
        offset: u64,
        /// Number of bytes requested
        length: usize,
        /// Underlying error kind
        kind: io::ErrorKind,
    },

    /// The collaborator returned fewer bytes than the reader required.
    #[error("short read at offset 0x{offset:x}: needed {needed} bytes, got {got}")]
    ShortRead
    {
        /// Absolute file offset of the read
        offset: u64,
        /// Bytes the caller asked for
        needed: usize,
        /// Bytes actually delivered
        got: usize,
    },

    /// A seek target lies outside the bound section.
    #[error("offset 0x{offset:x} outside section window [0x{begin:x}, 0x{end:x}]")]
    OutOfBounds
    {
        /// Requested absolute offset
        offset: u64,
        /// Absolute start of the window
        begin: u64,
        /// Absolute end of the window
        end: u64,
    },

    /// Fewer bytes remain before the end of the window than the read needs.
    #[error("truncated data at offset 0x{offset:x}: needed {needed} bytes, {remaining} remain")]
    Truncated
    {
        /// Absolute offset where the read started
        offset: u64,
        /// Bytes the read needed
        needed: usize,
        /// Bytes left before the window end
        remaining: u64,
    },

    /// An initial length in the reserved range `0xfffffff0..0xffffffff`.
    #[error("reserved initial length value 0x{0:08x}")]
    ReservedInitialLength(u32),

    /// An address size that is neither 4 bytes nor the host pointer width.
    #[error("unsupported address size {0}")]
    InvalidAddressSize(u8),

    /// A LEB128 value that does not fit its destination type.
    #[error("LEB128 value at offset 0x{offset:x} overflows a {bits}-bit integer")]
    Leb128Overflow
    {
        /// Absolute offset of the first byte of the encoding
        offset: u64,
        /// Width of the destination type
        bits: u32,
    },

    /// A form code the reader has no decode strategy for.
    #[error("unsupported attribute form {0}")]
    UnsupportedForm(DwForm),

    /// A string ran into the end of its section without a terminator.
    #[error("unterminated string starting at offset 0x{offset:x}")]
    UnterminatedString
    {
        /// Absolute offset of the first byte of the string
        offset: u64,
    },

    /// A zero-copy string longer than the scratch buffer can hold.
    #[error("string at offset 0x{offset:x} does not fit a {capacity}-byte buffer")]
    StringTooLong
    {
        /// Absolute offset of the first byte of the string
        offset: u64,
        /// Capacity of the scratch buffer
        capacity: usize,
    },

    /// A unit or line program header with a version outside 2..=5.
    #[error("unsupported DWARF version {0}")]
    UnsupportedVersion(u16),

    /// A DIE refers to an abbreviation code the table does not define.
    #[error("abbreviation code {0} not found")]
    MissingAbbreviation(u64),

    /// A header field holds a value the walker cannot work with.
    #[error("invalid {field} value {value}")]
    InvalidSetting
    {
        /// Header field name
        field: &'static str,
        /// The offending value
        value: u64,
    },

    /// The object file container itself could not be parsed.
    #[error("object file error: {0}")]
    Object(#[from] object::Error),

    /// The reader has no buffer bound to it.
    #[error("section reader is not enabled")]
    Disabled,

    /// An address-sized read before the address size was established.
    #[error("address size has not been established")]
    AddressSizeUnknown,

    /// A section-offset read before an initial length was decoded.
    #[error("offset size has not been established")]
    OffsetSizeUnknown,

    /// The scratch buffer is smaller than the widest fixed-size read.
    #[error("scratch buffer of {got} bytes is below the {min}-byte minimum")]
    BufferTooSmall
    {
        /// Capacity supplied
        got: usize,
        /// Minimum capacity required
        min: usize,
    },

    /// Binding a section that is empty, or lies entirely past the end of the file.
    #[error("empty section at offset 0x{offset:x}")]
    EmptySection
    {
        /// Absolute offset of the section
        offset: u64,
    },
}

impl DwarfError
{
    /// Taxonomy class of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass
    {
        match self {
            DwarfError::Io { .. } | DwarfError::ShortRead { .. } => ErrorClass::Io,
            DwarfError::OutOfBounds { .. } | DwarfError::Truncated { .. } => ErrorClass::Bounds,
            DwarfError::ReservedInitialLength(_)
            | DwarfError::InvalidAddressSize(_)
            | DwarfError::Leb128Overflow { .. }
            | DwarfError::UnsupportedForm(_)
            | DwarfError::UnterminatedString { .. }
            | DwarfError::StringTooLong { .. }
            | DwarfError::UnsupportedVersion(_)
            | DwarfError::MissingAbbreviation(_)
            | DwarfError::InvalidSetting { .. }
            | DwarfError::Object(_) => ErrorClass::Malformed,
            DwarfError::Disabled
            | DwarfError::AddressSizeUnknown
            | DwarfError::OffsetSizeUnknown
            | DwarfError::BufferTooSmall { .. }
            | DwarfError::EmptySection { .. } => ErrorClass::Misuse,
        }
    }

    #[must_use]
    pub fn is_io(&self) -> bool
    {
        self.class() == ErrorClass::Io
    }

    #[must_use]
    pub fn is_bounds(&self) -> bool
    {
        self.class() == ErrorClass::Bounds
    }

    #[must_use]
    pub fn is_malformed(&self) -> bool
    {
        self.class() == ErrorClass::Malformed
    }

    #[must_use]
    pub fn is_misuse(&self) -> bool
    {
        self.class() == ErrorClass::Misuse
    }
}

/// Convenience type alias for `Result<T, DwarfError>`
///
/// ```rust
/// use dwarfscan_core::error::DwarfResult;
/// fn foo() -> DwarfResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type DwarfResult<T> = std::result::Result<T, DwarfError>;
