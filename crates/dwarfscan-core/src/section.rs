//! Section descriptor type.

use std::fmt;

/// One contiguous byte range of an object file.
///
/// Offsets are absolute file offsets, not virtual addresses. A `Section` is a
/// plain value: any number of readers may be bound to the same one.
///
/// ## Example
///
/// ```rust
/// use dwarfscan_core::section::Section;
///
/// let info = Section::new(0x1000, 0x200);
/// assert_eq!(info.end(), 0x1200);
/// assert!(!info.is_empty());
/// assert!(Section::new(0x1200, 0).is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Section
{
    /// Byte offset of the section from the start of the file
    pub offset: u64,
    /// Length of the section in bytes
    pub size: u64,
}

impl Section
{
    pub const fn new(offset: u64, size: u64) -> Self
    {
        Self { offset, size }
    }

    /// Offset one past the last byte, saturating at `u64::MAX`.
    pub const fn end(self) -> u64
    {
        self.offset.saturating_add(self.size)
    }

    pub const fn is_empty(self) -> bool
    {
        self.size == 0
    }
}

impl fmt::Display for Section
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[0x{:08x}, 0x{:08x})", self.offset, self.end())
    }
}
