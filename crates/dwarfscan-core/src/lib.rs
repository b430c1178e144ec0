//! # dwarfscan-core
//!
//! Streaming access to the DWARF debug sections of an object file.
//!
//! The centre of the crate is [`SectionReader`], a cursor that decodes
//! fixed-width integers, LEB128 values, initial lengths, addresses, strings
//! and form-encoded attribute values while holding only a small window of
//! the section in a caller-supplied buffer. It is meant for symbolicating
//! stack traces from a process that may be in a bad state, so the reader
//! itself never allocates and every read is checked against its section.
//!
//! On top of the reader sit a few consumers:
//! - [`elf`]: locate the debug sections in an object file
//! - [`unit`]: unit headers, abbreviation tables and root DIE summaries
//! - [`line`]: line-number program headers
//! - [`names`]: mnemonic names for DWARF constants, for diagnostics

pub mod elf;
pub mod error;
pub mod file;
pub mod line;
pub mod names;
pub mod prelude;
pub mod reader;
pub mod section;
pub mod unit;

// Re-export commonly used types
pub use error::{DwarfError, DwarfResult, ErrorClass};
pub use file::FileAccess;
pub use reader::{ReaderOptions, SectionReader};
pub use section::Section;
