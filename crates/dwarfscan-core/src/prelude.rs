//! Common module for library exports

pub use crate::elf::DebugSections;
pub use crate::error::{DwarfError, DwarfResult, ErrorClass};
pub use crate::file::FileAccess;
pub use crate::line::{FileEntry, LineProgramHeader};
pub use crate::reader::{AddressValue, ReaderOptions, SectionReader};
pub use crate::section::Section;
pub use crate::unit::{DwarfReaders, UnitHeader, UnitReport, UnitSummary};
