//! # dwarfscan Utilities
//!
//! Shared helpers for the dwarfscan workspace, chiefly the `tracing`
//! subscriber setup used by the command-line tool.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
