//! Domain types for the conversion service.
//!
//! This module contains the core data structures:
//! - ConversionRequest: Tool input (headers + rows)
//! - Artifact: A generated spreadsheet and its deadline
//! - ResourceLink: What a caller receives for a finished conversion

pub mod artifact;
pub mod request;

// Re-export commonly used types
pub use artifact::{
    deadline_passed, Artifact, ResourceLink, ARTIFACT_EXTENSION, ARTIFACT_PREFIX, XLSX_MIME_TYPE,
};
pub use request::{
    ConversionRequest, Record, ValidationError, MAX_CELL_CHARS, MAX_COLUMNS, MAX_DATA_ROWS,
};
