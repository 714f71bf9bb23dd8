//! Core conversion logic.
//!
//! This module contains:
//! - Transformer: Request rows to spreadsheet bytes
//! - Registry: Artifact lifetimes, eviction sweeps and shutdown cleanup
//! - Service: The conversion path tying both together

pub mod registry;
pub mod service;
pub mod transformer;

// Re-export commonly used types
pub use registry::{
    ArtifactRegistry, ReclaimFailure, ReclaimObserver, ReclaimReason, RegistryConfig,
    RegistryError, SweepHandle, SweepReport, TracingObserver,
};
pub use service::{ConversionError, ConversionOutcome, ExcelService};
pub use transformer::{to_xlsx, TransformError, SHEET_NAME};
