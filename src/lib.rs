//! json-to-excel - JSON tables to expiring Excel downloads
//!
//! Exposes a `jsonToExcel` tool over the Model Context Protocol. Each call
//! writes an `.xlsx` file and returns a link that stays valid for a
//! configured window.
//!
//! # Architecture
//!
//! The interesting part is the artifact registry:
//! - Every generated file is registered with a deadline before its link is returned
//! - A background sweep removes files whose deadline has passed
//! - Shutdown removes everything still outstanding, serialized with sweeps
//!
//! # Modules
//!
//! - `adapters`: MCP JSON-RPC handling and the HTTP server
//! - `core`: Transformer, ArtifactRegistry, ExcelService
//! - `domain`: Data structures (ConversionRequest, Artifact, ResourceLink)
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the tool on localhost:8080
//! json-to-excel serve
//!
//! # Convert a request file offline
//! json-to-excel convert --input request.json --output table.xlsx
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{
    to_xlsx, ArtifactRegistry, ConversionOutcome, ExcelService, RegistryConfig, SweepReport,
};
pub use crate::domain::{Artifact, ConversionRequest, ResourceLink, ValidationError};
