//! Generated spreadsheet artifacts.
//!
//! An artifact is one file in the download directory plus the deadline
//! after which it may be reclaimed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type of an `.xlsx` workbook
pub const XLSX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// File name prefix of generated artifacts
pub const ARTIFACT_PREFIX: &str = "result-";

/// File extension of generated artifacts
pub const ARTIFACT_EXTENSION: &str = "xlsx";

/// A persisted spreadsheet tracked by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name inside the download directory; doubles as the URL segment
    pub id: String,

    /// Full path on disk
    pub path: PathBuf,

    /// After this instant the file may be reclaimed
    pub expires_at: DateTime<Utc>,
}

impl Artifact {
    /// Create an artifact record
    pub fn new(id: String, path: PathBuf, expires_at: DateTime<Utc>) -> Self {
        Self {
            id,
            path,
            expires_at,
        }
    }
}

/// Whether a deadline has strictly passed at `now`
pub fn deadline_passed(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at < now
}

/// Reference to a downloadable resource, handed back to tool callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    pub uri: String,
    pub name: String,
    pub title: String,
    pub mime_type: String,
}

impl ResourceLink {
    /// Link to a spreadsheet artifact served under `{base_url}/downloads/`
    pub fn for_artifact(base_url: &str, artifact: &Artifact) -> Self {
        Self {
            uri: format!("{}/downloads/{}", base_url.trim_end_matches('/'), artifact.id),
            name: "json conversion result".to_string(),
            title: "data".to_string(),
            mime_type: XLSX_MIME_TYPE.to_string(),
        }
    }
}
