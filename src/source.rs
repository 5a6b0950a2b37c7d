//! Work Item Source
//!
//! Loads the list of vulnerability records to ingest from a YAML document whose
//! top-level `bugs` key maps to an ordered sequence of records.

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Top-level key holding the record list
pub const SOURCE_KEY: &str = "bugs";

/// One vulnerability to be analyzed and uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Vulnerability identifier (e.g. a CVE id)
    pub reference: String,
    /// Repository holding the fix
    pub repo: String,
    /// Fix commit(s)
    pub commit: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub links: String,
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    #[serde(default)]
    bugs: Option<Vec<WorkItem>>,
}

/// Read and validate the work items stored at `path`.
pub async fn load_work_items(path: &Path) -> Result<Vec<WorkItem>, LoadError> {
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(LoadError::ReadFailure {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LoadError::ReadFailure {
            path: path.to_path_buf(),
            source: e,
        })?;

    let items = parse_work_items(&text, &path.display().to_string())?;
    debug!(source = %path.display(), items = items.len(), "Loaded work items");
    Ok(items)
}

/// Parse a source document. `origin` only labels errors.
pub fn parse_work_items(text: &str, origin: &str) -> Result<Vec<WorkItem>, LoadError> {
    let document: SourceDocument =
        serde_yaml::from_str(text).map_err(|e| LoadError::ParseFailure {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

    document.bugs.ok_or_else(|| LoadError::SchemaViolation {
        origin: origin.to_string(),
        key: SOURCE_KEY.to_string(),
    })
}
