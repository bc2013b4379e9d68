//! Bulk export of raw store records and import of task files.

use crate::records::{decode_project_records, DecodeReport, ProjectRecord};
use crate::storage::{Store, StoreError, StoreKind};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub const TASKS_EXPORT_FILE: &str = "tasks.json";
pub const SUGGESTIONS_EXPORT_FILE: &str = "dropdowns.json";

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("reading {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid JSON format")]
    Json(#[from] serde_json::Error),
    #[error("Invalid JSON structure. Expected an array.")]
    NotAnArray,
}

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("writing {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encoding export")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written {
        kind: StoreKind,
        path: PathBuf,
        records: usize,
    },
    /// The store had no records, so no file was written.
    Empty { kind: StoreKind },
}

/// Parses an import document: a JSON array of `{project, tasks}` objects.
pub fn parse_import(text: &str) -> Result<(Vec<ProjectRecord>, DecodeReport), ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Array(entries) = value else {
        return Err(ImportError::NotAnArray);
    };
    Ok(decode_project_records(entries))
}

pub fn read_import(path: &Path) -> Result<(Vec<ProjectRecord>, DecodeReport), ImportError> {
    let text = fs::read_to_string(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_import(&text)
}

/// Writes one store's records as pretty-printed JSON to `path`.
pub fn export_store(
    store: &Store,
    kind: StoreKind,
    path: &Path,
) -> Result<ExportOutcome, ExportError> {
    let records = store.records(kind)?;
    if records.is_empty() {
        info!(store = kind.label(), "nothing to export");
        return Ok(ExportOutcome::Empty { kind });
    }
    let json = serde_json::to_string_pretty(&records)?;
    fs::write(path, json).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(store = kind.label(), path = ?path, records = records.len(), "exported");
    Ok(ExportOutcome::Written {
        kind,
        path: path.to_path_buf(),
        records: records.len(),
    })
}

/// Exports both stores into `dir`, tasks first.
pub fn export_all(store: &Store, dir: &Path) -> Result<Vec<ExportOutcome>, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(vec![
        export_store(store, StoreKind::Tasks, &dir.join(TASKS_EXPORT_FILE))?,
        export_store(store, StoreKind::Suggestions, &dir.join(SUGGESTIONS_EXPORT_FILE))?,
    ])
}

impl ExportOutcome {
    pub fn describe(&self) -> String {
        match self {
            ExportOutcome::Written {
                kind,
                path,
                records,
            } => format!("Exported {} {} record(s) to {}", records, kind.label(), path.display()),
            ExportOutcome::Empty { kind } => format!("No data found in {}", kind.label()),
        }
    }
}
