use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::domain::{DefaultValueRecord, RunReport};
use crate::error::StoreError;

/// Reads a case tree document. Shape checks happen at expansion.
pub fn load_tree(path: &Path) -> Result<Value, StoreError> {
    read_json(path)
}

pub fn load_defaults(path: &Path) -> Result<DefaultValueRecord, StoreError> {
    match read_json(path)? {
        Value::Object(map) => Ok(DefaultValueRecord::from_map(map)),
        _ => Err(StoreError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let raw = serde_json::to_string_pretty(report)?;
    fs::write(path, raw).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json(path: &Path) -> Result<Value, StoreError> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
