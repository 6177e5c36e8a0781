//! `metadata.json` record type and its on-disk container format.
//!
//! The file holds a JSON array whose first (and only) element is the record.
//! Rewrites keep that wrapping and use a 3-space indent.
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::database_ops::db::KEY_FIELD;
use crate::errors::SkipReason;

pub const METADATA_FILE_NAME: &str = "metadata.json";

const INDENT: &[u8] = b"   ";

/// One prompt's metadata, as stored on disk and pushed to the collection.
///
/// The parsed object is kept as-is: key order, explicit nulls and values of
/// any type survive a rewrite or an upsert. The usual fields (`task`,
/// `language`, `models`, ...) are read through accessors that return `None`
/// when the file holds something of another type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataRecord {
    fields: Map<String, Value>,
    key: Option<String>,
}

impl MetadataRecord {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let key = fields.get(KEY_FIELD).and_then(key_from_value);
        Self { fields, key }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The upsert key, if one has been assigned.
    ///
    /// Blank strings do not count. A number is accepted and keyed by its
    /// decimal form.
    pub fn prompt_id(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Set `prompt_id`, replacing a blank value in place or appending the key.
    pub fn set_prompt_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.fields
            .insert(KEY_FIELD.to_string(), Value::String(id.clone()));
        self.key = Some(id);
    }

    pub fn task(&self) -> Option<&str> {
        self.fields.get("task").and_then(Value::as_str)
    }

    pub fn language(&self) -> Option<&str> {
        self.fields.get("language").and_then(Value::as_str)
    }

    /// Model names, when `models` is a list of strings.
    pub fn models(&self) -> Option<Vec<&str>> {
        self.fields
            .get("models")?
            .as_array()?
            .iter()
            .map(Value::as_str)
            .collect()
    }

    /// The record as a collection document. `prompt_id` is stored as a string.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        if let Some(key) = &self.key {
            doc.insert(KEY_FIELD.to_string(), Value::String(key.clone()));
        }
        Value::Object(doc)
    }
}

fn key_from_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the contents of a metadata file. Only the first array element is
/// used, and it must be a JSON object.
pub fn parse_metadata(path: &Path, raw: &str) -> Result<MetadataRecord, SkipReason> {
    let container: Value = serde_json::from_str(raw).map_err(|source| SkipReason::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let first = match container {
        Value::Array(items) => items.into_iter().next(),
        _ => None,
    };
    let Some(first) = first else {
        return Err(SkipReason::EmptyContainer {
            path: path.to_path_buf(),
        });
    };
    let fields: Map<String, Value> =
        serde_json::from_value(first).map_err(|source| SkipReason::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(MetadataRecord::from_fields(fields))
}

pub fn read_metadata(path: &Path) -> Result<MetadataRecord, SkipReason> {
    let raw = std::fs::read_to_string(path).map_err(|source| SkipReason::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_metadata(path, &raw)
}

/// Render a record in the wrapped single-element form used on disk.
pub fn render_metadata(record: &MetadataRecord) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    std::slice::from_ref(record.fields()).serialize(&mut ser)?;
    Ok(buf)
}

/// Rewrite the file through a sibling temp file and a rename, so a failed
/// write never leaves a truncated `metadata.json` behind.
pub fn write_metadata(path: &Path, record: &MetadataRecord) -> Result<(), SkipReason> {
    let write_err = |source: std::io::Error| SkipReason::Write {
        path: path.to_path_buf(),
        source,
    };
    let bytes = render_metadata(record).map_err(|e| write_err(e.into()))?;
    let temp_path = temp_path_for(path);
    if let Err(e) = std::fs::write(&temp_path, bytes) {
        if temp_path.is_file() {
            let _ = std::fs::remove_file(&temp_path);
        }
        return Err(write_err(e));
    }
    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        write_err(e)
    })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
