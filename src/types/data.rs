//! Node result views and file references.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Materialized node output fetched from the result-data service.
///
/// # Examples
///
/// ```
/// use flowsync::types::DataView;
///
/// let view: DataView = serde_json::from_value(serde_json::json!({
///     "type": "int",
///     "value": 42,
/// })).unwrap();
/// assert_eq!(view, DataView::Int(42));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DataView {
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Boolean scalar.
    Bool(bool),
    /// Tabular data.
    Table(TableView),
    /// Reference to a stored file.
    File(FileRef),
}

/// Column-major-labelled row data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows, one value per column.
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    /// Total row count on the backend, which may exceed `rows.len()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}

/// Reference to a file stored by the file service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef {
    /// Storage key, also the file cache key.
    pub key: String,
    /// Original file name.
    pub filename: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// File content as returned by the file service.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    /// Raw bytes.
    Bytes(Bytes),
    /// Parsed JSON document.
    Structured(Value),
}

impl FileContent {
    /// Content length in bytes (serialized length for structured content).
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Structured(value) => value.to_string().len(),
        }
    }

    /// Whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
