//! Typed tag values.

use serde::ser::{Serialize, Serializer};
use wasp_core::{Entry, METADATA_TYPE};

use crate::{FileValue, Record, ReferenceValue};

/// Value of a record tag.
///
/// JSON scalars map to the obvious variants. File attachments and references
/// to other records have dedicated variants so they can be transferred
/// without inlining their content.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    File(FileValue),
    Reference(ReferenceValue),
    Record(Record),
}

impl Value {
    /// A metadata tag value: `{"type": "meta_data", "value": value}`.
    ///
    /// Metadata tags can later be changed with
    /// [`WaspClient::set_record_metadata`](crate::WaspClient::set_record_metadata)
    /// without creating a new record version.
    pub fn metadata(value: impl Into<Value>) -> Self {
        Self::Record(
            Record::new()
                .with("type", METADATA_TYPE)
                .with("value", value),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; numeric strings are accepted since some servers send counters as text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileValue> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceValue> {
        match self {
            Self::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Scalar rendering used in query strings and form fields.
    ///
    /// Returns `None` for values that have no flat text form.
    pub(crate) fn to_plain_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(n) => Some(n.to_string()),
            // Debug keeps the fraction: `4.0`, not `4`.
            Self::Float(f) => Some(format!("{f:?}")),
            Self::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Serializes to plain JSON for display and export.
///
/// Stored files and references become their entry objects. A file that was
/// never stored has no identifier and is rendered as its name.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => items.serialize(serializer),
            Self::File(file) => match file.file_id() {
                Some(file_id) => Entry::StoredFile {
                    file_id: file_id.to_string(),
                    name: file.name().map(str::to_string),
                }
                .serialize(serializer),
                None => file.name().serialize(serializer),
            },
            Self::Reference(reference) => {
                Entry::Reference(reference.get_entry().clone()).serialize(serializer)
            }
            Self::Record(record) => record.serialize(serializer),
        }
    }
}

/// Plain JSON without a client: stored files and references come back unbound.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        crate::marshal::decode(json, None)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<FileValue> for Value {
    fn from(file: FileValue) -> Self {
        Self::File(file)
    }
}

impl From<ReferenceValue> for Value {
    fn from(reference: ReferenceValue) -> Self {
        Self::Reference(reference)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
