//! Collection display configuration.

use serde::{Deserialize, Deserializer, Serialize};

use crate::CoreError;

/// One displayed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column title, usually the tag it shows.
    pub name: String,
    /// Key path into the record whose value the column shows.
    #[serde(
        rename = "calculatePath",
        default,
        deserialize_with = "deserialize_path"
    )]
    pub calculate_path: Vec<String>,
    /// Remaining display hints (width, sort order, formatting, ...).
    #[serde(flatten)]
    pub hints: serde_json::Map<String, serde_json::Value>,
}

impl Column {
    /// Key path to resolve against a record; the column name when no path is set.
    pub fn path(&self) -> Vec<&str> {
        if self.calculate_path.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.calculate_path.iter().map(String::as_str).collect()
        }
    }
}

/// Read-only snapshot of how a collection should be displayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(rename = "properties", default)]
    columns: Vec<Column>,
}

impl ViewConfig {
    /// Decode the server's view configuration document.
    pub fn from_json(document: serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(document).map_err(|e| CoreError::Malformed(e.to_string()))
    }

    /// Columns in display order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

// The server sends `null`, a single key, or a list of keys.
fn deserialize_path<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPath {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<RawPath>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(RawPath::One(key)) => vec![key],
        Some(RawPath::Many(keys)) => keys,
    })
}
