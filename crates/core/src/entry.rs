//! Placeholder objects embedded in record bodies.
//!
//! The service does not inline file content or referenced records. A file tag
//! carries a small tagged object instead, and so does a cross-record
//! reference. The `type` field tells them apart from ordinary nested records.

use serde::{Deserialize, Serialize};

/// A typed placeholder found in (or sent inside) a record body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Entry {
    /// A file being uploaded. `part` names the multipart part carrying the bytes.
    #[serde(rename = "conduit_file")]
    PendingFile {
        #[serde(rename = "name")]
        part: String,
    },
    /// A file already stored by the service.
    #[serde(rename = "mongo_file")]
    StoredFile {
        #[serde(rename = "mongo_id")]
        file_id: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// A link to a record, possibly in another collection.
    #[serde(rename = "mongo_reference")]
    Reference(ReferenceEntry),
}

/// Identifier/collection pair of a referenced record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceEntry {
    #[serde(rename = "mongo_collection")]
    pub collection: String,
    #[serde(rename = "mongo_id")]
    pub id: String,
}

impl Entry {
    const KNOWN_TYPES: [&'static str; 3] = ["conduit_file", "mongo_file", "mongo_reference"];

    /// Interpret a JSON object as an entry.
    ///
    /// Returns `None` for objects without a recognised `type`, and for objects
    /// whose `type` is recognised but whose fields do not match; both are
    /// ordinary nested records as far as the caller is concerned.
    pub fn from_object(object: &serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        let kind = object.get("type")?.as_str()?;
        if !Self::KNOWN_TYPES.contains(&kind) {
            return None;
        }
        serde_json::from_value(serde_json::Value::Object(object.clone())).ok()
    }

    /// Serialize the entry into the JSON object sent to the service.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl ReferenceEntry {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl From<ReferenceEntry> for Entry {
    fn from(entry: ReferenceEntry) -> Self {
        Self::Reference(entry)
    }
}
