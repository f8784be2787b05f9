use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::ser::{Serialize, SerializeMap, Serializer};
use wasp_core::{ID_TAG, METADATA_TYPE, MUTABLE_TAG, SYSTEM_TAGS, VERSION_TAG};

use crate::Value;

/// A WASP record: tag name to [`Value`].
///
/// Tag names are unique. Iteration is in tag-name order, which carries no
/// meaning for the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    tags: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, tag: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(tag, value);
        self
    }

    /// Insert a tag, returning the previous value.
    pub fn insert(&mut self, tag: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.tags.insert(tag.into(), value.into())
    }

    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.tags.get(tag)
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut Value> {
        self.tags.get_mut(tag)
    }

    pub fn remove(&mut self, tag: &str) -> Option<Value> {
        self.tags.remove(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.tags.iter()
    }

    /// Server-assigned identifier (`_id`).
    pub fn id(&self) -> Option<&str> {
        self.get(ID_TAG).and_then(Value::as_str)
    }

    /// Version counter, when the server reports one.
    pub fn version(&self) -> Option<i64> {
        self.get(VERSION_TAG).and_then(Value::as_i64)
    }

    /// Whether the record accepts in-place updates. Records without the flag are mutable.
    pub fn is_mutable(&self) -> bool {
        self.get(MUTABLE_TAG)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Value of a metadata tag (`{"type": "meta_data", "value": ...}`).
    pub fn metadata(&self, tag: &str) -> Option<&Value> {
        let nested = self.get(tag)?.as_record()?;
        if nested.get("type").and_then(Value::as_str) == Some(METADATA_TYPE) {
            nested.get("value")
        } else {
            None
        }
    }

    /// Follow a key path through nested records.
    ///
    /// Referenced records are followed only when their body is already cached;
    /// the lookup never triggers a request.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get(first.as_ref())?;
        for key in rest {
            let record = match current {
                Value::Record(record) => record,
                Value::Reference(reference) => reference.cached_record()?,
                _ => return None,
            };
            current = record.get(key.as_ref())?;
        }
        Some(current)
    }

    /// Copy without the tags the server assigns itself, at every nesting level.
    pub fn without_system_tags(&self) -> Self {
        let tags = self
            .tags
            .iter()
            .filter(|(tag, _)| !SYSTEM_TAGS.contains(&tag.as_str()))
            .map(|(tag, value)| {
                let value = match value {
                    Value::Record(nested) => Value::Record(nested.without_system_tags()),
                    other => other.clone(),
                };
                (tag.clone(), value)
            })
            .collect();
        Self { tags }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tags.len()))?;
        for (tag, value) in &self.tags {
            map.serialize_entry(tag, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            tags: iter
                .into_iter()
                .map(|(tag, value)| (tag.into(), value.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}
