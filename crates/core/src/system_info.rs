//! Collection schema snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Declared properties of a single tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSchema {
    /// Whether the tag takes part in record identity.
    #[serde(rename = "isKey", default)]
    pub is_key: bool,
    /// Whether every record must carry the tag.
    #[serde(rename = "isMandatory", default)]
    pub is_mandatory: bool,
    /// Value used when a record omits the tag.
    #[serde(
        rename = "defaultValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<serde_json::Value>,
    /// Allowed values, when the tag is restricted to a fixed set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<serde_json::Value>>,
    /// Any other schema attributes the server reports (types, descriptions, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Read-only snapshot of a collection's tag schema.
///
/// The snapshot is not refreshed; fetch a new one to observe schema changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemInfo {
    tags: BTreeMap<String, TagSchema>,
}

impl SystemInfo {
    /// Decode the server's `tags_object` document.
    pub fn from_json(document: serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(document).map_err(|e| CoreError::Malformed(e.to_string()))
    }

    /// All declared tag names, sorted.
    pub fn tags(&self) -> Vec<&str> {
        self.tags.keys().map(String::as_str).collect()
    }

    /// Tags used to identify a record.
    pub fn key_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|(_, schema)| schema.is_key)
            .map(|(tag, _)| tag.as_str())
            .collect()
    }

    /// Tags every record must carry.
    pub fn mandatory_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|(_, schema)| schema.is_mandatory)
            .map(|(tag, _)| tag.as_str())
            .collect()
    }

    /// Full schema of one tag.
    pub fn schema(&self, tag: &str) -> Result<&TagSchema, CoreError> {
        self.tags
            .get(tag)
            .ok_or_else(|| CoreError::TagNotFound(tag.to_string()))
    }

    /// Default value of `tag`, `Ok(None)` if the tag declares none.
    pub fn get_default_value(&self, tag: &str) -> Result<Option<&serde_json::Value>, CoreError> {
        Ok(self.schema(tag)?.default_value.as_ref())
    }

    /// Allowed values of `tag`, `Ok(None)` if the tag is unrestricted.
    pub fn get_possible_values(&self, tag: &str) -> Result<Option<&[serde_json::Value]>, CoreError> {
        Ok(self.schema(tag)?.select.as_deref())
    }

    /// Mandatory tags missing from `present`.
    pub fn missing_mandatory<'a, I>(&self, present: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<&str> = present.into_iter().collect();
        self.mandatory_tags()
            .into_iter()
            .filter(|tag| !present.contains(tag))
            .map(str::to_string)
            .collect()
    }

    /// Fail with [`CoreError::MissingMandatory`] unless every mandatory tag is present.
    pub fn check_mandatory<'a, I>(&self, present: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing = self.missing_mandatory(present);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::MissingMandatory(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SystemInfo {
        SystemInfo::from_json(json!({
            "platform": {
                "isKey": true,
                "isMandatory": true,
                "select": ["SKL", "ICL", "TGL"],
            },
            "cores": {
                "isKey": false,
                "isMandatory": true,
                "defaultValue": 4,
            },
            "comment": {
                "isKey": false,
                "isMandatory": false,
                "type": "string",
            },
        }))
        .unwrap()
    }

    #[test]
    fn tag_lists() {
        let info = sample();
        assert_eq!(info.tags(), vec!["comment", "cores", "platform"]);
        assert_eq!(info.key_tags(), vec!["platform"]);
        assert_eq!(info.mandatory_tags(), vec!["cores", "platform"]);
    }

    #[test]
    fn default_and_possible_values() {
        let info = sample();
        assert_eq!(info.get_default_value("cores").unwrap(), Some(&json!(4)));
        assert_eq!(info.get_default_value("platform").unwrap(), None);
        assert_eq!(
            info.get_possible_values("platform").unwrap().map(<[_]>::len),
            Some(3)
        );
        assert_eq!(info.get_possible_values("comment").unwrap(), None);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let info = sample();
        assert_eq!(
            info.get_default_value("missing"),
            Err(CoreError::TagNotFound("missing".into()))
        );
        assert_eq!(
            info.get_possible_values("missing"),
            Err(CoreError::TagNotFound("missing".into()))
        );
    }

    #[test]
    fn extra_attributes_are_kept() {
        let info = sample();
        let schema = info.schema("comment").unwrap();
        assert_eq!(schema.extra.get("type"), Some(&json!("string")));
    }

    #[test]
    fn mandatory_check() {
        let info = sample();
        assert!(info.check_mandatory(["platform", "cores", "extra"]).is_ok());
        assert_eq!(
            info.check_mandatory(["platform"]),
            Err(CoreError::MissingMandatory(vec!["cores".into()]))
        );
    }

    #[test]
    fn malformed_document() {
        let err = SystemInfo::from_json(json!(["not", "a", "map"])).unwrap_err();
        assert!(matches!(err, CoreError::Malformed(_)));
    }
}
