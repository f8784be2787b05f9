//! Translation between [`Record`]s and the service's JSON, multipart and
//! query encodings.

use wasp_core::Entry;

use crate::{FileValue, Record, Value, WaspClient};

/// A record body ready for a multipart upload.
#[derive(Debug)]
pub(crate) struct Outgoing {
    /// JSON body with files replaced by `conduit_file` placeholders.
    pub body: serde_json::Value,
    /// Part name and content of every file referenced from `body`.
    pub files: Vec<(String, FileValue)>,
}

/// A record flattened into form fields, for servers without JSON upload support.
#[derive(Debug, Default)]
pub(crate) struct FormFields {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, FileValue)>,
}

/// Decode a JSON document from the service.
///
/// File and reference placeholders become bound [`FileValue`]s and
/// [`ReferenceValue`](crate::ReferenceValue)s; any other object becomes a
/// nested [`Record`].
pub(crate) fn decode(json: serde_json::Value, client: Option<&WaspClient>) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(|item| decode(item, client)).collect())
        }
        serde_json::Value::Object(object) => match Entry::from_object(&object) {
            Some(Entry::StoredFile { file_id, name }) => {
                Value::File(FileValue::stored(file_id, name, client.cloned()))
            }
            Some(Entry::Reference(entry)) => {
                let reference = crate::ReferenceValue::new(entry.id, entry.collection);
                Value::Reference(match client {
                    Some(client) => reference.with_client(client.clone()),
                    None => reference,
                })
            }
            _ => Value::Record(
                object
                    .into_iter()
                    .map(|(tag, value)| (tag, decode(value, client)))
                    .collect(),
            ),
        },
    }
}

/// Encode a record for a JSON multipart upload.
pub(crate) fn encode(record: &Record) -> Outgoing {
    let mut files = Vec::new();
    let body = encode_record(record, &mut files);
    Outgoing { body, files }
}

fn encode_record(record: &Record, files: &mut Vec<(String, FileValue)>) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(tag, value)| (tag.clone(), encode_value(value, files)))
            .collect(),
    )
}

fn encode_value(value: &Value, files: &mut Vec<(String, FileValue)>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(|item| encode_value(item, files)).collect())
        }
        Value::File(file) => {
            let part = format!("file-{}", files.len());
            files.push((part.clone(), file.clone()));
            Entry::PendingFile { part }.to_json()
        }
        Value::Reference(reference) => Entry::Reference(reference.get_entry().clone()).to_json(),
        Value::Record(nested) => encode_record(nested, files),
    }
}

/// Flatten a record into `a[b][c]`-style form fields.
///
/// References are flattened as their entry; lists repeat the field; nulls
/// are omitted.
pub(crate) fn encode_form(record: &Record) -> FormFields {
    let mut form = FormFields::default();
    for (tag, value) in record {
        flatten_form(tag, value, &mut form);
    }
    form
}

fn flatten_form(key: &str, value: &Value, form: &mut FormFields) {
    match value {
        Value::Record(nested) => {
            for (tag, value) in nested {
                flatten_form(&format!("{key}[{tag}]"), value, form);
            }
        }
        Value::Reference(reference) => {
            if let serde_json::Value::Object(entry) =
                Entry::Reference(reference.get_entry().clone()).to_json()
            {
                for (field, value) in entry {
                    if let Some(text) = value.as_str() {
                        form.fields.push((format!("{key}[{field}]"), text.to_string()));
                    }
                }
            }
        }
        Value::File(file) => form.files.push((key.to_string(), file.clone())),
        Value::List(items) => {
            for item in items {
                flatten_form(key, item, form);
            }
        }
        scalar => {
            if let Some(text) = scalar.to_plain_string() {
                form.fields.push((key.to_string(), text));
            }
        }
    }
}

/// Flatten a partial record into query parameters for a record search.
///
/// Nested keys are joined with `.`, lists with `,`. References match on their
/// entry fields; files and nulls cannot be matched and are skipped.
pub(crate) fn encode_query(record: &Record) -> Vec<(String, String)> {
    let mut query = Vec::new();
    for (tag, value) in record {
        flatten_query(tag, value, &mut query);
    }
    query
}

fn flatten_query(key: &str, value: &Value, query: &mut Vec<(String, String)>) {
    match value {
        Value::Record(nested) => {
            for (tag, value) in nested {
                flatten_query(&format!("{key}.{tag}"), value, query);
            }
        }
        Value::Reference(reference) => {
            let entry = reference.get_entry();
            query.push((format!("{key}.type"), "mongo_reference".to_string()));
            query.push((format!("{key}.mongo_collection"), entry.collection.clone()));
            query.push((format!("{key}.mongo_id"), entry.id.clone()));
        }
        Value::List(items) => {
            let joined: Vec<String> = items.iter().filter_map(Value::to_plain_string).collect();
            query.push((key.to_string(), joined.join(",")));
        }
        scalar => {
            if let Some(text) = scalar.to_plain_string() {
                query.push((key.to_string(), text));
            }
        }
    }
}
