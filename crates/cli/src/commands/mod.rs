pub mod action;
pub mod files;
pub mod mutable;
pub mod records;
pub mod schema;

use std::path::PathBuf;

use anyhow::Context;
use wasp_client::{FileValue, Record, ReferenceValue, Value};

use crate::OutputFormat;

/// Split a `runner.module` style key into its path.
fn split_key(key: &str) -> anyhow::Result<Vec<String>> {
    let path: Vec<String> = key.split('.').map(str::to_string).collect();
    anyhow::ensure!(
        path.iter().all(|segment| !segment.is_empty()),
        "invalid tag name '{key}'"
    );
    Ok(path)
}

fn split_pair<'a>(arg: &'a str, expected: &str) -> anyhow::Result<(&'a str, &'a str)> {
    arg.split_once('=')
        .with_context(|| format!("expected {expected}, got '{arg}'"))
}

/// Parse `TAG=VALUE`. Values that are valid JSON keep their type
/// (`cores=4`, `ok=true`, `list=[1,2]`); anything else is a string.
pub fn parse_tag(arg: &str) -> anyhow::Result<(Vec<String>, Value)> {
    let (key, raw) = split_pair(arg, "TAG=VALUE")?;
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map_or_else(|_| Value::from(raw), Value::from);
    Ok((split_key(key)?, value))
}

/// Set `value` at `path`, creating nested records on the way.
pub fn insert_path(record: &mut Record, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        record.insert(head.clone(), value);
        return;
    }
    if !matches!(record.get(head), Some(Value::Record(_))) {
        record.insert(head.clone(), Record::new());
    }
    if let Some(Value::Record(nested)) = record.get_mut(head) {
        insert_path(nested, rest, value);
    }
}

/// Build a record from `--tag TAG=VALUE`, `--file TAG=PATH` and
/// `--ref TAG=COLLECTION/ID` arguments.
pub fn build_record(tags: &[String], files: &[String], refs: &[String]) -> anyhow::Result<Record> {
    let mut record = Record::new();
    for arg in tags {
        let (path, value) = parse_tag(arg)?;
        insert_path(&mut record, &path, value);
    }
    for arg in files {
        let (key, path) = split_pair(arg, "TAG=PATH")?;
        let path = PathBuf::from(path);
        anyhow::ensure!(path.is_file(), "'{}' is not a file", path.display());
        insert_path(&mut record, &split_key(key)?, FileValue::from_path(path).into());
    }
    for arg in refs {
        let (key, target) = split_pair(arg, "TAG=COLLECTION/ID")?;
        let (collection, id) = target
            .split_once('/')
            .with_context(|| format!("expected TAG=COLLECTION/ID, got '{arg}'"))?;
        insert_path(
            &mut record,
            &split_key(key)?,
            ReferenceValue::new(id, collection).into(),
        );
    }
    Ok(record)
}

/// One-line rendering of a value for text output.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::File(file) => match file.file_url() {
            Some(url) => format!("<file {}> {url}", file.name().unwrap_or("?")),
            None => format!("<file {}>", file.name().unwrap_or("?")),
        },
        Value::Reference(reference) => {
            format!("<{}/{}>", reference.collection(), reference.id())
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

pub fn print_record(record: &Record) {
    println!(
        "- {} (version {})",
        record.id().unwrap_or("?"),
        record
            .version()
            .map_or_else(|| "?".to_string(), |v| v.to_string())
    );
    for (tag, value) in record {
        if tag != "_id" && tag != "version" {
            println!("    {tag}: {}", render(value));
        }
    }
}

pub fn print_records(records: &[Record], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Text => {
            println!("{} record(s):", records.len());
            for record in records {
                print_record(record);
            }
        }
    }
    Ok(())
}
