use clap::Args;
use tracing::info;
use wasp_client::{Record, RecordSpec, Value, WaspClient};

use super::{build_record, insert_path, parse_tag, print_record, print_records};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Collection to search.
    pub collection: String,

    /// Return the record with this identifier.
    #[arg(long, conflicts_with = "tags")]
    pub id: Option<String>,

    /// Tag the records must carry (`TAG=VALUE`, dotted names for nested tags).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Include superseded versions instead of only the latest.
    #[arg(long)]
    pub all_versions: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Collection to store the record in.
    pub collection: String,

    /// Tag value (`TAG=VALUE`).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// File attachment (`TAG=PATH`).
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Reference to another record (`TAG=COLLECTION/ID`).
    #[arg(long = "ref")]
    pub refs: Vec<String>,

    /// Check mandatory tags against the collection schema before uploading.
    #[arg(long)]
    pub validate: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub collection: String,
    pub id: String,

    /// Tag value to set (`TAG=VALUE`).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// File attachment to set (`TAG=PATH`).
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Tag to remove.
    #[arg(long = "remove")]
    pub remove: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RecordRef {
    pub collection: String,
    pub id: String,
}

#[derive(Args, Debug)]
pub struct MetaArgs {
    pub collection: String,
    pub id: String,

    /// Metadata tag value (`TAG=VALUE`).
    #[arg(long = "tag", required = true)]
    pub tags: Vec<String>,
}

pub async fn find(
    client: &WaspClient,
    args: &FindArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let spec = match &args.id {
        Some(id) => RecordSpec::Id(id.clone()),
        None if args.tags.is_empty() => RecordSpec::All,
        None => RecordSpec::Match(build_record(&args.tags, &[], &[])?),
    };
    let records = client
        .find_records(&args.collection, &spec, !args.all_versions)
        .await?;
    print_records(&records, format)
}

pub async fn add(client: &WaspClient, args: &AddArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let record = build_record(&args.tags, &args.files, &args.refs)?;
    if args.validate {
        client.validate_record(&args.collection, &record).await?;
    }
    let stored = client.add_record(&args.collection, &record).await?;
    info!(collection = %args.collection, id = stored.id().unwrap_or("?"), "record stored");
    print_one(&stored, format)
}

pub async fn update(
    client: &WaspClient,
    args: &UpdateArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let changes = build_record(&args.tags, &args.files, &[])?;
    let remove: Vec<&str> = args.remove.iter().map(String::as_str).collect();
    let updated = client
        .update_mutable_record(&args.collection, &args.id, &changes, &remove)
        .await?;
    print_one(&updated, format)
}

pub async fn delete(client: &WaspClient, args: &RecordRef) -> anyhow::Result<()> {
    if client.delete_record(&args.collection, &args.id).await? {
        println!("Deleted {} from {}", args.id, args.collection);
    } else {
        println!("Nothing to delete: {} not found in {}", args.id, args.collection);
    }
    Ok(())
}

pub async fn history(
    client: &WaspClient,
    args: &RecordRef,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let versions = client
        .get_record_history(&args.collection, &args.id)
        .await?;
    print_records(&versions, format)
}

pub async fn meta(client: &WaspClient, args: &MetaArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut metadata = Record::new();
    for arg in &args.tags {
        let (path, value) = parse_tag(arg)?;
        insert_path(&mut metadata, &path, Value::metadata(value));
    }
    let updated = client
        .set_record_metadata(&args.collection, &args.id, &metadata)
        .await?;
    print_one(&updated, format)
}

fn print_one(record: &Record, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Text => print_record(record),
    }
    Ok(())
}
