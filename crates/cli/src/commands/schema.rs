use clap::Args;
use wasp_client::{DEFAULT_VIEW, Record, RecordSpec, WaspClient};

use super::render;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct SystemInfoArgs {
    pub collection: String,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    pub collection: String,

    /// Name of the view configuration.
    #[arg(long, default_value = DEFAULT_VIEW)]
    pub view: String,
}

#[derive(Args, Debug)]
pub struct TagValuesArgs {
    pub collection: String,
    pub tag: String,
}

pub async fn system_info(
    client: &WaspClient,
    args: &SystemInfoArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let info = client.get_system_info(&args.collection).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Text => {
            println!("{} tag(s) in {}:", info.tags().len(), args.collection);
            for tag in info.tags() {
                let schema = info.schema(tag)?;
                let mut line = format!("  {tag}");
                if schema.is_key {
                    line.push_str(" [key]");
                }
                if schema.is_mandatory {
                    line.push_str(" [mandatory]");
                }
                if let Some(default) = &schema.default_value {
                    line.push_str(&format!(" default={default}"));
                }
                if let Some(select) = &schema.select {
                    line.push_str(&format!(" select={}", serde_json::to_string(select)?));
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}

pub async fn view(client: &WaspClient, args: &ViewArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = client.get_view_info(&args.collection, &args.view).await?;
    let records = client
        .find_records(&args.collection, &RecordSpec::All, true)
        .await?;

    let headers: Vec<&str> = config.columns().iter().map(|c| c.name.as_str()).collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            config
                .columns()
                .iter()
                .map(|column| cell(record, &column.path()))
                .collect()
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .zip(row)
                        .map(|(name, value)| (name.to_string(), value.clone().into()))
                        .collect()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects)?);
        }
        OutputFormat::Text => print!("{}", table(&headers, &rows)),
    }
    Ok(())
}

pub async fn tag_values(
    client: &WaspClient,
    args: &TagValuesArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let values = client.get_tag_values(&args.collection, &args.tag).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&values)?),
        OutputFormat::Text => {
            for value in &values {
                println!("{}", render(value));
            }
        }
    }
    Ok(())
}

fn cell(record: &Record, path: &[&str]) -> String {
    record.get_path(path).map(render).unwrap_or_default()
}

/// Left-aligned text table with a dashed rule under the header.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(headers.to_vec());
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(rule.iter().map(String::as_str).collect()));
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasp_client::Value;

    #[test]
    fn table_pads_columns() {
        let rows = vec![
            vec!["a-long-id".to_string(), "1".to_string()],
            vec!["b".to_string(), String::new()],
        ];
        assert_eq!(
            table(&["id", "cores"], &rows),
            "id         cores\n---------  -----\na-long-id  1\nb\n"
        );
    }

    #[test]
    fn cells_follow_nested_paths() {
        let record = Record::new().with("runner", Record::new().with("module", "m"));
        assert_eq!(cell(&record, &["runner", "module"]), "m");
        assert_eq!(cell(&record, &["missing"]), "");
        assert_eq!(
            cell(&Record::new().with("n", Value::Integer(3)), &["n"]),
            "3"
        );
    }
}
