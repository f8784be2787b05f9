use clap::{Args, Subcommand};
use wasp_client::WaspClient;

use super::print_record;
use super::records::RecordRef;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct MutableArgs {
    #[command(subcommand)]
    pub command: MutableCommand,
}

#[derive(Subcommand, Debug)]
pub enum MutableCommand {
    /// Report whether a record can be updated in place.
    Show(RecordRef),
    /// Seal a record.
    Seal(RecordRef),
    /// Unseal a record.
    Unseal(RecordRef),
}

pub async fn run(client: &WaspClient, args: &MutableArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let (target, record) = match &args.command {
        MutableCommand::Show(target) => {
            let mutable = client.is_mutable(&target.collection, &target.id).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "id": target.id,
                        "mutable": mutable,
                    }))?
                ),
                OutputFormat::Text => println!(
                    "{} is {}",
                    target.id,
                    if mutable { "mutable" } else { "immutable" }
                ),
            }
            return Ok(());
        }
        MutableCommand::Seal(target) => (
            target,
            client.set_immutable(&target.collection, &target.id).await?,
        ),
        MutableCommand::Unseal(target) => (
            target,
            client.set_mutable(&target.collection, &target.id).await?,
        ),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => {
            println!(
                "{} in {} is now {}",
                target.id,
                target.collection,
                if record.is_mutable() { "mutable" } else { "immutable" }
            );
            print_record(&record);
        }
    }
    Ok(())
}
