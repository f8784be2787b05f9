use anyhow::Context;
use clap::Args;
use wasp_client::{ActionParams, WaspClient};

use super::render;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ActionArgs {
    /// Action name as registered in the `services` collection.
    pub action: String,

    /// Action argument (`NAME=VALUE`).
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Keep the command's standard output with the run record.
    #[arg(long)]
    pub stdout: bool,

    /// Keep the command's standard error with the run record.
    #[arg(long)]
    pub stderr: bool,
}

fn params(args: &ActionArgs) -> anyhow::Result<ActionParams> {
    let mut params = args
        .params
        .iter()
        .map(|arg| {
            arg.split_once('=')
                .with_context(|| format!("expected NAME=VALUE, got '{arg}'"))
        })
        .collect::<anyhow::Result<ActionParams>>()?;
    if args.stdout {
        params = params.capture_stdout();
    }
    if args.stderr {
        params = params.capture_stderr();
    }
    Ok(params)
}

pub async fn run(client: &WaspClient, args: &ActionArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let result = client.run_action(&args.action, &params(args)?).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => println!("{}", render(&result)),
    }
    Ok(())
}
