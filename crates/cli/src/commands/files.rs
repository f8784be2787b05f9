use std::path::PathBuf;

use clap::Args;
use wasp_client::WaspClient;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Server identifier of the file.
    pub file_id: String,

    /// Directory to write the file into; must exist.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Local file name. Defaults to the name the server reports.
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn download(client: &WaspClient, args: &DownloadArgs) -> anyhow::Result<()> {
    let path = client
        .download(&args.file_id, &args.dir, args.name.as_deref())
        .await?;
    println!("{}", path.display());
    Ok(())
}
