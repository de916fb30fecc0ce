use clap::Args;
use miette::{Context, Result};
use neoaa_archive::{tree::file_item, GenericArchive};
use std::path::PathBuf;
use tracing::info;

use super::OutputArgs;

#[derive(Args)]
pub struct AddArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// A target archive
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// The file to add
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Path of the file inside the archive, defaults to its file name
    #[arg(short, long, value_name = "PATH")]
    path: Option<String>,

    #[command(flatten)]
    pub(crate) writer: OutputArgs,
}

impl AddArgs {
    pub fn handle(&self) -> Result<()> {
        let mut archive = GenericArchive::from_path(&self.input)
            .context(format!("reading {}", self.input.display()))?
            .into_plain();

        let item = file_item(&self.file, self.path.as_deref())
            .context(format!("reading {}", self.file.display()))?;
        info!(
            "adding {} as {}",
            self.file.display(),
            item.path().unwrap_or_default()
        );
        archive.push(item)?;

        archive
            .write_path(&self.output, self.writer.options())
            .context(format!("creating {}", self.output.display()))?;

        Ok(())
    }
}
