use clap::Args;
use miette::{Context, Result};
use neoaa_archive::{tree::file_item, PlainArchive};
use std::path::PathBuf;
use tracing::info;

use super::OutputArgs;

#[derive(Args)]
pub struct WrapArgs {
    /// An input file
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// A target archive
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    #[command(flatten)]
    pub(crate) writer: OutputArgs,
}

impl WrapArgs {
    pub fn handle(&self) -> Result<()> {
        info!("wrapping {}", self.input.display());

        let mut archive = PlainArchive::new();
        let item = file_item(&self.input, None)
            .context(format!("reading {}", self.input.display()))?;
        archive.push(item)?;

        archive
            .write_path(&self.output, self.writer.options())
            .context(format!("creating {}", self.output.display()))?;

        Ok(())
    }
}
