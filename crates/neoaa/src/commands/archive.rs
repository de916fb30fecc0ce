use clap::Args;
use miette::{Context, Result};
use neoaa_archive::tree::build_from_directory;
use std::path::PathBuf;
use tracing::info;

use super::OutputArgs;

#[derive(Args)]
pub struct ArchiveArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    input: PathBuf,

    /// A target archive
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    #[command(flatten)]
    pub(crate) writer: OutputArgs,
}

impl ArchiveArgs {
    pub fn handle(&self) -> Result<()> {
        info!("archiving {}", self.input.display());

        let archive = build_from_directory(&self.input)
            .context(format!("encoding {}", self.input.display()))?;

        archive
            .write_path(&self.output, self.writer.options())
            .context(format!("creating {}", self.output.display()))?;

        Ok(())
    }
}
