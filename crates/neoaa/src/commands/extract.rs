use clap::Args;
use miette::{Context, Result};
use neoaa_archive::{
    tree::{extract, ExtractOptions},
    GenericArchive,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Allow overwriting existing files in the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = GenericArchive::from_path(&self.input)
            .context(format!("reading {}", self.input.display()))?;

        info!(
            "extracting {} items into {}",
            archive.raw().len(),
            self.output.display()
        );

        extract(
            archive.raw(),
            &self.output,
            &ExtractOptions::builder().overwrite(self.overwrite).build(),
        )
        .context(format!("extracting into {}", self.output.display()))?;

        Ok(())
    }
}
