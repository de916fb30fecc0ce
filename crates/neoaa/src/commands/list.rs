use clap::Args;
use miette::{Context, Result};
use neoaa_archive::GenericArchive;
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = GenericArchive::from_path(&self.input)
            .context(format!("reading {}", self.input.display()))?;

        for path in archive.raw().paths() {
            println!("{path}");
        }

        Ok(())
    }
}
