use clap::Args;
use miette::{Context, Result};
use neoaa_archive::{GenericArchive, MatchMode};
use std::path::PathBuf;

#[derive(Args)]
pub struct UnwrapArgs {
    /// An input archive
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// A target file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Path of the file inside the archive, matched as a prefix
    #[arg(short, long, value_name = "PATH")]
    path: String,

    /// Only match the path exactly
    #[arg(long, default_value_t = false)]
    exact: bool,
}

impl UnwrapArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = GenericArchive::from_path(&self.input)
            .context(format!("reading {}", self.input.display()))?;

        let mode = if self.exact {
            MatchMode::Exact
        } else {
            MatchMode::Prefix
        };

        archive
            .raw()
            .unwrap_to_path(&self.path, mode, &self.output)
            .context(format!("unwrapping {}", self.path))?;

        Ok(())
    }
}
