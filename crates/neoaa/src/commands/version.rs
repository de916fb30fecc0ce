use clap::Args;
use miette::Result;

#[derive(Args)]
pub struct VersionArgs {}

impl VersionArgs {
    pub fn handle(&self) -> Result<()> {
        println!("neoaa {}", env!("CARGO_PKG_VERSION"));
        Ok(())
    }
}
