use clap::Args;
use neoaa_archive::{write::ArchiveWriterOptions, CompressionMethod};

pub mod add;
pub mod archive;
pub mod extract;
pub mod list;
pub mod unwrap;
pub mod version;
pub mod wrap;

/// Options shared by the commands producing an archive
#[derive(Args)]
pub struct OutputArgs {
    /// Compression algorithm: lzfse, zlib, lzbitmap or raw (no compression)
    #[arg(short, long, value_name = "ALGORITHM", default_value = "lzfse")]
    algorithm: String,

    /// Allow overwriting the output
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl OutputArgs {
    pub fn options(&self) -> ArchiveWriterOptions {
        ArchiveWriterOptions::builder()
            .compression(CompressionMethod::from_name(&self.algorithm))
            .overwrite(self.overwrite)
            .build()
    }
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Archive the contents of a directory
    Archive(archive::ArchiveArgs),
    /// Extract files from an archive
    Extract(extract::ExtractArgs),
    /// List the contents of an archive
    List(list::ListArgs),
    /// Add a file to an existing archive
    Add(add::AddArgs),
    /// Archive a single file
    Wrap(wrap::WrapArgs),
    /// Extract a single file from an archive
    Unwrap(unwrap::UnwrapArgs),
    /// Display the version of neoaa
    Version(version::VersionArgs),
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Archive(archive) => archive.handle(),
            Commands::Extract(extract) => extract.handle(),
            Commands::List(list) => list.handle(),
            Commands::Add(add) => add.handle(),
            Commands::Wrap(wrap) => wrap.handle(),
            Commands::Unwrap(unwrap) => unwrap.handle(),
            Commands::Version(version) => version.handle(),
        }
    }
}
