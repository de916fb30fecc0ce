//! Types for writing archives
//!

use bon::Builder;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::archive::PlainArchive;
use crate::compression::{CompressionMethod, ContainerWriter, DEFAULT_BLOCK_SIZE};
use crate::error::Result;
use crate::item::Item;

/// Options for how the archive should be written
#[derive(Debug, Clone, Copy, Builder)]
pub struct ArchiveWriterOptions {
    /// The compression method applied to the item stream
    #[builder(default)]
    pub compression: CompressionMethod,

    /// Uncompressed size of each chunk of a compressed container
    #[builder(default = DEFAULT_BLOCK_SIZE)]
    pub block_size: u64,

    /// Replace the output file when it already exists
    #[builder(default)]
    pub overwrite: bool,
}

impl Default for ArchiveWriterOptions {
    fn default() -> Self {
        ArchiveWriterOptions::builder().build()
    }
}

/// Archive generator
///
/// ```
/// # fn doit() -> neoaa_archive::error::Result<()>
/// # {
/// use neoaa_archive::item::EntryMetadata;
/// use neoaa_archive::write::{ArchiveWriter, ArchiveWriterOptions};
/// use neoaa_archive::{CompressionMethod, Item};
///
/// let mut writer = ArchiveWriter::new(
///     Vec::new(),
///     ArchiveWriterOptions::builder()
///         .compression(CompressionMethod::Zlib)
///         .build(),
/// )?;
///
/// writer.write_item(&Item::file("hello_world.txt", b"Hello, World!".to_vec(), &EntryMetadata::default())?)?;
///
/// let bytes = writer.finish()?;
/// assert!(bytes.starts_with(b"pbzz"));
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct ArchiveWriter<W: Write> {
    inner: ContainerWriter<W>,
    items: usize,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start an archive, writing the container header right away when compressing
    pub fn new(inner: W, options: ArchiveWriterOptions) -> Result<ArchiveWriter<W>> {
        Ok(ArchiveWriter {
            inner: ContainerWriter::new(inner, options.compression, options.block_size)?,
            items: 0,
        })
    }

    /// Append one encoded item
    pub fn write_item(&mut self, item: &Item) -> Result<()> {
        item.write(&mut self.inner)?;
        self.items += 1;
        Ok(())
    }

    /// Number of items written so far
    pub fn items(&self) -> usize {
        self.items
    }

    /// Flush the last chunk and return the inner writer
    #[instrument(skip(self), err, fields(items = self.items))]
    pub fn finish(self) -> Result<W> {
        debug!(stream = self.inner.total_in(), "finishing archive");
        Ok(self.inner.finalize()?)
    }
}

impl PlainArchive {
    /// Encode every item into an uncompressed item stream
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.iter().map(Item::encoded_len).sum());
        for item in self {
            item.write(&mut out)?;
        }
        Ok(out)
    }

    /// Write the archive to `writer` using the requested compression
    pub fn write<W: Write>(&self, writer: W, options: ArchiveWriterOptions) -> Result<W> {
        let mut archive = ArchiveWriter::new(writer, options)?;
        for item in self {
            archive.write_item(item)?;
        }
        archive.finish()
    }

    /// Write the archive to a new file at `path`
    ///
    /// An existing file is only replaced when [`ArchiveWriterOptions::overwrite`] is set. The
    /// file is removed again when encoding fails part way.
    #[instrument(skip(self, path), err, fields(path = %path.as_ref().display()))]
    pub fn write_path(&self, path: impl AsRef<Path>, options: ArchiveWriterOptions) -> Result<()> {
        let path = path.as_ref();
        let file = if options.overwrite {
            File::create(path)?
        } else {
            File::create_new(path)?
        };

        info!(
            items = self.len(),
            compression = %options.compression,
            "writing archive"
        );

        let result = self
            .write(BufWriter::new(file), options)
            .and_then(|mut file| Ok(file.flush()?));
        if result.is_err() {
            if let Err(e) = fs::remove_file(path) {
                warn!(error = %e, "could not remove incomplete archive");
            }
        }
        result
    }
}
