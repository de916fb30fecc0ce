//! Types for reading archives
//!

use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, instrument};

use crate::archive::PlainArchive;
use crate::compression::{self, CompressionMethod};
use crate::error::{Error, Result};
use crate::item::Item;
use crate::types::ItemMagic;

impl PlainArchive {
    /// Decode an uncompressed item stream
    ///
    /// Any malformed or truncated item fails the whole decode.
    pub fn decode(data: &[u8]) -> Result<PlainArchive> {
        let mut input = data;
        let mut archive = PlainArchive::new();
        while !input.is_empty() {
            archive.push(Item::read(&mut input)?)?;
        }
        Ok(archive)
    }
}

/// Archive of any supported compression, detected while reading
///
/// ```no_run
/// fn list_contents(path: &str) -> neoaa_archive::error::Result<()> {
///     let archive = neoaa_archive::GenericArchive::from_path(path)?;
///
///     println!("Compression: {}", archive.compression());
///     for path in archive.raw().paths() {
///         println!("{path}");
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericArchive {
    compression: CompressionMethod,
    raw: PlainArchive,
}

impl GenericArchive {
    /// Read a whole archive from `reader`
    pub fn new(mut reader: impl Read) -> Result<GenericArchive> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    /// Read the archive stored in the file at `path`
    #[instrument(skip(path), err, fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<GenericArchive> {
        Self::from_bytes(&fs::read(path.as_ref())?)
    }

    /// Decode an archive held in memory
    pub fn from_bytes(data: &[u8]) -> Result<GenericArchive> {
        let (compression, raw) = if data.is_empty() {
            (CompressionMethod::None, PlainArchive::new())
        } else if compression::is_compressed(data) {
            let (compression, stream) = compression::decompress(data)?;
            (compression, PlainArchive::decode(&stream)?)
        } else if ItemMagic::matches(data) {
            (CompressionMethod::None, PlainArchive::decode(data)?)
        } else {
            return Err(Error::InvalidArchive);
        };

        debug!(%compression, items = raw.len(), "decoded archive");
        Ok(GenericArchive { compression, raw })
    }

    /// Compression found while reading
    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    /// Decoded items
    pub fn raw(&self) -> &PlainArchive {
        &self.raw
    }

    /// Give up the wrapper, keeping the decoded items
    pub fn into_plain(self) -> PlainArchive {
        self.raw
    }
}

impl From<GenericArchive> for PlainArchive {
    fn from(value: GenericArchive) -> Self {
        value.raw
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::archive::PlainArchive;
    use crate::compression::CompressionMethod;
    use crate::error::{Error, Result};
    use crate::item::{EntryMetadata, Item};
    use crate::read::GenericArchive;
    use crate::write::ArchiveWriterOptions;

    fn sample() -> Result<PlainArchive> {
        let meta = EntryMetadata::default();
        let mut archive = PlainArchive::new();
        archive.push(Item::directory("docs", &meta)?)?;
        archive.push(Item::file("docs/a.txt", b"hi".to_vec(), &meta)?)?;
        Ok(archive)
    }

    #[test]
    fn read_invalid_magic() {
        let input = b"ZIP!\x06\x00";
        assert!(matches!(
            GenericArchive::from_bytes(input),
            Err(Error::InvalidArchive)
        ));
    }

    #[test]
    fn read_empty() -> Result<()> {
        let archive = GenericArchive::new(Cursor::new(Vec::new()))?;

        assert_eq!(archive.compression(), CompressionMethod::None);
        assert!(archive.raw().is_empty());

        Ok(())
    }

    #[test]
    fn read_unknown_codec() {
        let input = b"pbzx\x00\x00\x00\x00\x00\x10\x00\x00";
        assert!(matches!(
            GenericArchive::from_bytes(input),
            Err(Error::UnsupportedCompression(b'x'))
        ));
    }

    #[test]
    fn read_truncated_item() -> Result<()> {
        let mut data = sample()?.to_bytes()?;
        data.truncate(data.len() - 1);

        assert!(matches!(
            GenericArchive::from_bytes(&data),
            Err(Error::TruncatedArchive(_))
        ));

        Ok(())
    }

    #[test]
    fn read_garbage_after_items() -> Result<()> {
        let mut data = sample()?.to_bytes()?;
        data.extend(b"junk");

        assert!(GenericArchive::from_bytes(&data).is_err());

        Ok(())
    }

    #[traced_test]
    #[test]
    fn read_every_compression() -> Result<()> {
        let expected = sample()?;
        for compression in [
            CompressionMethod::None,
            CompressionMethod::Lzfse,
            CompressionMethod::Zlib,
            CompressionMethod::Lzbitmap,
        ] {
            let data = expected.write(
                Vec::new(),
                ArchiveWriterOptions::builder()
                    .compression(compression)
                    .build(),
            )?;

            let archive = GenericArchive::from_bytes(&data)?;
            assert_eq!(archive.compression(), compression);
            assert_eq!(archive.into_plain(), expected);
        }

        Ok(())
    }
}
