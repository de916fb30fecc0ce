//! Whole-container compression and decompression handling.

use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::str::FromStr;

use binrw::{io::NoSeek, BinRead, BinWrite};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use lzfse_rust::LzfseRingDecoder;
use tracing::{instrument, trace, warn};

use crate::error::{Error, Result};
use crate::types::{
    ChunkHeader, ContainerCodec, ContainerHeader, CHUNK_HEADER_SIZE, CONTAINER_HEADER_SIZE,
};

/// Uncompressed size of a chunk unless configured otherwise
pub const DEFAULT_BLOCK_SIZE: u64 = 0x10_0000;

/// Identifies how the item stream of an archive is stored
///
/// When creating archives, you may choose the method via
/// [`crate::write::ArchiveWriterOptions`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Stores the item stream as it is
    None,

    /// Compress the stream using LZFSE
    #[default]
    Lzfse,

    /// Compress the stream using raw DEFLATE
    Zlib,

    /// Tag the stream as LZBITMAP
    ///
    /// No LZBITMAP encoder is available, so every chunk is stored uncompressed. Reading only
    /// succeeds for containers whose chunks are stored.
    Lzbitmap,
}

impl CompressionMethod {
    /// Parse a method name, falling back to the default ([`CompressionMethod::Lzfse`]) for
    /// anything unknown
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            let fallback = CompressionMethod::default();
            warn!(name, %fallback, "unknown compression method, using default");
            fallback
        })
    }

    /// Name accepted by [`CompressionMethod::from_name`]
    pub fn name(&self) -> &'static str {
        match self {
            CompressionMethod::None => "raw",
            CompressionMethod::Lzfse => "lzfse",
            CompressionMethod::Zlib => "zlib",
            CompressionMethod::Lzbitmap => "lzbitmap",
        }
    }

    pub(crate) fn codec(&self) -> Option<ContainerCodec> {
        match self {
            CompressionMethod::None => None,
            CompressionMethod::Lzfse => Some(ContainerCodec::Lzfse),
            CompressionMethod::Zlib => Some(ContainerCodec::Zlib),
            CompressionMethod::Lzbitmap => Some(ContainerCodec::Lzbitmap),
        }
    }
}

impl From<ContainerCodec> for CompressionMethod {
    fn from(value: ContainerCodec) -> Self {
        match value {
            ContainerCodec::Lzfse => CompressionMethod::Lzfse,
            ContainerCodec::Zlib => CompressionMethod::Zlib,
            ContainerCodec::Lzbitmap => CompressionMethod::Lzbitmap,
        }
    }
}

impl FromStr for CompressionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "none" => Ok(CompressionMethod::None),
            "lzfse" => Ok(CompressionMethod::Lzfse),
            "zlib" => Ok(CompressionMethod::Zlib),
            "lzbitmap" => Ok(CompressionMethod::Lzbitmap),
            _ => Err(Error::CustomError(format!("unknown compression method {s}"))),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compress one chunk, `None` when the codec has no encoder
fn compress_chunk(codec: ContainerCodec, chunk: &[u8]) -> io::Result<Option<Vec<u8>>> {
    match codec {
        ContainerCodec::Lzfse => {
            let mut out = Vec::new();
            lzfse_rust::encode_bytes(chunk, &mut out)?;
            Ok(Some(out))
        }
        ContainerCodec::Zlib => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(chunk)?;
            Ok(Some(encoder.finish()?))
        }
        ContainerCodec::Lzbitmap => Ok(None),
    }
}

fn decompress_chunk(codec: ContainerCodec, chunk: &[u8], expected: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match codec {
        ContainerCodec::Lzfse => {
            let mut decoder = LzfseRingDecoder::default();
            decoder
                .reader_bytes(chunk)
                .take(expected.saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|e| Error::Decompression(format!("lzfse: {e}")))?;
        }
        ContainerCodec::Zlib => {
            DeflateDecoder::new(chunk)
                .take(expected.saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|e| Error::Decompression(format!("zlib: {e}")))?;
        }
        ContainerCodec::Lzbitmap => return Err(Error::UnsupportedCompression(b'b')),
    }

    if out.len() as u64 != expected {
        return Err(Error::Decompression(format!(
            "chunk expanded to {} bytes instead of {}",
            out.len(),
            expected
        )));
    }
    Ok(out)
}

pub(crate) struct ChunkedWriter<W: Write> {
    inner: W,
    codec: ContainerCodec,
    block: Vec<u8>,
    block_size: usize,
    total_in: u64,
}

impl<W: Write> ChunkedWriter<W> {
    fn flush_block(&mut self) -> io::Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }

        let compressed = compress_chunk(self.codec, &self.block)?
            .filter(|compressed| compressed.len() < self.block.len());
        let stored = compressed.as_deref().unwrap_or(&self.block);

        trace!(
            uncompressed = self.block.len(),
            stored = stored.len(),
            "writing chunk"
        );

        ChunkHeader {
            uncompressed: self.block.len() as u64,
            stored: stored.len() as u64,
        }
        .write(&mut NoSeek::new(&mut self.inner))
        .map_err(io::Error::other)?;
        self.inner.write_all(stored)?;

        self.block.clear();
        Ok(())
    }
}

/// Writer placing the item stream in the container, compressing it if requested
pub(crate) enum ContainerWriter<W: Write> {
    Raw(W, u64),
    Chunked(Box<ChunkedWriter<W>>),
}

impl<W: Write> ContainerWriter<W> {
    #[instrument(skip(writer), err)]
    pub fn new(mut writer: W, compression: CompressionMethod, block_size: u64) -> Result<Self> {
        let Some(codec) = compression.codec() else {
            return Ok(ContainerWriter::Raw(writer, 0));
        };

        let block_size = usize::try_from(block_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| Error::CustomError(format!("invalid block size {block_size}")))?;

        ContainerHeader {
            codec,
            block_size: block_size as u64,
        }
        .write(&mut NoSeek::new(&mut writer))?;

        Ok(ContainerWriter::Chunked(Box::new(ChunkedWriter {
            inner: writer,
            codec,
            block: Vec::new(),
            block_size,
            total_in: 0,
        })))
    }

    /// Write the last chunk and return the inner writer
    #[instrument(skip(self), err)]
    pub fn finalize(self) -> io::Result<W> {
        match self {
            ContainerWriter::Raw(mut w, _) => {
                w.flush()?;
                Ok(w)
            }
            ContainerWriter::Chunked(mut c) => {
                c.flush_block()?;
                c.inner.flush()?;
                Ok(c.inner)
            }
        }
    }

    /// Number of item stream bytes written so far
    pub fn total_in(&self) -> u64 {
        match self {
            ContainerWriter::Raw(_, c) => *c,
            ContainerWriter::Chunked(c) => c.total_in,
        }
    }
}

impl<W: Write> Write for ContainerWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ContainerWriter::Raw(w, c) => {
                let written = w.write(buf)?;
                *c += written as u64;
                Ok(written)
            }
            ContainerWriter::Chunked(c) => {
                let room = c.block_size - c.block.len();
                let take = room.min(buf.len());
                c.block.extend_from_slice(&buf[..take]);
                c.total_in += take as u64;
                if c.block.len() == c.block_size {
                    c.flush_block()?;
                }
                Ok(take)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ContainerWriter::Raw(w, _) => w.flush(),
            ContainerWriter::Chunked(c) => c.inner.flush(),
        }
    }
}

/// Whether `data` starts like a compressed container
pub fn is_compressed(data: &[u8]) -> bool {
    data.starts_with(b"pbz")
}

/// Unpack a compressed container into the item stream it wraps
///
/// Fails without partial output on an unknown codec tag, a truncated chunk, a compressed
/// LZBITMAP chunk or a chunk expanding to the wrong size.
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn decompress(data: &[u8]) -> Result<(CompressionMethod, Vec<u8>)> {
    let tag = match data {
        [b'p', b'b', b'z', tag, ..] => *tag,
        _ => return Err(Error::InvalidArchive),
    };
    ContainerCodec::try_from(tag).map_err(Error::UnsupportedCompression)?;

    if data.len() < CONTAINER_HEADER_SIZE {
        return Err(Error::TruncatedArchive("the container header"));
    }
    let header = ContainerHeader::read(&mut Cursor::new(&data[..CONTAINER_HEADER_SIZE]))?;

    let mut input = &data[CONTAINER_HEADER_SIZE..];
    let mut output = Vec::new();
    while !input.is_empty() {
        if input.len() < CHUNK_HEADER_SIZE {
            return Err(Error::TruncatedArchive("a chunk header"));
        }
        let chunk = ChunkHeader::read(&mut Cursor::new(&input[..CHUNK_HEADER_SIZE]))?;
        input = &input[CHUNK_HEADER_SIZE..];

        if chunk.uncompressed > header.block_size {
            return Err(Error::Decompression(format!(
                "chunk of {} bytes exceeds the block size of {}",
                chunk.uncompressed, header.block_size
            )));
        }

        let stored = usize::try_from(chunk.stored)
            .ok()
            .filter(|stored| *stored <= input.len())
            .ok_or(Error::TruncatedArchive("a chunk"))?;
        let (bytes, rest) = input.split_at(stored);
        input = rest;

        if chunk.is_stored() {
            output.extend_from_slice(bytes);
        } else {
            output.extend(decompress_chunk(header.codec, bytes, chunk.uncompressed)?);
        }
    }

    Ok((header.codec.into(), output))
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::{write::DeflateEncoder, Compression};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::compression::{decompress, decompress_chunk, CompressionMethod, ContainerWriter};
    use crate::error::{Error, Result};
    use crate::types::ContainerCodec;

    fn sample() -> Vec<u8> {
        (0..1000u32).flat_map(|i| (i % 7).to_le_bytes()).collect()
    }

    fn pack(data: &[u8], compression: CompressionMethod, block_size: u64) -> Result<Vec<u8>> {
        let mut writer = ContainerWriter::new(Vec::new(), compression, block_size)?;
        writer.write_all(data)?;
        assert_eq!(writer.total_in(), data.len() as u64);
        Ok(writer.finalize()?)
    }

    #[test]
    fn names() {
        assert_eq!(CompressionMethod::from_name("raw"), CompressionMethod::None);
        assert_eq!(CompressionMethod::from_name("ZLIB"), CompressionMethod::Zlib);
        assert_eq!(CompressionMethod::from_name("lzfse"), CompressionMethod::Lzfse);
        assert_eq!(
            CompressionMethod::from_name("lzbitmap"),
            CompressionMethod::Lzbitmap
        );
        assert!("bzip2".parse::<CompressionMethod>().is_err());
    }

    #[traced_test]
    #[test]
    fn unknown_name_falls_back_to_lzfse() {
        assert_eq!(CompressionMethod::from_name("bzip2"), CompressionMethod::Lzfse);
        assert!(logs_contain("unknown compression method"));
    }

    #[test]
    fn raw_writer_passes_through() -> Result<()> {
        let data = sample();
        assert_eq!(pack(&data, CompressionMethod::None, 64)?, data);
        Ok(())
    }

    #[traced_test]
    #[test]
    fn chunked_round_trip() -> Result<()> {
        let data = sample();
        for method in [
            CompressionMethod::Lzfse,
            CompressionMethod::Zlib,
            CompressionMethod::Lzbitmap,
        ] {
            let packed = pack(&data, method, 512)?;
            assert!(packed.starts_with(b"pbz"));

            let (detected, unpacked) = decompress(&packed)?;
            assert_eq!(detected, method);
            assert_eq!(unpacked, data);
        }
        Ok(())
    }

    #[test]
    fn compressible_data_shrinks() -> Result<()> {
        let data = vec![b'a'; 4096];
        for method in [CompressionMethod::Lzfse, CompressionMethod::Zlib] {
            assert!(pack(&data, method, 4096)?.len() < data.len());
        }
        Ok(())
    }

    #[test]
    fn lzbitmap_chunks_are_stored() -> Result<()> {
        let data = vec![b'a'; 100];
        let packed = pack(&data, CompressionMethod::Lzbitmap, 4096)?;

        // header, one chunk header, stored bytes
        assert_eq!(packed.len(), 12 + 16 + 100);
        assert_eq!(&packed[..4], b"pbzb");
        assert_eq!(&packed[28..], &data[..]);
        Ok(())
    }

    #[test]
    fn empty_stream_has_no_chunks() -> Result<()> {
        let packed = pack(&[], CompressionMethod::Zlib, 64)?;
        assert_eq!(packed.len(), 12);

        let (_, unpacked) = decompress(&packed)?;
        assert!(unpacked.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_codec_tag() {
        let input = b"pbzq\x00\x00\x00\x00\x00\x10\x00\x00";
        assert!(matches!(
            decompress(input),
            Err(Error::UnsupportedCompression(b'q'))
        ));
    }

    #[test]
    fn truncated_chunk() -> Result<()> {
        let mut packed = pack(&sample(), CompressionMethod::Zlib, 512)?;
        packed.truncate(packed.len() - 3);

        assert!(matches!(
            decompress(&packed),
            Err(Error::TruncatedArchive(_))
        ));
        Ok(())
    }

    #[test]
    fn chunk_with_wrong_size() -> Result<()> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[b'z'; 64])?;
        let chunk = encoder.finish()?;

        let mut packed = b"pbzz\x00\x00\x00\x00\x00\x00\x01\x00".to_vec();
        packed.extend(70u64.to_be_bytes());
        packed.extend((chunk.len() as u64).to_be_bytes());
        packed.extend(&chunk);

        assert!(matches!(decompress(&packed), Err(Error::Decompression(_))));
        Ok(())
    }

    #[test]
    fn lzfse_chunk_expanding_past_its_size() -> Result<()> {
        let mut chunk = Vec::new();
        lzfse_rust::encode_bytes(&[b'a'; 4096], &mut chunk)?;

        let result = decompress_chunk(ContainerCodec::Lzfse, &chunk, 16);
        assert!(matches!(result, Err(Error::Decompression(_))));

        let mut packed = b"pbze\x00\x00\x00\x00\x00\x00\x01\x00".to_vec();
        packed.extend(16u64.to_be_bytes());
        packed.extend((chunk.len() as u64).to_be_bytes());
        packed.extend(&chunk);
        assert!(matches!(decompress(&packed), Err(Error::Decompression(_))));

        Ok(())
    }

    #[test]
    fn compressed_lzbitmap_chunk_is_unsupported() {
        let mut packed = b"pbzb\x00\x00\x00\x00\x00\x00\x01\x00".to_vec();
        packed.extend(64u64.to_be_bytes());
        packed.extend(4u64.to_be_bytes());
        packed.extend(b"ZBM\x09");

        assert!(matches!(
            decompress(&packed),
            Err(Error::UnsupportedCompression(b'b'))
        ));
    }

    #[test]
    fn not_a_container() {
        assert!(matches!(decompress(b"AA01"), Err(Error::InvalidArchive)));
    }
}
