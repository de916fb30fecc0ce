//! Fixed-layout records of the item stream and the compressed container.

use binrw::{BinRead, BinWrite};

/// Size of an encoded [`ItemPreamble`]
pub const PREAMBLE_SIZE: usize = 6;

/// Size of an encoded [`ContainerHeader`]
pub const CONTAINER_HEADER_SIZE: usize = 12;

/// Size of an encoded [`ChunkHeader`]
pub const CHUNK_HEADER_SIZE: usize = 16;

/// Magic opening every item header
///
/// `AA01` is what current tools write, `YAA1` is the older spelling still found in the wild.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[brw(repr = u32)]
pub enum ItemMagic {
    /// `AA01`
    #[default]
    Aa01 = 0x3130_4141,

    /// `YAA1`
    Yaa1 = 0x3141_4159,
}

impl ItemMagic {
    /// Whether `bytes` starts with one of the known item magics
    pub fn matches(bytes: &[u8]) -> bool {
        bytes.starts_with(b"AA01") || bytes.starts_with(b"YAA1")
    }
}

/// Start of an encoded item
///
/// All data is stored in little endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, Default, PartialEq, Eq)]
#[brw(little)]
pub struct ItemPreamble {
    /// Magic number of the item
    pub magic: ItemMagic,

    /// Size of the whole header in bytes, this preamble included
    pub header_size: u16,
}

/// Codec identifier found after the `pbz` magic of a compressed container
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(repr = u8)]
pub enum ContainerCodec {
    /// `e`
    Lzfse = 0x65,

    /// `z`, raw DEFLATE
    Zlib = 0x7A,

    /// `b`
    Lzbitmap = 0x62,
}

impl TryFrom<u8> for ContainerCodec {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x65 => Ok(ContainerCodec::Lzfse),
            0x7A => Ok(ContainerCodec::Zlib),
            0x62 => Ok(ContainerCodec::Lzbitmap),
            other => Err(other),
        }
    }
}

/// Compressed container header
///
/// Starts with "pbz" followed by the codec tag. All sizes are stored in big endian format
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(magic = b"pbz", big)]
pub struct ContainerHeader {
    /// Codec used for every compressed chunk
    pub codec: ContainerCodec,

    /// Maximum number of uncompressed bytes held by a chunk
    pub block_size: u64,
}

/// Header of one chunk of a compressed container
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct ChunkHeader {
    /// Size of the chunk once decompressed
    pub uncompressed: u64,

    /// Size of the chunk in the container, equal to `uncompressed` when stored as is
    pub stored: u64,
}

impl ChunkHeader {
    /// Whether the chunk bytes are stored without compression
    pub fn is_stored(&self) -> bool {
        self.stored == self.uncompressed
    }
}
