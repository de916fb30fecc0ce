//! Typed metadata fields attached to every archive item.
//!
//! A [`Header`] is an ordered set of fields, each identified by a three character [`FieldKey`].
//! Setting a key that is already present replaces its value in place, so a header never holds
//! the same key twice and the position of a key is the position of its first insertion.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexMap;
use std::fmt;
use std::io::{self, Write};

use binrw::BinWrite;

use crate::error::{Error, Result};
use crate::types::{ItemMagic, ItemPreamble, PREAMBLE_SIZE};

/// Three character identifier of a header field
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey([u8; 3]);

impl FieldKey {
    /// Path of the entry relative to the archive root
    pub const PAT: FieldKey = FieldKey(*b"PAT");
    /// Entry type, see [`crate::item::EntryType`]
    pub const TYP: FieldKey = FieldKey(*b"TYP");
    /// Owning user id
    pub const UID: FieldKey = FieldKey(*b"UID");
    /// Owning group id
    pub const GID: FieldKey = FieldKey(*b"GID");
    /// Permission bits
    pub const MOD: FieldKey = FieldKey(*b"MOD");
    /// BSD file flags
    pub const FLG: FieldKey = FieldKey(*b"FLG");
    /// File contents
    pub const DAT: FieldKey = FieldKey(*b"DAT");
    /// Symlink target
    pub const LNK: FieldKey = FieldKey(*b"LNK");
    /// Modification time
    pub const MTM: FieldKey = FieldKey(*b"MTM");
    /// Creation time
    pub const CTM: FieldKey = FieldKey(*b"CTM");
    /// Uncompressed file size
    pub const SIZ: FieldKey = FieldKey(*b"SIZ");
    /// Extended attributes blob
    pub const XAT: FieldKey = FieldKey(*b"XAT");

    /// Create a key from its three bytes
    pub const fn new(key: [u8; 3]) -> Self {
        FieldKey(key)
    }

    /// Raw bytes of the key
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

impl From<[u8; 3]> for FieldKey {
    fn from(value: [u8; 3]) -> Self {
        FieldKey(value)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldKey({})", self)
    }
}

/// Width of an unsigned integer field
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UintWidth {
    /// 1 byte, subtype `1`
    U8,
    /// 2 bytes, subtype `2`
    U16,
    /// 4 bytes, subtype `4`
    U32,
    /// 8 bytes, subtype `8`
    U64,
}

impl UintWidth {
    /// Smallest width able to hold `value`
    pub fn for_value(value: u64) -> Self {
        if value <= u8::MAX as u64 {
            UintWidth::U8
        } else if value <= u16::MAX as u64 {
            UintWidth::U16
        } else if value <= u32::MAX as u64 {
            UintWidth::U32
        } else {
            UintWidth::U64
        }
    }

    /// Width from a byte count, `None` for anything but 1, 2, 4 and 8
    pub fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(UintWidth::U8),
            2 => Some(UintWidth::U16),
            4 => Some(UintWidth::U32),
            8 => Some(UintWidth::U64),
            _ => None,
        }
    }

    /// Number of bytes used by the value
    pub fn bytes(&self) -> u8 {
        match self {
            UintWidth::U8 => 1,
            UintWidth::U16 => 2,
            UintWidth::U32 => 4,
            UintWidth::U64 => 8,
        }
    }

    /// Largest value representable in this width
    pub fn max(&self) -> u64 {
        match self {
            UintWidth::U8 => u8::MAX as u64,
            UintWidth::U16 => u16::MAX as u64,
            UintWidth::U32 => u32::MAX as u64,
            UintWidth::U64 => u64::MAX,
        }
    }

    fn subtype(&self) -> u8 {
        b'0' + self.bytes()
    }
}

/// Width of a blob size field
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlobWidth {
    /// 2 bytes, subtype `A`
    U16,
    /// 4 bytes, subtype `B`
    U32,
    /// 8 bytes, subtype `C`
    U64,
}

impl BlobWidth {
    /// Width used to announce a payload of `len` bytes
    ///
    /// The all-ones value of a width is never used, so 65535 bytes already need 4 bytes and
    /// 4294967295 bytes need 8.
    pub fn for_len(len: u64) -> Self {
        if len < u16::MAX as u64 {
            BlobWidth::U16
        } else if len < u32::MAX as u64 {
            BlobWidth::U32
        } else {
            BlobWidth::U64
        }
    }

    /// Number of bytes used by the size
    pub fn bytes(&self) -> u8 {
        match self {
            BlobWidth::U16 => 2,
            BlobWidth::U32 => 4,
            BlobWidth::U64 => 8,
        }
    }

    fn max(&self) -> u64 {
        match self {
            BlobWidth::U16 => u16::MAX as u64,
            BlobWidth::U32 => u32::MAX as u64,
            BlobWidth::U64 => u64::MAX,
        }
    }

    fn subtype(&self) -> u8 {
        match self {
            BlobWidth::U16 => b'A',
            BlobWidth::U32 => b'B',
            BlobWidth::U64 => b'C',
        }
    }
}

/// Algorithm of a digest field
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DigestKind {
    /// subtype `F`
    Crc32,
    /// subtype `G`
    Sha1,
    /// subtype `H`
    Sha256,
    /// subtype `I`
    Sha384,
    /// subtype `J`
    Sha512,
}

impl DigestKind {
    /// Length of the digest in bytes
    pub fn size(&self) -> usize {
        match self {
            DigestKind::Crc32 => 4,
            DigestKind::Sha1 => 20,
            DigestKind::Sha256 => 32,
            DigestKind::Sha384 => 48,
            DigestKind::Sha512 => 64,
        }
    }

    fn subtype(&self) -> u8 {
        match self {
            DigestKind::Crc32 => b'F',
            DigestKind::Sha1 => b'G',
            DigestKind::Sha256 => b'H',
            DigestKind::Sha384 => b'I',
            DigestKind::Sha512 => b'J',
        }
    }
}

/// Typed value of a header field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Presence only
    Flag,
    /// Little endian unsigned integer
    Uint(UintWidth, u64),
    /// Byte string, at most 65535 bytes
    String(Vec<u8>),
    /// Size of a payload stored after the header
    Blob(BlobWidth, u64),
    /// Seconds since the epoch
    Timestamp(i64),
    /// Seconds and nanoseconds since the epoch
    TimestampNanos(i64, u32),
    /// Fixed length digest
    Digest(DigestKind, Vec<u8>),
}

impl FieldValue {
    fn subtype(&self) -> u8 {
        match self {
            FieldValue::Flag => b'*',
            FieldValue::Uint(width, _) => width.subtype(),
            FieldValue::String(_) => b'P',
            FieldValue::Blob(width, _) => width.subtype(),
            FieldValue::Timestamp(_) => b'S',
            FieldValue::TimestampNanos(_, _) => b'T',
            FieldValue::Digest(kind, _) => kind.subtype(),
        }
    }

    /// Encoded size of the value, without the key and subtype
    fn encoded_len(&self) -> usize {
        match self {
            FieldValue::Flag => 0,
            FieldValue::Uint(width, _) => width.bytes() as usize,
            FieldValue::String(value) => 2 + value.len(),
            FieldValue::Blob(width, _) => width.bytes() as usize,
            FieldValue::Timestamp(_) => 8,
            FieldValue::TimestampNanos(_, _) => 12,
            FieldValue::Digest(kind, _) => kind.size(),
        }
    }

    fn write<W: Write>(&self, key: FieldKey, writer: &mut W) -> Result<()> {
        writer.write_all(key.as_bytes())?;
        writer.write_u8(self.subtype())?;

        match self {
            FieldValue::Flag => {}
            FieldValue::Uint(width, value) => {
                if *value > width.max() {
                    return Err(Error::ValueOutOfRange {
                        key,
                        width: width.bytes(),
                        value: *value,
                    });
                }
                writer.write_uint::<LittleEndian>(*value, width.bytes() as usize)?;
            }
            FieldValue::String(value) => {
                let len = u16::try_from(value.len()).map_err(|_| Error::StringTooLong(key))?;
                writer.write_u16::<LittleEndian>(len)?;
                writer.write_all(value)?;
            }
            FieldValue::Blob(width, size) => {
                if *size > width.max() {
                    return Err(Error::ValueOutOfRange {
                        key,
                        width: width.bytes(),
                        value: *size,
                    });
                }
                writer.write_uint::<LittleEndian>(*size, width.bytes() as usize)?;
            }
            FieldValue::Timestamp(seconds) => writer.write_i64::<LittleEndian>(*seconds)?,
            FieldValue::TimestampNanos(seconds, nanoseconds) => {
                writer.write_i64::<LittleEndian>(*seconds)?;
                writer.write_u32::<LittleEndian>(*nanoseconds)?;
            }
            FieldValue::Digest(kind, digest) => {
                if digest.len() != kind.size() {
                    return Err(Error::CustomError(format!(
                        "digest {} holds {} bytes instead of {}",
                        key,
                        digest.len(),
                        kind.size()
                    )));
                }
                writer.write_all(digest)?;
            }
        }

        Ok(())
    }

    fn read(key: FieldKey, subtype: u8, reader: &mut &[u8]) -> io::Result<Option<Self>> {
        let value = match subtype {
            b'*' => FieldValue::Flag,
            b'1' => FieldValue::Uint(UintWidth::U8, reader.read_u8()? as u64),
            b'2' => FieldValue::Uint(UintWidth::U16, reader.read_u16::<LittleEndian>()? as u64),
            b'4' => FieldValue::Uint(UintWidth::U32, reader.read_u32::<LittleEndian>()? as u64),
            b'8' => FieldValue::Uint(UintWidth::U64, reader.read_u64::<LittleEndian>()?),
            b'P' => {
                let len = reader.read_u16::<LittleEndian>()? as usize;
                FieldValue::String(take(reader, len)?.to_vec())
            }
            b'A' => FieldValue::Blob(BlobWidth::U16, reader.read_u16::<LittleEndian>()? as u64),
            b'B' => FieldValue::Blob(BlobWidth::U32, reader.read_u32::<LittleEndian>()? as u64),
            b'C' => FieldValue::Blob(BlobWidth::U64, reader.read_u64::<LittleEndian>()?),
            b'S' => FieldValue::Timestamp(reader.read_i64::<LittleEndian>()?),
            b'T' => {
                let seconds = reader.read_i64::<LittleEndian>()?;
                FieldValue::TimestampNanos(seconds, reader.read_u32::<LittleEndian>()?)
            }
            b'F' | b'G' | b'H' | b'I' | b'J' => {
                let kind = match subtype {
                    b'F' => DigestKind::Crc32,
                    b'G' => DigestKind::Sha1,
                    b'H' => DigestKind::Sha256,
                    b'I' => DigestKind::Sha384,
                    _ => DigestKind::Sha512,
                };
                FieldValue::Digest(kind, take(reader, kind.size())?.to_vec())
            }
            _ => {
                tracing::debug!(%key, subtype, "unknown field subtype");
                return Ok(None);
            }
        };

        Ok(Some(value))
    }
}

fn take<'a>(reader: &mut &'a [u8], len: usize) -> io::Result<&'a [u8]> {
    if reader.len() < len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    let (head, tail) = reader.split_at(len);
    *reader = tail;
    Ok(head)
}

/// Ordered set of typed fields describing one item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: IndexMap<FieldKey, FieldValue>,
}

impl Header {
    /// Create an empty header
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the header holds no field
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over the fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Set a field, replacing the value of an existing key in place
    pub fn set(&mut self, key: FieldKey, value: FieldValue) {
        self.fields.insert(key, value);
    }

    /// Set a flag field
    pub fn set_flag(&mut self, key: FieldKey) {
        self.set(key, FieldValue::Flag);
    }

    /// Set an unsigned integer field of the given width
    pub fn set_uint(&mut self, key: FieldKey, width: UintWidth, value: u64) -> Result<()> {
        if value > width.max() {
            return Err(Error::ValueOutOfRange {
                key,
                width: width.bytes(),
                value,
            });
        }
        self.set(key, FieldValue::Uint(width, value));
        Ok(())
    }

    /// Set a string field, copying `value`
    pub fn set_string(&mut self, key: FieldKey, value: impl AsRef<[u8]>) -> Result<()> {
        let value = value.as_ref();
        if value.len() > u16::MAX as usize {
            return Err(Error::StringTooLong(key));
        }
        self.set(key, FieldValue::String(value.to_vec()));
        Ok(())
    }

    /// Announce a payload of `len` bytes, returning the width picked for it
    pub fn set_blob(&mut self, key: FieldKey, len: u64) -> BlobWidth {
        let width = BlobWidth::for_len(len);
        self.set(key, FieldValue::Blob(width, len));
        width
    }

    /// Set a timestamp field, with nanoseconds when given
    pub fn set_timestamp(&mut self, key: FieldKey, seconds: i64, nanoseconds: Option<u32>) {
        let value = match nanoseconds {
            Some(nanoseconds) => FieldValue::TimestampNanos(seconds, nanoseconds),
            None => FieldValue::Timestamp(seconds),
        };
        self.set(key, value);
    }

    /// Set a digest field
    pub fn set_digest(&mut self, key: FieldKey, kind: DigestKind, digest: &[u8]) -> Result<()> {
        if digest.len() != kind.size() {
            return Err(Error::CustomError(format!(
                "digest {} holds {} bytes instead of {}",
                key,
                digest.len(),
                kind.size()
            )));
        }
        self.set(key, FieldValue::Digest(kind, digest.to_vec()));
        Ok(())
    }

    /// Remove a field, keeping the order of the others
    pub fn remove(&mut self, key: FieldKey) -> Option<FieldValue> {
        self.fields.shift_remove(&key)
    }

    /// Position of the field with the given key
    pub fn index_of(&self, key: FieldKey) -> Option<usize> {
        self.fields.get_index_of(&key)
    }

    /// Owned copy of the string field at `index`
    ///
    /// Returns `None` when the index is out of range or the field is not a string. Invalid
    /// UTF-8 is replaced, see [`Header::string_bytes`] for the raw value.
    pub fn string_at(&self, index: usize) -> Option<String> {
        match self.fields.get_index(index) {
            Some((_, FieldValue::String(value))) => Some(String::from_utf8_lossy(value).into_owned()),
            _ => None,
        }
    }

    /// Value of the field with the given key
    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        self.fields.get(&key)
    }

    /// Whether the header holds the given key
    pub fn contains(&self, key: FieldKey) -> bool {
        self.fields.contains_key(&key)
    }

    /// Value of an unsigned integer field
    pub fn uint(&self, key: FieldKey) -> Option<u64> {
        match self.get(key) {
            Some(FieldValue::Uint(_, value)) => Some(*value),
            _ => None,
        }
    }

    /// Raw bytes of a string field
    pub fn string_bytes(&self, key: FieldKey) -> Option<&[u8]> {
        match self.get(key) {
            Some(FieldValue::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Owned copy of a string field
    pub fn string(&self, key: FieldKey) -> Option<String> {
        self.index_of(key).and_then(|index| self.string_at(index))
    }

    /// Size announced by a blob field
    pub fn blob(&self, key: FieldKey) -> Option<u64> {
        match self.get(key) {
            Some(FieldValue::Blob(_, size)) => Some(*size),
            _ => None,
        }
    }

    /// Blob fields in the order their payloads follow the header
    pub fn blobs(&self) -> impl Iterator<Item = (FieldKey, u64)> + '_ {
        self.fields.iter().filter_map(|(k, v)| match v {
            FieldValue::Blob(_, size) => Some((*k, *size)),
            _ => None,
        })
    }

    /// Total size of the payloads following the header
    pub fn blob_total(&self) -> u64 {
        self.blobs()
            .fold(0u64, |total, (_, size)| total.saturating_add(size))
    }

    /// Size of the encoded header, preamble included
    pub fn encoded_len(&self) -> usize {
        PREAMBLE_SIZE
            + self
                .fields
                .values()
                .map(|v| 4 + v.encoded_len())
                .sum::<usize>()
    }

    /// Encode the header, preamble included
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let size = self.encoded_len();
        let header_size = u16::try_from(size).map_err(|_| Error::HeaderTooLarge(size))?;

        let mut buffer = Vec::with_capacity(size);
        ItemPreamble {
            magic: ItemMagic::Aa01,
            header_size,
        }
        .write(&mut io::Cursor::new(&mut buffer))?;

        for (key, value) in &self.fields {
            value.write(*key, &mut buffer)?;
        }

        writer.write_all(&buffer)?;
        Ok(())
    }

    /// Decode the fields following an item preamble
    ///
    /// `data` holds exactly the bytes between the preamble and the end of the header.
    pub fn parse(mut data: &[u8]) -> Result<Header> {
        let mut header = Header::new();

        while !data.is_empty() {
            let mut tag = [0u8; 4];
            io::Read::read_exact(&mut data, &mut tag)
                .map_err(|_| Error::TruncatedArchive("a field key"))?;
            let key = FieldKey([tag[0], tag[1], tag[2]]);

            match FieldValue::read(key, tag[3], &mut data) {
                Ok(Some(value)) => header.set(key, value),
                Ok(None) => {
                    return Err(Error::UnknownSubtype {
                        key,
                        subtype: tag[3] as char,
                    })
                }
                Err(_) => return Err(Error::TruncatedArchive("a field value")),
            }
        }

        Ok(header)
    }
}
