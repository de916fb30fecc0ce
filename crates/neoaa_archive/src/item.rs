//! Archive entries: a header plus an optional payload

use std::fmt;
use std::fs::Metadata;
use std::io::{Cursor, Write};

use binrw::BinRead;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::header::{FieldKey, Header, UintWidth};
use crate::types::{ItemPreamble, PREAMBLE_SIZE};

/// Kind of filesystem object an item describes, stored in the `TYP` field
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryType {
    /// `F`, regular file
    File,
    /// `D`, directory
    Directory,
    /// `L`, symbolic link
    Symlink,
    /// Any other type tag, kept as found
    Other(u8),
}

impl EntryType {
    /// Tag stored in the `TYP` field
    pub fn tag(&self) -> u8 {
        match self {
            EntryType::File => b'F',
            EntryType::Directory => b'D',
            EntryType::Symlink => b'L',
            EntryType::Other(tag) => *tag,
        }
    }
}

impl From<u8> for EntryType {
    fn from(value: u8) -> Self {
        match value {
            b'F' => EntryType::File,
            b'D' => EntryType::Directory,
            b'L' => EntryType::Symlink,
            other => EntryType::Other(other),
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag() as char)
    }
}

/// Ownership and permission information recorded for an entry
///
/// Only available on platforms with unix style ownership, elsewhere every member is `None` and
/// the matching fields are left out of the header.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Owning user id, `UID`
    pub uid: Option<u32>,
    /// Owning group id, `GID`
    pub gid: Option<u32>,
    /// Permission bits, `MOD`
    pub mode: Option<u32>,
}

impl EntryMetadata {
    /// Ownership of a filesystem entry, as returned by [`std::fs::symlink_metadata`]
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        EntryMetadata {
            uid: Some(metadata.uid()),
            gid: Some(metadata.gid()),
            mode: Some(metadata.mode() & 0o7777),
        }
    }

    /// Ownership of a filesystem entry, as returned by [`std::fs::symlink_metadata`]
    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Self {
        EntryMetadata::default()
    }

    fn apply(&self, header: &mut Header) -> Result<()> {
        for (key, value) in [
            (FieldKey::UID, self.uid),
            (FieldKey::GID, self.gid),
            (FieldKey::MOD, self.mode),
        ] {
            if let Some(value) = value {
                let value = value as u64;
                header.set_uint(key, UintWidth::for_value(value), value)?;
            }
        }
        Ok(())
    }
}

/// One archive entry
///
/// The item owns its header and payload. Once pushed into a
/// [`PlainArchive`](crate::archive::PlainArchive) the archive is its only owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    header: Header,
    blob: Option<Vec<u8>>,
}

impl Item {
    /// Create an item without payload
    pub fn new(header: Header) -> Self {
        Item { header, blob: None }
    }

    /// Create an item carrying `blob` after its header
    ///
    /// The blob fields of the header must already announce exactly `blob.len()` bytes.
    pub fn with_blob(header: Header, blob: Vec<u8>) -> Result<Self> {
        let mut item = Item::new(header);
        item.attach_blob(blob)?;
        Ok(item)
    }

    /// Take ownership of `blob` as the payload of this item
    pub fn attach_blob(&mut self, blob: Vec<u8>) -> Result<()> {
        let expected = self.header.blob_total();
        if expected != blob.len() as u64 {
            return Err(Error::BlobSizeMismatch {
                expected,
                actual: blob.len() as u64,
            });
        }
        self.blob = Some(blob);
        Ok(())
    }

    /// Describe a regular file holding `data`
    pub fn file(path: impl AsRef<[u8]>, data: Vec<u8>, metadata: &EntryMetadata) -> Result<Self> {
        let mut header = Self::entry_header(EntryType::File, path.as_ref(), metadata)?;
        header.set_blob(FieldKey::DAT, data.len() as u64);
        Item::with_blob(header, data)
    }

    /// Describe a directory
    pub fn directory(path: impl AsRef<[u8]>, metadata: &EntryMetadata) -> Result<Self> {
        let header = Self::entry_header(EntryType::Directory, path.as_ref(), metadata)?;
        Ok(Item::new(header))
    }

    /// Describe a symbolic link pointing at `target`
    pub fn symlink(
        path: impl AsRef<[u8]>,
        target: impl AsRef<[u8]>,
        metadata: &EntryMetadata,
    ) -> Result<Self> {
        let mut header = Self::entry_header(EntryType::Symlink, path.as_ref(), metadata)?;
        header.set_string(FieldKey::LNK, target)?;
        Ok(Item::new(header))
    }

    fn entry_header(kind: EntryType, path: &[u8], metadata: &EntryMetadata) -> Result<Header> {
        let mut header = Header::new();
        header.set_uint(FieldKey::TYP, UintWidth::U8, kind.tag() as u64)?;
        header.set_string(FieldKey::PAT, path)?;
        metadata.apply(&mut header)?;
        Ok(header)
    }

    /// Header of the item
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Mutable header of the item
    ///
    /// Changing the blob fields invalidates the payload, call [`Item::attach_blob`] again
    /// before writing the item.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Path of the item relative to the archive root
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this path directly when extracting an archive.
    /// It may contain an absolute path (`/etc/shadow`), or break out of the
    /// current directory (`../runtime`). [`crate::tree::extract`] rejects both.
    pub fn path(&self) -> Option<String> {
        self.header.string(FieldKey::PAT)
    }

    /// Path of the item, in the raw byte representation
    pub fn path_bytes(&self) -> Option<&[u8]> {
        self.header.string_bytes(FieldKey::PAT)
    }

    /// Kind of the entry, `None` when the item has no `TYP` field or it does not fit a byte
    pub fn entry_type(&self) -> Option<EntryType> {
        self.header
            .uint(FieldKey::TYP)
            .and_then(|tag| u8::try_from(tag).ok())
            .map(EntryType::from)
    }

    /// Target of a symbolic link
    pub fn link_target(&self) -> Option<&[u8]> {
        self.header.string_bytes(FieldKey::LNK)
    }

    /// Every payload byte following the header
    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    /// Contents announced by the `DAT` field
    pub fn data(&self) -> Option<&[u8]> {
        let blob = self.blob.as_deref()?;

        let mut offset = 0usize;
        for (key, size) in self.header.blobs() {
            let size = usize::try_from(size).ok()?;
            if key == FieldKey::DAT {
                return blob.get(offset..offset.checked_add(size)?);
            }
            offset = offset.checked_add(size)?;
        }
        None
    }

    /// Size of the encoded item, payload included
    pub fn encoded_len(&self) -> usize {
        self.header.encoded_len() + self.blob.as_ref().map_or(0, |b| b.len())
    }

    /// Encode the header followed by the payload
    #[instrument(skip_all, err, fields(path = ?self.path()))]
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let expected = self.header.blob_total();
        let actual = self.blob.as_ref().map_or(0, |b| b.len()) as u64;
        if expected != actual {
            return Err(Error::BlobSizeMismatch { expected, actual });
        }

        self.header.write(writer)?;
        if let Some(blob) = &self.blob {
            writer.write_all(blob)?;
        }
        Ok(())
    }

    /// Decode one item from the front of `input`, advancing it past the item
    pub fn read(input: &mut &[u8]) -> Result<Item> {
        if input.len() < PREAMBLE_SIZE {
            return Err(Error::TruncatedArchive("an item preamble"));
        }

        let preamble = ItemPreamble::read(&mut Cursor::new(&input[..PREAMBLE_SIZE]))
            .map_err(|_| Error::InvalidArchive)?;

        let header_size = preamble.header_size as usize;
        if header_size < PREAMBLE_SIZE {
            return Err(Error::InvalidArchive);
        }
        if input.len() < header_size {
            return Err(Error::TruncatedArchive("an item header"));
        }

        let header = Header::parse(&input[PREAMBLE_SIZE..header_size])?;
        let rest = &input[header_size..];

        let blob = if header.blobs().next().is_some() {
            let len = usize::try_from(header.blob_total())
                .ok()
                .filter(|len| *len <= rest.len())
                .ok_or(Error::TruncatedArchive("an item payload"))?;
            Some(rest[..len].to_vec())
        } else {
            None
        };

        *input = &rest[blob.as_ref().map_or(0, |b| b.len())..];
        Ok(Item { header, blob })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::error::{Error, Result};
    use crate::header::{FieldKey, Header, UintWidth};
    use crate::item::{EntryMetadata, EntryType, Item};

    fn owned() -> EntryMetadata {
        EntryMetadata {
            uid: Some(501),
            gid: Some(20),
            mode: Some(0o644),
        }
    }

    #[test]
    fn file_item_fields() -> Result<()> {
        let item = Item::file("dir/a.txt", b"hi".to_vec(), &owned())?;
        let header = item.header();

        let keys = header.iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                FieldKey::TYP,
                FieldKey::PAT,
                FieldKey::UID,
                FieldKey::GID,
                FieldKey::MOD,
                FieldKey::DAT
            ]
        );
        assert_eq!(item.entry_type(), Some(EntryType::File));
        assert_eq!(item.path().as_deref(), Some("dir/a.txt"));
        assert_eq!(header.blob(FieldKey::DAT), Some(2));
        assert_eq!(item.data(), Some(&b"hi"[..]));

        Ok(())
    }

    #[test]
    fn symlink_item_has_target_and_no_payload() -> Result<()> {
        let item = Item::symlink("link", "a.txt", &EntryMetadata::default())?;

        assert_eq!(item.entry_type(), Some(EntryType::Symlink));
        assert_eq!(item.link_target(), Some(&b"a.txt"[..]));
        assert_eq!(item.blob(), None);
        assert!(!item.header().contains(FieldKey::UID));

        Ok(())
    }

    #[test]
    fn attach_mismatched_blob() {
        let mut header = Header::new();
        header.set_blob(FieldKey::DAT, 4);

        let result = Item::with_blob(header, vec![0; 3]);
        assert!(matches!(
            result,
            Err(Error::BlobSizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn write_rejects_changed_header() -> Result<()> {
        let mut item = Item::file("a", b"abc".to_vec(), &EntryMetadata::default())?;
        item.header_mut().set_blob(FieldKey::DAT, 5);

        let mut out = Vec::new();
        assert!(matches!(
            item.write(&mut out),
            Err(Error::BlobSizeMismatch { .. })
        ));

        Ok(())
    }

    #[test]
    fn data_skips_leading_blobs() -> Result<()> {
        let mut header = Header::new();
        header.set_blob(FieldKey::XAT, 2);
        header.set_blob(FieldKey::DAT, 3);
        let item = Item::with_blob(header, b"xxabc".to_vec())?;

        assert_eq!(item.data(), Some(&b"abc"[..]));
        assert_eq!(item.blob(), Some(&b"xxabc"[..]));

        Ok(())
    }

    #[test]
    fn read_two_items_from_stream() -> Result<()> {
        let first = Item::file("a.txt", b"hello".to_vec(), &owned())?;
        let second = Item::directory("sub", &EntryMetadata::default())?;

        let mut stream = Vec::new();
        first.write(&mut stream)?;
        second.write(&mut stream)?;
        assert_eq!(stream.len(), first.encoded_len() + second.encoded_len());

        let mut input = stream.as_slice();
        assert_eq!(Item::read(&mut input)?, first);
        assert_eq!(Item::read(&mut input)?, second);
        assert!(input.is_empty());

        Ok(())
    }

    #[test]
    fn read_truncated_payload() -> Result<()> {
        let item = Item::file("a.txt", b"hello".to_vec(), &EntryMetadata::default())?;

        let mut stream = Vec::new();
        item.write(&mut stream)?;
        stream.truncate(stream.len() - 1);

        assert!(matches!(
            Item::read(&mut stream.as_slice()),
            Err(Error::TruncatedArchive(_))
        ));

        Ok(())
    }

    #[test]
    fn read_bad_magic() {
        assert!(matches!(
            Item::read(&mut &b"ZZZZ\x06\x00"[..]),
            Err(Error::InvalidArchive)
        ));
    }

    #[test]
    fn wide_type_tag_is_unknown() -> Result<()> {
        let mut header = Header::new();
        header.set_uint(FieldKey::TYP, UintWidth::U16, 0x146)?;
        header.set_string(FieldKey::PAT, "a")?;
        let item = Item::new(header);

        assert_eq!(item.entry_type(), None);

        Ok(())
    }
}
