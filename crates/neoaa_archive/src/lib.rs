//! This library handles reading from and creating **Apple Archive** (`.aar`) files.
//!
//! # Archive Format Documentation
//!
//! An archive is a sequence of *items*, each describing one filesystem entry with a header of
//! self-describing fields and an optional payload. The item stream is either stored as is or
//! wrapped in a chunked compressed container.
//!
//! ## Item
//!
//! | Offset (bytes) | Field         | Description                                                   |
//! |----------------|---------------|---------------------------------------------------------------|
//! | 0x0000         | Magic number  | 4 bytes: "AA01" ("YAA1" is accepted when reading)             |
//! | 0x0004         | Header size   | 2 bytes: Size of the header, magic and this field included    |
//! | 0x0006         | Fields        | Header size - 6 bytes: Sequence of fields                     |
//! | Header size    | Payload       | Blob bytes, in the order of the header's blob fields          |
//!
//! All multi-byte integers of an item are little-endian.
//!
//! ### Fields
//!
//! Every field starts with a 3 byte key such as `PAT`, `TYP` or `DAT`, followed by a 1 byte
//! subtype selecting how the value is encoded:
//!
//! | Subtype             | Value                                                         |
//! |---------------------|---------------------------------------------------------------|
//! | `*`                 | Flag, no value                                                |
//! | `1`, `2`, `4`, `8`  | Unsigned integer of that many bytes                           |
//! | `P`                 | String: 2 byte length followed by the bytes                   |
//! | `A`, `B`, `C`       | Blob size of 2, 4 or 8 bytes, the blob itself is in the payload |
//! | `S`                 | Timestamp: 8 byte seconds                                     |
//! | `T`                 | Timestamp: 8 byte seconds and 4 byte nanoseconds              |
//! | `F` to `J`          | Digest of 4, 20, 32, 48 or 64 bytes                           |
//!
//! The width of a blob size is picked from the payload length: lengths below `0xFFFF` use 2 bytes,
//! lengths below `0xFFFF_FFFF` use 4 bytes, anything longer uses 8 bytes.
//!
//! The entries produced from a directory carry:
//!
//! - **TYP**: Entry type, `F` for files, `D` for directories and `L` for symbolic links
//! - **PAT**: Path relative to the archive root, components separated by `/`
//! - **LNK**: Target of a symbolic link
//! - **UID**, **GID**, **MOD**: Owner, group and permission bits, on platforms that have them
//! - **DAT**: Size of the file contents stored in the payload
//!
//! ## Compressed Container
//!
//! | Offset (bytes) | Field         | Description                                                   |
//! |----------------|---------------|---------------------------------------------------------------|
//! | 0x0000         | Magic number  | 3 bytes: "pbz"                                                |
//! | 0x0003         | Codec         | 1 byte: `e` LZFSE, `z` raw DEFLATE, `b` LZBITMAP              |
//! | 0x0004         | Block size    | 8 bytes: Maximum uncompressed size of a chunk                 |
//! | 0x000C         | Chunks        | Repeated until the end of the file                            |
//!
//! Each chunk is made of:
//!
//! | Offset (bytes) | Field             | Description                                           |
//! |----------------|-------------------|-------------------------------------------------------|
//! | 0x0000         | Uncompressed size | 8 bytes: Size of the chunk once decompressed          |
//! | 0x0008         | Stored size       | 8 bytes: Size of the bytes that follow                |
//! | 0x0010         | Data              | Stored size bytes                                     |
//!
//! A chunk whose stored size equals its uncompressed size holds raw bytes. The container sizes are
//! big-endian.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.aar`
//! - **Compression Methods**: `raw`, `lzfse` (default), `zlib`, `lzbitmap` (written with stored
//!   chunks only)
//!

pub mod archive;
pub mod compression;
pub mod error;
pub mod header;
pub mod item;
pub mod read;
pub mod tree;
pub mod types;
pub mod write;

pub use archive::{MatchMode, PlainArchive};
pub use compression::CompressionMethod;
pub use header::{FieldKey, Header};
pub use item::Item;
pub use read::GenericArchive;
pub use write::ArchiveWriter;
