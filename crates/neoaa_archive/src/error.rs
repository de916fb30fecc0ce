//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::header::FieldKey;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// Transparent wrapper for [`walkdir::Error`]
    #[error(transparent)]
    WalkError(#[from] walkdir::Error),

    /// file is not an apple archive
    #[error("file is not an apple archive")]
    #[diagnostic(help("expected an `AA01` item stream or a `pbz` compressed container"))]
    InvalidArchive,

    /// archive ended in the middle of {0}
    #[error("archive ended in the middle of {0}")]
    TruncatedArchive(&'static str),

    /// unsupported compression tag {0:#04x}
    #[error("unsupported compression tag {0:#04x}")]
    UnsupportedCompression(u8),

    /// unable to decompress chunk: {0}
    #[error("unable to decompress chunk: {0}")]
    Decompression(String),

    /// unable to grow the item list
    #[error("unable to grow the item list")]
    OutOfMemory(#[from] std::collections::TryReserveError),

    /// value {value} does not fit in a {width} byte field {key}
    #[error("value {value} does not fit in a {width} byte field {key}")]
    ValueOutOfRange {
        /// Field being set
        key: FieldKey,
        /// Requested width in bytes
        width: u8,
        /// Rejected value
        value: u64,
    },

    /// field {0} is longer than 65535 bytes
    #[error("field {0} is longer than 65535 bytes")]
    StringTooLong(FieldKey),

    /// unknown subtype {subtype:?} for field {key}
    #[error("unknown subtype {subtype:?} for field {key}")]
    UnknownSubtype {
        /// Field being parsed
        key: FieldKey,
        /// Subtype byte as found in the archive
        subtype: char,
    },

    /// encoded header is {0} bytes, more than fits in a u16
    #[error("encoded header is {0} bytes, more than fits in a u16")]
    HeaderTooLarge(usize),

    /// header announces {expected} blob bytes but the item carries {actual}
    #[error("header announces {expected} blob bytes but the item carries {actual}")]
    BlobSizeMismatch {
        /// Total of the header's blob fields
        expected: u64,
        /// Length of the attached payload
        actual: u64,
    },

    /// {0} is not a directory
    #[error("{0} is not a directory")]
    NotADirectory(String),

    /// unable to find requested file
    #[error("unable to find requested file")]
    FileNotFound(#[from] FileNotFoundError),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when a file has not been found
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested file")]
pub enum FileNotFoundError {
    /// at index {0}
    #[error("at index {0}")]
    Index(usize),

    /// by path {0}
    #[error("by path {0}")]
    Path(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
