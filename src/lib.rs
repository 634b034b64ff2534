//! A content-addressed archive (CAR) library.
//!
//! Reads and writes CARv1 and CARv2 files: an append-only container of
//! self-identifying data blocks keyed by [`Cid`]. The CARv2 format wraps a
//! CARv1 payload with a fixed-size header and an optional digest-sorted
//! index enabling random access, which [`ReadOnly`] serves over a
//! memory-mapped file.
//!
//! This crate treats CIDs as opaque keys: payloads are never hashed or
//! verified against the CIDs that name them.

#![warn(unused_crate_dependencies)]
#![warn(rustdoc::broken_intra_doc_links)]

mod dag;
mod index;
mod io;
mod multicodec;
mod store;
mod v1;
mod v2;
mod varint;
mod writer;

pub use dag::{Block, NodeGetter, WalkFunc};
pub use index::{
    attach, generate_index, generate_index_from_file, new_index, read_index, write_index, Index,
    IndexEntry, IndexSorted, Record,
};
pub use io::{Mmap, SliceReader};
pub use multicodec::{
    CAR_INDEX_SORTED_CODE, DAG_PB_CODE, INDEX_GOB_HASHED_CODE, INDEX_HASHED_CODE,
    INDEX_SINGLE_SORTED_CODE, RAW_CODE, SHA_256_CODE, SHA_512_CODE,
};
pub use store::ReadOnly;
pub use v1::{
    header_size, write_car_with_walker, Header as CarV1Header, Reader as CarV1Reader,
    Writer as CarV1Writer,
};
pub use v2::{Header as CarV2Header, Reader as CarV2Reader, Writer as CarV2Writer, PRAGMA};
pub use writer::Writer as CarWriter;

// We need to expose this because blocks and roots are keyed by `Cid`.
pub use ipld_core::cid::Cid;

/// CAR handling errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a version was expected, but another was received.
    ///
    /// For example, when reading CARv1 files, the only valid version is 1,
    /// otherwise, this error should be returned.
    #[error("expected version {expected}, but received version {received} instead")]
    VersionMismatchError { expected: u8, received: u8 },

    /// According to the [specification](https://ipld.io/specs/transport/car/carv2/#pragma)
    /// the pragma is composed of a pre-defined list of bytes,
    /// if the received pragma is not the same, we return an error.
    #[error("received an invalid pragma: {0:?}")]
    InvalidPragmaError(Vec<u8>),

    /// The fixed-size CARv2 header declares offsets that are inconsistent
    /// with each other or with the size of the archive.
    #[error("invalid CARv2 header: {0}")]
    InvalidHeaderError(String),

    /// A block frame could not be decoded: a malformed varint, a truncated
    /// CID, or a frame length inconsistent with its CID.
    #[error("invalid frame: {0}")]
    InvalidFrameError(String),

    /// The index multicodec tag is not the supported sorted representation.
    /// Deprecated representations are recognized, but refused all the same.
    #[error("unknown index codec: {0:#x}")]
    UnknownIndexCodecError(u64),

    /// Two records with the same digest were loaded into an index.
    #[error("duplicate digest in index: {0:02x?}")]
    DuplicateKeyError(Vec<u8>),

    /// The requested CID is absent, or the indexed frame does not carry it.
    #[error("block not found")]
    NotFoundError,

    /// A mutating operation was invoked on a read-only store.
    #[error("unsupported operation: {0}")]
    UnsupportedOperationError(&'static str),

    /// See [`CodecError`](serde_ipld_dagcbor::error::CodecError) for more information.
    #[error(transparent)]
    CodecError(#[from] serde_ipld_dagcbor::error::CodecError),

    /// See [`IoError`](std::io::Error) for more information.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// See [`CidError`](ipld_core::cid::Error) for more information.
    #[error(transparent)]
    CidError(#[from] ipld_core::cid::Error),
}
