//! Index engine: a CID to byte-offset map over a CARv1 payload.
//!
//! Serialized indexes are self-delimiting and begin with a varint
//! multicodec tag naming their representation. Only the digest-sorted
//! representation is readable and writable; the pre-registry codecs are
//! recognized solely to be refused.

mod generator;
mod sorted;

use std::{
    fs::OpenOptions,
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
};

use byteorder::{LittleEndian, WriteBytesExt};
use integer_encoding::{VarIntReader, VarIntWriter};
use ipld_core::cid::Cid;

pub use crate::index::{
    generator::{generate_index, generate_index_from_file},
    sorted::{IndexEntry, IndexSorted},
};
use crate::{
    multicodec::{
        CAR_INDEX_SORTED_CODE, INDEX_GOB_HASHED_CODE, INDEX_HASHED_CODE, INDEX_SINGLE_SORTED_CODE,
    },
    v2::INDEX_OFFSET_FIELD,
    Error,
};

/// A single `(CID, offset)` pair for bulk-loading an index.
///
/// The offset points at the frame's leading varint within the CARv1
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub cid: Cid,
    pub offset: u64,
}

impl Record {
    /// Construct a new [`Record`].
    pub fn new(cid: Cid, offset: u64) -> Self {
        Self { cid, offset }
    }
}

/// A queryable CID to byte-offset map with a binary form.
pub trait Index {
    /// The multicodec tag identifying the representation.
    fn codec(&self) -> u64;

    /// The byte offset of the frame carrying `cid`, or
    /// [`Error::NotFoundError`].
    fn get(&self, cid: &Cid) -> Result<u64, Error>;

    /// Bulk-build the index from records. Meant to be called exactly once,
    /// on an empty index; loading into a populated index replaces its
    /// contents.
    fn load(&mut self, records: Vec<Record>) -> Result<(), Error>;

    /// Serialize the index, without the leading multicodec tag.
    fn marshal(&self, writer: &mut dyn Write) -> Result<(), Error>;

    /// Deserialize the index, the leading multicodec tag already consumed.
    fn unmarshal(&mut self, reader: &mut dyn Read) -> Result<(), Error>;
}

/// Construct an empty index for the given multicodec tag.
///
/// The pre-registry codecs and any unrecognized tag yield
/// [`Error::UnknownIndexCodecError`].
pub fn new_index(codec: u64) -> Result<Box<dyn Index + Send + Sync>, Error> {
    match codec {
        CAR_INDEX_SORTED_CODE => Ok(Box::new(IndexSorted::new())),
        INDEX_HASHED_CODE | INDEX_SINGLE_SORTED_CODE | INDEX_GOB_HASHED_CODE => {
            Err(Error::UnknownIndexCodecError(codec))
        }
        other => Err(Error::UnknownIndexCodecError(other)),
    }
}

/// Read a serialized index: the varint multicodec tag followed by the
/// representation's own binary form.
pub fn read_index<R>(mut reader: R) -> Result<Box<dyn Index + Send + Sync>, Error>
where
    R: Read,
{
    let codec: u64 = reader.read_varint()?;
    let mut index = new_index(codec)?;
    index.unmarshal(&mut reader)?;
    Ok(index)
}

/// Serialize an index, prefixed with its varint multicodec tag.
pub fn write_index<W>(index: &dyn Index, mut writer: W) -> Result<(), Error>
where
    W: Write,
{
    writer.write_varint(index.codec())?;
    index.marshal(&mut writer)
}

/// Append a serialized index to an existing CARv2 file and point the
/// header's `index_offset` field at it. Returns the offset the index was
/// written at.
///
/// The header rewrite is a single 8-byte write performed after the index
/// bytes land, so a reader holding the file open keeps working throughout;
/// a crash in between leaves an `index_offset` that readers must validate
/// against the file size.
pub fn attach<P>(path: P, index: &dyn Index) -> Result<u64, Error>
where
    P: AsRef<Path>,
{
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let index_offset = file.seek(SeekFrom::End(0))?;

    let mut writer = BufWriter::new(&mut file);
    write_index(index, &mut writer)?;
    writer.flush()?;
    drop(writer);

    file.seek(SeekFrom::Start(INDEX_OFFSET_FIELD))?;
    file.write_u64::<LittleEndian>(index_offset)?;
    file.flush()?;
    Ok(index_offset)
}
