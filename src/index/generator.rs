use std::path::Path;

use positioned_io::ReadAt;
use tracing::debug;

use crate::{
    index::{Index, IndexSorted, Record},
    io::{Mmap, OffsetReader},
    v1,
    varint::{read_cid, read_varint_u64_or_eof},
    Error,
};

/// Generate a digest-sorted index over a CARv1 payload.
///
/// Walks the payload's frames sequentially, recording the offset of each
/// frame's leading varint, and bulk-loads the records. The scan stops at a
/// clean end-of-payload; a frame cut short mid-way is an error.
#[tracing::instrument(skip_all)]
pub fn generate_index<B>(car_v1: &B) -> Result<IndexSorted, Error>
where
    B: ReadAt + ?Sized,
{
    let header = v1::read_header_at(car_v1)?;
    let mut offset = v1::header_size(&header)?;

    let mut records = Vec::new();
    loop {
        let mut reader = OffsetReader::new(car_v1, offset);
        let Some((frame_length, varint_length)) = read_varint_u64_or_eof(&mut reader)? else {
            break;
        };
        let (cid, _) = read_cid(&mut reader)?;
        records.push(Record::new(cid, offset));
        offset += varint_length as u64 + frame_length;
    }
    debug!(num_blocks = records.len(), "indexed CARv1 payload");

    let mut index = IndexSorted::new();
    index.load(records)?;
    Ok(index)
}

/// Generate a digest-sorted index over a CARv1 file by memory-mapping it.
pub fn generate_index_from_file<P>(path: P) -> Result<IndexSorted, Error>
where
    P: AsRef<Path>,
{
    let file = std::fs::File::open(path)?;
    let backing = Mmap::map(&file)?;
    generate_index(&backing)
}
