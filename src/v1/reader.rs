use std::io::{Cursor, Read};

use integer_encoding::VarIntAsyncReader;
use ipld_core::{cid::Cid, codec::Codec};
use positioned_io::ReadAt;
use serde_ipld_dagcbor::codec::DagCborCodec;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    io::OffsetReader,
    v1::Header,
    varint::{read_cid, read_varint_u64},
    v2::PRAGMA,
    Error,
};

pub(crate) async fn read_header<R>(mut reader: R) -> Result<Header, Error>
where
    R: AsyncRead + Unpin,
{
    let header_length: usize = reader.read_varint_async().await?;
    let mut header_buffer = vec![0; header_length];
    reader.read_exact(&mut header_buffer).await?;

    decode_header(&header_buffer)
}

pub(crate) async fn read_block<R>(mut reader: R) -> Result<(Cid, Vec<u8>), Error>
where
    R: AsyncRead + Unpin,
{
    let full_block_length: usize = reader.read_varint_async().await?;
    let mut full_block_buffer = vec![0; full_block_length];
    reader.read_exact(&mut full_block_buffer).await?;

    // We're cheating to get Seek
    let mut full_block_cursor = Cursor::new(full_block_buffer);
    let cid = Cid::read_bytes(&mut full_block_cursor)?;

    let data_start_position = full_block_cursor.position() as usize;
    let mut full_block_buffer = full_block_cursor.into_inner();

    Ok((cid, full_block_buffer.split_off(data_start_position)))
}

fn decode_header(header_buffer: &[u8]) -> Result<Header, Error> {
    // From the V2 specification:
    // > This 11 byte string remains fixed and may be matched using a
    // > simple byte comparison and does not require a varint or CBOR
    // > decode since it does not vary for the CARv2 format.
    // We're skipping the first byte because we already read the length
    if header_buffer.starts_with(&PRAGMA[1..]) {
        return Err(Error::VersionMismatchError {
            expected: 1,
            received: 2,
        });
    }

    let header: Header = DagCborCodec::decode_from_slice(header_buffer)?;
    if header.version != 1 {
        return Err(Error::VersionMismatchError {
            expected: 1,
            received: header.version,
        });
    }
    Ok(header)
}

/// Read the header of a CARv1 payload backed by a random-access source.
pub(crate) fn read_header_at<B>(backing: &B) -> Result<Header, Error>
where
    B: ReadAt + ?Sized,
{
    let mut reader = OffsetReader::new(backing, 0);
    let (header_length, _) = read_varint_u64(&mut reader)?;
    let mut header_buffer = vec![0; header_length as usize];
    reader.read_exact(&mut header_buffer)?;

    decode_header(&header_buffer)
}

/// Read the frame starting at `offset`: its CID, its payload and the offset
/// of the next frame.
///
/// The offset points at the frame's leading varint, as recorded by the
/// index.
pub(crate) fn read_frame_at<B>(backing: &B, offset: u64) -> Result<(Cid, Vec<u8>, u64), Error>
where
    B: ReadAt + ?Sized,
{
    let mut reader = OffsetReader::new(backing, offset);
    let (frame_length, varint_length) = read_varint_u64(&mut reader)?;
    let (cid, cid_length) = read_cid(&mut reader)?;
    if cid_length as u64 > frame_length {
        return Err(Error::InvalidFrameError(format!(
            "frame of {frame_length} bytes at offset {offset} is shorter than its {cid_length} byte CID"
        )));
    }

    let mut data = vec![0; (frame_length - cid_length as u64) as usize];
    reader.read_exact(&mut data)?;
    Ok((cid, data, offset + varint_length as u64 + frame_length))
}

/// Like [`read_frame_at`], but stops after the CID: returns the CID, the
/// frame body length (CID bytes included) and the offset of the next frame.
pub(crate) fn read_frame_meta_at<B>(backing: &B, offset: u64) -> Result<(Cid, u64, u64), Error>
where
    B: ReadAt + ?Sized,
{
    let mut reader = OffsetReader::new(backing, offset);
    let (frame_length, varint_length) = read_varint_u64(&mut reader)?;
    let (cid, cid_length) = read_cid(&mut reader)?;
    if cid_length as u64 > frame_length {
        return Err(Error::InvalidFrameError(format!(
            "frame of {frame_length} bytes at offset {offset} is shorter than its {cid_length} byte CID"
        )));
    }

    Ok((cid, frame_length, offset + varint_length as u64 + frame_length))
}

/// Low-level CARv1 reader.
pub struct Reader<R> {
    reader: R,
}

impl<R> Reader<R> {
    /// Constructs a new [`Reader`].
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> Reader<R>
where
    R: AsyncRead + Unpin,
{
    /// Read a [`Header`].
    ///
    /// Returns an error if the read header does not have version 1,
    /// for example, when the reader is positioned at a CARv2 pragma.
    ///
    /// For more information, check the [header specification](https://ipld.io/specs/transport/car/carv1/#header).
    pub async fn read_header(&mut self) -> Result<Header, Error> {
        read_header(&mut self.reader).await
    }

    /// Reads a [`Cid`] and a data block.
    ///
    /// A block is composed of a CID (either version 0 or 1) and data, it is prefixed with the data length.
    /// ```text
    /// ┌──────────────────────┬─────┬────────────────────────┐
    /// │ Data length (varint) │ CID │ Data block (raw bytes) │
    /// └──────────────────────┴─────┴────────────────────────┘
    /// ```
    /// *The data block is returned AS IS, callers should use the codec field of the [`Cid`] to parse it.*
    ///
    /// For more information, check the [block specification](https://ipld.io/specs/transport/car/carv1/#data).
    pub async fn read_block(&mut self) -> Result<(Cid, Vec<u8>), Error> {
        read_block(&mut self.reader).await
    }
}
