use std::collections::HashSet;

use integer_encoding::VarIntAsyncWriter;
use ipld_core::{cid::Cid, codec::Codec};
use serde_ipld_dagcbor::codec::DagCborCodec;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    dag::{NodeGetter, WalkFunc},
    v1::Header,
    Error,
};

/// Write a [`Header`] to the provided writer, returning the number of bytes
/// written.
pub(crate) async fn write_header<W>(writer: &mut W, header: &Header) -> Result<usize, Error>
where
    W: AsyncWrite + Unpin,
{
    let encoded_header = DagCborCodec::encode_to_vec(header)?;
    let varint_length = writer.write_varint_async(encoded_header.len()).await?;
    writer.write_all(&encoded_header).await?;
    Ok(varint_length + encoded_header.len())
}

/// Write a [`Cid`] and data block to the given writer, returning the number
/// of bytes written.
///
/// This is a low-level function to be used in the implementation of CAR writers.
pub(crate) async fn write_block<W, D>(
    writer: &mut W,
    cid: &Cid,
    block: D,
) -> Result<usize, Error>
where
    W: AsyncWrite + Unpin,
    D: AsRef<[u8]>,
{
    let data = block.as_ref();
    let len = cid.encoded_len() + data.len();

    let varint_length = writer.write_varint_async(len).await?;
    writer.write_all(&cid.to_bytes()).await?;
    writer.write_all(data).await?;
    Ok(varint_length + len)
}

/// Serialize a complete CARv1: the header, then one frame per CID
/// reachable from `roots`, in depth-first pre-order.
///
/// Blocks are fetched through the [`NodeGetter`] and their children named
/// by the [`WalkFunc`]. Every CID is emitted at most once, regardless of
/// how often the walk names it. Returns the number of bytes written.
pub async fn write_car_with_walker<G, W>(
    node_getter: &G,
    roots: &[Cid],
    writer: &mut W,
    walk: &WalkFunc<'_>,
) -> Result<usize, Error>
where
    G: NodeGetter,
    W: AsyncWrite + Unpin,
{
    let mut written = write_header(writer, &Header::new(roots.to_vec())).await?;

    let mut emitted: HashSet<Cid> = HashSet::new();
    let mut pending: Vec<Cid> = roots.iter().rev().copied().collect();
    while let Some(cid) = pending.pop() {
        if !emitted.insert(cid) {
            continue;
        }
        let block = node_getter.get(&cid).await?;
        written += write_block(writer, &cid, &block.data).await?;

        let children = walk(&block)?;
        pending.extend(children.into_iter().rev());
    }
    Ok(written)
}

/// Low-level CARv1 writer.
pub struct Writer<W> {
    writer: W,
}

impl<W> Writer<W> {
    /// Construct a new [`Writer`].
    ///
    /// Takes a writer into which the data will be written.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W> Writer<W>
where
    W: AsyncWrite + Unpin,
{
    /// Write a [`Header`].
    pub async fn write_header(&mut self, header: &Header) -> Result<usize, Error> {
        write_header(&mut self.writer, header).await
    }

    /// Write a [`Cid`] and the respective data block.
    pub async fn write_block<D>(&mut self, cid: &Cid, data: &D) -> Result<usize, Error>
    where
        D: AsRef<[u8]>,
    {
        write_block(&mut self.writer, cid, data).await
    }

    /// Flushes and returns the inner writer.
    pub async fn finish(mut self) -> Result<W, Error> {
        self.writer.flush().await?;
        Ok(self.writer)
    }
}
