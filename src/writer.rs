//! Composes a complete CARv2 archive from roots and a DAG walker.

use ipld_core::cid::Cid;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    dag::{NodeGetter, WalkFunc},
    index::generate_index,
    v1,
    v2::{self, Header, PRAGMA},
    Error,
};

/// Chunk size for bulk zero padding.
const BULK_PADDING_SIZE: usize = 1024;
const BULK_PADDING: [u8; BULK_PADDING_SIZE] = [0; BULK_PADDING_SIZE];

/// High-level CARv2 writer: serializes the DAG reachable from a set of
/// roots into a fully indexed archive.
///
/// The traversal is depth-first from the roots, fetching blocks through the
/// [`NodeGetter`] and asking the [`WalkFunc`] for each block's children.
/// Every CID is emitted at most once, regardless of how often the walk
/// names it.
pub struct Writer<'a, G> {
    node_getter: G,
    roots: Vec<Cid>,
    walk: &'a WalkFunc<'a>,
    car_v1_padding: u64,
    index_padding: u64,
}

impl<'a, G> Writer<'a, G>
where
    G: NodeGetter,
{
    /// Construct a new [`Writer`] with no padding.
    pub fn new(node_getter: G, roots: Vec<Cid>, walk: &'a WalkFunc<'a>) -> Self {
        Self {
            node_getter,
            roots,
            walk,
            car_v1_padding: 0,
            index_padding: 0,
        }
    }

    /// Zero bytes to place between the CARv2 header and the CARv1 payload.
    pub fn with_car_v1_padding(mut self, padding: u64) -> Self {
        self.car_v1_padding = padding;
        self
    }

    /// Zero bytes to place between the CARv1 payload and the index.
    pub fn with_index_padding(mut self, padding: u64) -> Self {
        self.index_padding = padding;
        self
    }

    /// Write the archive, returning the total number of bytes written.
    ///
    /// The CARv1 payload is buffered in memory before anything lands in
    /// `writer`: index generation needs random access over the complete
    /// payload. Streaming this is a future refinement.
    pub async fn write_to<W>(self, writer: W) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin,
    {
        let mut car_v1 = Vec::new();
        v1::write_car_with_walker(&self.node_getter, &self.roots, &mut car_v1, self.walk)
            .await?;

        let data_offset = (PRAGMA.len() + Header::SIZE) as u64 + self.car_v1_padding;
        let data_size = car_v1.len() as u64;
        let index_offset = data_offset + data_size + self.index_padding;
        let header = Header::new(data_offset, data_size, index_offset);

        let mut writer = v2::Writer::new(writer);
        let mut written = writer.write_header(&header).await? as u64;
        written += write_padding(writer.get_inner_mut(), self.car_v1_padding).await?;

        writer.get_inner_mut().write_all(&car_v1).await?;
        written += data_size;
        written += write_padding(writer.get_inner_mut(), self.index_padding).await?;

        let index = generate_index(&car_v1)?;
        written += writer.write_index(&index).await? as u64;
        writer.finish().await?;
        Ok(written)
    }
}

/// Write `padding` zero bytes, using a shared buffer for whole-kilobyte
/// chunks.
async fn write_padding<W>(writer: &mut W, padding: u64) -> Result<u64, Error>
where
    W: AsyncWrite + Unpin,
{
    let mut remaining = padding;
    while remaining >= BULK_PADDING_SIZE as u64 {
        writer.write_all(&BULK_PADDING).await?;
        remaining -= BULK_PADDING_SIZE as u64;
    }
    if remaining > 0 {
        writer.write_all(&vec![0u8; remaining as usize]).await?;
    }
    Ok(padding)
}
