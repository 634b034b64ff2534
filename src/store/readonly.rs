use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use ipld_core::cid::Cid;
use positioned_io::ReadAt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    dag::Block,
    index::{attach, generate_index, read_index, Index},
    io::{Mmap, OffsetReader, SliceReader},
    v1,
    varint::{read_cid, read_varint_u64_or_eof},
    v2,
    Error,
};

/// Capacity of the buffer between the key scanner and its consumer.
const ALL_KEYS_BUFFER: usize = 5;

/// A read-only, random-access block store over a CARv1 payload.
///
/// The store borrows an immutable byte source for its whole lifetime and
/// owns a parsed index; both are shareable across concurrent readers
/// without locking. Mutating operations are always refused.
pub struct ReadOnly<B> {
    /// The backing containing the CAR in v1 format.
    backing: Arc<B>,
    /// The CARv1 content index.
    index: Box<dyn Index + Send + Sync>,
    /// Accepted and ignored: this store never hashes payloads.
    hash_on_read: AtomicBool,
}

impl<B> ReadOnly<B>
where
    B: ReadAt + Send + Sync + 'static,
{
    /// Open a store from an existing backing containing a CARv1 payload and
    /// an existing index over it.
    ///
    /// An index for a CARv1 payload can be separately generated using
    /// [`generate_index`].
    pub fn new<I>(backing: B, index: I) -> Self
    where
        I: Index + Send + Sync + 'static,
    {
        Self {
            backing: Arc::new(backing),
            index: Box::new(index),
            hash_on_read: AtomicBool::new(false),
        }
    }

    /// Whether the store contains a block for the given key.
    ///
    /// A key absent from the index is simply not contained; a frame whose
    /// embedded CID disagrees with the index is treated the same way.
    pub fn has(&self, cid: &Cid) -> Result<bool, Error> {
        let offset = match self.index.get(cid) {
            Ok(offset) => offset,
            Err(Error::NotFoundError) => return Ok(false),
            Err(other) => return Err(other),
        };
        let (frame_cid, _, _) = v1::read_frame_meta_at(&*self.backing, offset)?;
        Ok(frame_cid == *cid)
    }

    /// Get the block for the given key.
    ///
    /// A stale or corrupt index must not take readers down: any failure to
    /// reproduce the requested CID at the indexed offset reads as
    /// [`Error::NotFoundError`].
    pub fn get(&self, cid: &Cid) -> Result<Block, Error> {
        let offset = self.index.get(cid)?;
        match v1::read_frame_at(&*self.backing, offset) {
            Ok((frame_cid, data, _)) if frame_cid == *cid => {
                Ok(Block::new(*cid, Bytes::from(data)))
            }
            Ok((frame_cid, _, _)) => {
                debug!(%cid, %frame_cid, offset, "indexed frame does not carry the requested key");
                Err(Error::NotFoundError)
            }
            Err(error) => {
                debug!(%cid, offset, ?error, "failed to read indexed frame");
                Err(Error::NotFoundError)
            }
        }
    }

    /// Get the size of the frame body for the given key: the length-prefixed
    /// bytes following the frame's varint, CID included.
    pub fn get_size(&self, cid: &Cid) -> Result<u64, Error> {
        let offset = self.index.get(cid)?;
        match v1::read_frame_meta_at(&*self.backing, offset) {
            Ok((frame_cid, frame_length, _)) if frame_cid == *cid => Ok(frame_length),
            Ok(_) | Err(_) => Err(Error::NotFoundError),
        }
    }

    /// Root CIDs of the backing CAR.
    pub fn roots(&self) -> Result<Vec<Cid>, Error> {
        Ok(v1::read_header_at(&*self.backing)?.roots)
    }

    /// A lazy, single-pass stream over the keys in the CAR, in on-disk frame
    /// order.
    ///
    /// Production runs on a background task feeding a small bounded buffer.
    /// Cancelling the token, or dropping the stream, stops the scan at the
    /// next frame boundary. A mid-scan I/O error silently ends the stream.
    pub fn all_keys(&self, cancellation: CancellationToken) -> Result<ReceiverStream<Cid>, Error> {
        let header = v1::read_header_at(&*self.backing)?;
        let mut offset = v1::header_size(&header)?;

        let backing = Arc::clone(&self.backing);
        let (tx, rx) = mpsc::channel(ALL_KEYS_BUFFER);
        tokio::spawn(async move {
            loop {
                let (cid, next_offset) = match next_key(&*backing, offset) {
                    Ok(Some(key)) => key,
                    Ok(None) => break,
                    Err(error) => {
                        debug!(offset, ?error, "key scan ended early");
                        break;
                    }
                };
                offset = next_offset;

                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => break,
                    sent = tx.send(cid) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }

    /// Unsupported: the store is read-only.
    pub fn put(&self, _block: Block) -> Result<(), Error> {
        Err(Error::UnsupportedOperationError("put"))
    }

    /// Unsupported: the store is read-only.
    pub fn put_many(&self, _blocks: Vec<Block>) -> Result<(), Error> {
        Err(Error::UnsupportedOperationError("put_many"))
    }

    /// Unsupported: the store is read-only.
    pub fn delete(&self, _cid: &Cid) -> Result<(), Error> {
        Err(Error::UnsupportedOperationError("delete"))
    }

    /// Record the hash-on-read preference. This store never hashes, so the
    /// flag has no effect.
    pub fn hash_on_read(&self, enabled: bool) {
        self.hash_on_read.store(enabled, Ordering::Relaxed);
    }
}

/// Read the key of the frame at `offset` and the offset of the next frame,
/// or `None` at a clean end of payload.
fn next_key<B>(backing: &B, offset: u64) -> Result<Option<(Cid, u64)>, Error>
where
    B: ReadAt + ?Sized,
{
    let mut reader = OffsetReader::new(backing, offset);
    let Some((frame_length, varint_length)) = read_varint_u64_or_eof(&mut reader)? else {
        return Ok(None);
    };
    let (cid, _) = read_cid(&mut reader)?;
    Ok(Some((cid, offset + varint_length as u64 + frame_length)))
}

impl ReadOnly<SliceReader<Mmap>> {
    /// Open a read-only store from a CARv2 file, generating an index if the
    /// file carries none.
    ///
    /// The file is memory-mapped; the mapping lives as long as the store
    /// and is released when it drops, including when construction fails
    /// after the map succeeds. If `attach_index` is set and the file has no
    /// index, the generated index is appended to the file and the header is
    /// updated to point at it.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn open_path<P>(path: P, attach_index: bool) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(&path)?;
        let backing = Mmap::map(&file)?;
        let reader = v2::Reader::new(backing)?;
        let car_v1 = reader.car_v1_slice();

        if let Some(index_slice) = reader.index_slice() {
            match read_index(OffsetReader::new(&index_slice, 0)) {
                Ok(index) => {
                    return Ok(Self {
                        backing: Arc::new(car_v1),
                        index,
                        hash_on_read: AtomicBool::new(false),
                    })
                }
                Err(error) => {
                    debug!(?error, "embedded index is unreadable, regenerating");
                }
            }
        }

        let index = generate_index(&car_v1)?;
        if !reader.header().has_index() && attach_index {
            attach(&path, &index)?;
        }
        Ok(Self::new(car_v1, index))
    }
}
