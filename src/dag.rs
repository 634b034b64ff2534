//! The DAG walker capability consumed by the archive writer.
//!
//! The core owns no DAG semantics: callers supply block fetching through
//! [`NodeGetter`] and traversal ordering through a walk function.

use std::future::Future;

use bytes::Bytes;
use ipld_core::cid::Cid;

use crate::Error;

/// A content-addressed block: a [`Cid`] and the payload it names.
///
/// The pairing is asserted by the producer; this crate never hashes
/// payloads to verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub data: Bytes,
}

impl Block {
    /// Construct a new [`Block`].
    pub fn new(cid: Cid, data: Bytes) -> Self {
        Self { cid, data }
    }
}

/// DAG traversal ordering hook: given a fetched block, name the children
/// the walk should visit next.
pub type WalkFunc<'a> = dyn Fn(&Block) -> Result<Vec<Cid>, Error> + 'a;

/// Block-by-CID fetch used during DAG serialization.
///
/// Cancellation follows the future: dropping the writer's future between
/// fetches abandons the walk.
pub trait NodeGetter {
    /// Fetch the block identified by `cid`.
    fn get(&self, cid: &Cid) -> impl Future<Output = Result<Block, Error>> + Send;
}

impl<T> NodeGetter for &T
where
    T: NodeGetter + Sync,
{
    fn get(&self, cid: &Cid) -> impl Future<Output = Result<Block, Error>> + Send {
        (**self).get(cid)
    }
}
