mod reader;
mod writer;

use integer_encoding::VarInt;
use ipld_core::{cid::Cid, codec::Codec};
use serde::{Deserialize, Serialize};
use serde_ipld_dagcbor::codec::DagCborCodec;

pub use crate::v1::{
    reader::Reader,
    writer::{write_car_with_walker, Writer},
};
pub(crate) use crate::v1::{
    reader::{read_frame_at, read_frame_meta_at, read_header_at},
    writer::{write_block, write_header},
};
use crate::Error;

/// Low-level CARv1 header.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// CAR file version.
    ///
    /// It is always 1, as defined in the
    /// [specification](https://ipld.io/specs/transport/car/carv1/#constraints).
    version: u8,

    /// Root [`Cid`]s for the contained data. May be empty.
    pub roots: Vec<Cid>,
}

impl Header {
    /// Construct a new [`Header`].
    ///
    /// The version will always be 1, as defined in the
    /// [specification](https://ipld.io/specs/transport/car/carv1/#constraints).
    pub fn new(roots: Vec<Cid>) -> Self {
        Self { version: 1, roots }
    }
}

/// The on-disk length of the serialized header, varint prefix included.
///
/// Readers use this to position themselves at the first block frame.
pub fn header_size(header: &Header) -> Result<u64, Error> {
    let encoded = DagCborCodec::encode_to_vec(header)?;
    Ok(encoded.len().required_space() as u64 + encoded.len() as u64)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use ipld_core::cid::Cid;
    use sha2::Sha256;
    use tokio::io::BufWriter;

    use crate::{
        multicodec::{generate_multihash, RAW_CODE},
        v1::{header_size, read_header_at, Header, Reader, Writer},
    };

    impl Writer<BufWriter<Vec<u8>>> {
        pub(crate) fn test_writer() -> Self {
            let buffer = Vec::new();
            let buf_writer = BufWriter::new(buffer);
            Writer::new(buf_writer)
        }
    }

    #[tokio::test]
    async fn roundtrip_single_block() {
        let contents = b"a single block of test data".to_vec();
        let contents_multihash = generate_multihash::<Sha256>(&contents);
        let root_cid = Cid::new_v1(RAW_CODE, contents_multihash);

        let written_header = Header::new(vec![root_cid]);
        let mut writer = Writer::test_writer();
        writer.write_header(&written_header).await.unwrap();
        writer.write_block(&root_cid, &contents).await.unwrap();
        let buf_writer = writer.finish().await.unwrap();

        let buffer = buf_writer.into_inner();
        let mut reader = Reader::new(Cursor::new(buffer));
        let read_header = reader.read_header().await.unwrap();
        assert_eq!(read_header, written_header);

        let (read_cid, read_block) = reader.read_block().await.unwrap();
        assert_eq!(read_cid, root_cid);
        assert_eq!(read_block, contents);
    }

    #[tokio::test]
    async fn empty_roots_are_valid() {
        let written_header = Header::new(vec![]);
        let mut writer = Writer::test_writer();
        writer.write_header(&written_header).await.unwrap();
        let buffer = writer.finish().await.unwrap().into_inner();

        let mut reader = Reader::new(Cursor::new(buffer.clone()));
        let read_header = reader.read_header().await.unwrap();
        assert_eq!(read_header, written_header);
        assert!(read_header.roots.is_empty());

        let read_at_header = read_header_at(&buffer).unwrap();
        assert_eq!(read_at_header, written_header);
    }

    #[tokio::test]
    async fn header_size_matches_serialized_length() {
        let contents = b"sized".to_vec();
        let contents_multihash = generate_multihash::<Sha256>(&contents);
        let root_cid = Cid::new_v1(RAW_CODE, contents_multihash);

        let header = Header::new(vec![root_cid]);
        let mut writer = Writer::test_writer();
        writer.write_header(&header).await.unwrap();
        let buffer = writer.finish().await.unwrap().into_inner();

        assert_eq!(header_size(&header).unwrap(), buffer.len() as u64);
    }
}
