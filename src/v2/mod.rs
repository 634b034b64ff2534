mod reader;

use byteorder::{LittleEndian, WriteBytesExt};
use ipld_core::cid::Cid;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub use crate::v2::reader::Reader;
use crate::{index::Index, Error};

/// The pragma for a CARv2. This is also a valid CARv1 header, with version 2 and no root CIDs.
pub const PRAGMA: [u8; 11] = [
    0x0a, // unit(10)
    0xa1, // map(1)
    0x67, // string(7)
    0x76, 0x65, 0x72, 0x73, 0x69, 0x6f, 0x6e, // "version"
    0x02, // uint(2)
];

/// Absolute offset of the `index_offset` header field: the pragma followed
/// by the characteristics, data offset and data size fields.
pub(crate) const INDEX_OFFSET_FIELD: u64 = PRAGMA.len() as u64 + 16 + 8 + 8;

/// Low-level CARv2 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Describes certain features of the enclosed data.
    /// All 128 bits are currently reserved and must be zero.
    pub characteristics: u128,
    /// Byte-offset from the beginning of the CARv2 pragma to the first byte of the CARv1 data payload.
    pub data_offset: u64,
    /// Byte-length of the CARv1 data payload.
    pub data_size: u64,
    /// Byte-offset from the beginning of the CARv2 pragma to the first byte of the index payload.
    /// This value may be 0 to indicate the absence of index data.
    pub index_offset: u64,
}

impl Header {
    /// The size of the header in bytes, the pragma not included.
    pub const SIZE: usize = 40;

    pub fn new(data_offset: u64, data_size: u64, index_offset: u64) -> Self {
        Self {
            characteristics: 0,
            data_offset,
            data_size,
            index_offset,
        }
    }

    /// Whether the archive carries an index payload.
    pub fn has_index(&self) -> bool {
        self.index_offset != 0
    }
}

/// Low-level CARv2 writer.
pub struct Writer<W> {
    writer: W,
}

impl<W> Writer<W> {
    /// Construct a new CARv2 writer.
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
    /// Write the pragma and a CARv2 [`Header`], returning the number of
    /// bytes written.
    pub async fn write_header(&mut self, header: &Header) -> Result<usize, Error> {
        self.writer.write_all(&PRAGMA).await?;

        let mut buffer = [0; Header::SIZE];
        let mut handle = &mut buffer[..];
        WriteBytesExt::write_u128::<LittleEndian>(&mut handle, header.characteristics)?;
        WriteBytesExt::write_u64::<LittleEndian>(&mut handle, header.data_offset)?;
        WriteBytesExt::write_u64::<LittleEndian>(&mut handle, header.data_size)?;
        WriteBytesExt::write_u64::<LittleEndian>(&mut handle, header.index_offset)?;

        self.writer.write_all(&buffer).await?;
        Ok(PRAGMA.len() + Header::SIZE)
    }

    /// Write a CARv1 header.
    pub async fn write_v1_header(&mut self, v1_header: &crate::v1::Header) -> Result<usize, Error> {
        crate::v1::write_header(&mut self.writer, v1_header).await
    }

    /// Write a [`Cid`] and the respective data block.
    pub async fn write_block<Block>(&mut self, cid: &Cid, block: &Block) -> Result<usize, Error>
    where
        Block: AsRef<[u8]>,
    {
        crate::v1::write_block(&mut self.writer, cid, block).await
    }

    /// Serialize an index, multicodec tag included, returning the number of
    /// bytes written.
    pub async fn write_index(&mut self, index: &dyn Index) -> Result<usize, Error> {
        let mut buffer = Vec::new();
        crate::index::write_index(index, &mut buffer)?;
        self.writer.write_all(&buffer).await?;
        Ok(buffer.len())
    }

    /// Flushes and returns the inner writer.
    pub async fn finish(mut self) -> Result<W, Error> {
        self.writer.flush().await?;
        Ok(self.writer)
    }

    pub fn get_inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, Writer, PRAGMA};

    #[tokio::test]
    async fn header_layout_is_byte_exact() {
        let mut writer = Writer::new(Vec::new());
        let written = writer
            .write_header(&Header::new(51, 7661, 7712))
            .await
            .unwrap();
        let buffer = writer.finish().await.unwrap();

        assert_eq!(written, 51);
        assert_eq!(buffer.len(), 51);
        assert_eq!(&buffer[..11], &PRAGMA);
        // characteristics
        assert_eq!(&buffer[11..27], &[0u8; 16]);
        assert_eq!(&buffer[27..35], &51u64.to_le_bytes());
        assert_eq!(&buffer[35..43], &7661u64.to_le_bytes());
        assert_eq!(&buffer[43..51], &7712u64.to_le_bytes());
    }
}
