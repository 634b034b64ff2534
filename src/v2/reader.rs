use std::{io::Read, sync::Arc};

use byteorder::{LittleEndian, ReadBytesExt};
use positioned_io::{ReadAt, Size};

use crate::{
    io::{OffsetReader, SliceReader},
    v2::{Header, PRAGMA},
    Error,
};

/// Random-access CARv2 reader.
///
/// Parses and validates the pragma and the fixed header on construction,
/// then hands out bounded windows over the embedded CARv1 payload and the
/// index.
pub struct Reader<B> {
    backing: Arc<B>,
    header: Header,
    size: Option<u64>,
}

impl<B> Reader<B>
where
    B: ReadAt + Size,
{
    /// Open a CARv2 archive over a random-access byte source.
    ///
    /// Fails if the pragma does not match, or if the header's offsets are
    /// inconsistent with each other or with the size of the source.
    pub fn new(backing: B) -> Result<Self, Error> {
        let size = backing.size()?;

        let mut pragma = [0u8; PRAGMA.len()];
        OffsetReader::new(&backing, 0).read_exact(&mut pragma)?;
        if pragma != PRAGMA {
            return Err(Error::InvalidPragmaError(pragma.to_vec()));
        }

        let mut buffer = [0u8; Header::SIZE];
        OffsetReader::new(&backing, PRAGMA.len() as u64).read_exact(&mut buffer)?;
        let mut handle = &buffer[..];
        let characteristics = handle.read_u128::<LittleEndian>()?;
        let data_offset = handle.read_u64::<LittleEndian>()?;
        let data_size = handle.read_u64::<LittleEndian>()?;
        let index_offset = handle.read_u64::<LittleEndian>()?;

        let header = Header {
            characteristics,
            data_offset,
            data_size,
            index_offset,
        };
        validate_header(&header, size)?;

        Ok(Self {
            backing: Arc::new(backing),
            header,
            size,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// A window bounded to the embedded CARv1 payload,
    /// `[data_offset, data_offset + data_size)`.
    pub fn car_v1_slice(&self) -> SliceReader<B> {
        SliceReader::new(
            Arc::clone(&self.backing),
            self.header.data_offset,
            self.header.data_size,
        )
    }

    /// A window starting at the index payload, or `None` when the archive
    /// carries no index.
    ///
    /// An `index_offset` pointing at or past the end of the source is
    /// treated as absent: a torn header rewrite must not take lookups down
    /// with it, callers fall back to regenerating the index.
    pub fn index_slice(&self) -> Option<SliceReader<B>> {
        if !self.header.has_index() {
            return None;
        }
        let size = self.size?;
        if self.header.index_offset >= size {
            return None;
        }
        Some(SliceReader::new(
            Arc::clone(&self.backing),
            self.header.index_offset,
            size - self.header.index_offset,
        ))
    }
}

fn validate_header(header: &Header, size: Option<u64>) -> Result<(), Error> {
    let minimum_offset = (PRAGMA.len() + Header::SIZE) as u64;
    if header.data_offset < minimum_offset {
        return Err(Error::InvalidHeaderError(format!(
            "data offset {} overlaps the {minimum_offset} byte preamble",
            header.data_offset
        )));
    }
    if header.data_size == 0 {
        return Err(Error::InvalidHeaderError(
            "data size must not be zero".to_string(),
        ));
    }
    let data_end = header
        .data_offset
        .checked_add(header.data_size)
        .ok_or_else(|| Error::InvalidHeaderError("data region overflows".to_string()))?;
    if header.has_index() && header.index_offset < data_end {
        return Err(Error::InvalidHeaderError(format!(
            "index offset {} lies within the data payload ending at {data_end}",
            header.index_offset
        )));
    }
    if let Some(size) = size {
        if data_end > size {
            return Err(Error::InvalidHeaderError(format!(
                "data payload ending at {data_end} exceeds the {size} byte source"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Reader;
    use crate::{
        v2::{Header, Writer},
        Error,
    };

    async fn header_bytes(header: &Header) -> Vec<u8> {
        let mut writer = Writer::new(Vec::new());
        writer.write_header(header).await.unwrap();
        writer.finish().await.unwrap()
    }

    #[tokio::test]
    async fn rejects_non_v2_input() {
        let result = Reader::new(b"definitely not a CARv2 file".to_vec());
        assert!(matches!(result, Err(Error::InvalidPragmaError(_))));
    }

    #[tokio::test]
    async fn rejects_data_offset_inside_preamble() {
        let mut bytes = header_bytes(&Header::new(50, 100, 0)).await;
        bytes.resize(200, 0);
        let result = Reader::new(bytes);
        assert!(matches!(result, Err(Error::InvalidHeaderError(_))));
    }

    #[tokio::test]
    async fn rejects_zero_data_size() {
        let mut bytes = header_bytes(&Header::new(51, 0, 0)).await;
        bytes.resize(200, 0);
        let result = Reader::new(bytes);
        assert!(matches!(result, Err(Error::InvalidHeaderError(_))));
    }

    #[tokio::test]
    async fn rejects_index_inside_data_payload() {
        let mut bytes = header_bytes(&Header::new(51, 100, 100)).await;
        bytes.resize(200, 0);
        let result = Reader::new(bytes);
        assert!(matches!(result, Err(Error::InvalidHeaderError(_))));
    }

    #[tokio::test]
    async fn index_past_eof_reads_as_absent() {
        let mut bytes = header_bytes(&Header::new(51, 100, 4096)).await;
        bytes.resize(151, 0);
        let reader = Reader::new(bytes).unwrap();
        assert!(reader.header().has_index());
        assert!(reader.index_slice().is_none());
    }

    #[tokio::test]
    async fn slices_are_bounded() {
        let mut bytes = header_bytes(&Header::new(51, 100, 151)).await;
        bytes.resize(151, 0xAA);
        bytes.extend_from_slice(&[0xBB; 20]);
        let reader = Reader::new(bytes).unwrap();

        assert_eq!(reader.header(), &Header::new(51, 100, 151));
        assert_eq!(reader.car_v1_slice().len(), 100);
        assert_eq!(reader.index_slice().unwrap().len(), 20);
    }
}
