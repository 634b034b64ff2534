use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use integer_encoding::{VarIntReader, VarIntWriter};
use ipld_core::cid::Cid;

use crate::{
    index::{Index, Record},
    multicodec::CAR_INDEX_SORTED_CODE,
    Error,
};

// Everything that does not carry explicit endianness in the format is
// little-endian.

/// An index entry for a data block inside the CARv1.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct IndexEntry {
    /// Hash digest of the data.
    pub digest: Vec<u8>,

    /// Offset to the first byte of the varint that prefixes the CID:Bytes pair
    /// within the CARv1 payload.
    ///
    /// See the [data section in the CARv1 specification](https://ipld.io/specs/transport/car/carv1/#data)
    /// for details on block encoding.
    pub offset: u64,
}

impl IndexEntry {
    /// Construct a new [`IndexEntry`].
    pub fn new(digest: Vec<u8>, offset: u64) -> Self {
        Self { digest, offset }
    }
}

/// The canonical index representation: records grouped into buckets by
/// digest width, each bucket sorted ascending by digest.
///
/// Lookup finds the bucket for the query digest's width, then binary
/// searches it. Digests are unique within a well-formed index.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexSorted {
    /// Buckets keyed by digest width in bytes.
    buckets: BTreeMap<u32, Vec<IndexEntry>>,
}

impl IndexSorted {
    /// Construct a new, empty [`IndexSorted`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Sort a bucket and reject duplicate digests.
    fn finish_bucket(entries: &mut [IndexEntry]) -> Result<(), Error> {
        entries.sort_by(|fst, snd| fst.digest.cmp(&snd.digest));
        for window in entries.windows(2) {
            if window[0].digest == window[1].digest {
                return Err(Error::DuplicateKeyError(window[0].digest.clone()));
            }
        }
        Ok(())
    }
}

impl Index for IndexSorted {
    fn codec(&self) -> u64 {
        CAR_INDEX_SORTED_CODE
    }

    fn get(&self, cid: &Cid) -> Result<u64, Error> {
        let digest = cid.hash().digest();
        let bucket = self
            .buckets
            .get(&(digest.len() as u32))
            .ok_or(Error::NotFoundError)?;
        bucket
            .binary_search_by(|entry| entry.digest.as_slice().cmp(digest))
            .map(|position| bucket[position].offset)
            .map_err(|_| Error::NotFoundError)
    }

    fn load(&mut self, records: Vec<Record>) -> Result<(), Error> {
        let mut buckets: BTreeMap<u32, Vec<IndexEntry>> = BTreeMap::new();
        for record in records {
            let digest = record.cid.hash().digest().to_vec();
            buckets
                .entry(digest.len() as u32)
                .or_default()
                .push(IndexEntry::new(digest, record.offset));
        }
        for entries in buckets.values_mut() {
            Self::finish_bucket(entries)?;
        }
        self.buckets = buckets;
        Ok(())
    }

    fn marshal(&self, mut writer: &mut dyn Write) -> Result<(), Error> {
        writer.write_varint(self.buckets.len() as u64)?;
        for (width, entries) in &self.buckets {
            let count = entries.len() as u64;
            writer.write_u32::<LittleEndian>(*width)?;
            writer.write_u64::<LittleEndian>(count)?;
            writer.write_u64::<LittleEndian>(count * (u64::from(*width) + 8))?;
            for entry in entries {
                writer.write_all(&entry.digest)?;
                writer.write_u64::<LittleEndian>(entry.offset)?;
            }
        }
        Ok(())
    }

    fn unmarshal(&mut self, mut reader: &mut dyn Read) -> Result<(), Error> {
        let bucket_count: u64 = reader.read_varint()?;
        let mut buckets: BTreeMap<u32, Vec<IndexEntry>> = BTreeMap::new();
        for _ in 0..bucket_count {
            let width = reader.read_u32::<LittleEndian>()?;
            let count = reader.read_u64::<LittleEndian>()?;
            let data_length = reader.read_u64::<LittleEndian>()?;

            let expected_length = count
                .checked_mul(u64::from(width) + 8)
                .ok_or_else(|| Error::InvalidHeaderError("index bucket overflows".to_string()))?;
            if data_length != expected_length {
                return Err(Error::InvalidHeaderError(format!(
                    "index bucket of {count} records with width {width} declares {data_length} data bytes, expected {expected_length}"
                )));
            }
            if buckets.contains_key(&width) {
                return Err(Error::InvalidHeaderError(format!(
                    "index declares width {width} more than once"
                )));
            }

            let mut entries = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let mut digest = vec![0; width as usize];
                reader.read_exact(&mut digest)?;
                let offset = reader.read_u64::<LittleEndian>()?;
                entries.push(IndexEntry::new(digest, offset));
            }
            Self::finish_bucket(&mut entries)?;
            buckets.insert(width, entries);
        }
        self.buckets = buckets;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use digest::Digest;
    use rand::random;

    use super::IndexSorted;
    use crate::{
        index::{Index, Record},
        multicodec::{generate_multihash, MultihashCode, RAW_CODE},
        Cid, Error,
    };

    /// Build an index over `count` random single-width records.
    pub(crate) fn random_index<H>(count: u64) -> IndexSorted
    where
        H: Digest + MultihashCode,
    {
        let mut records = vec![];
        let mut data = vec![0u8; 32];
        for offset in 0..count {
            data.fill_with(random);
            let cid = Cid::new_v1(RAW_CODE, generate_multihash::<H>(&data));
            records.push(Record::new(cid, offset));
        }
        let mut index = IndexSorted::new();
        index.load(records).unwrap();
        index
    }

    fn random_cid<H>() -> Cid
    where
        H: Digest + MultihashCode,
    {
        let mut data = vec![0u8; 32];
        data.fill_with(random);
        Cid::new_v1(RAW_CODE, generate_multihash::<H>(&data))
    }

    #[test]
    fn lookup_finds_every_loaded_record() {
        let mut records = vec![];
        for offset in 0..64u64 {
            let mut data = vec![0u8; 32];
            data.fill_with(random);
            let cid = Cid::new_v1(RAW_CODE, generate_multihash::<sha2::Sha256>(&data));
            records.push(Record::new(cid, offset));
        }

        let mut index = IndexSorted::new();
        index.load(records.clone()).unwrap();
        for record in &records {
            assert_eq!(index.get(&record.cid).unwrap(), record.offset);
        }
    }

    #[test]
    fn absent_cid_is_not_found() {
        let index = random_index::<sha2::Sha256>(16);
        let result = index.get(&random_cid::<sha2::Sha256>());
        assert!(matches!(result, Err(Error::NotFoundError)));

        // a digest width the index has no bucket for
        let result = index.get(&random_cid::<sha2::Sha512>());
        assert!(matches!(result, Err(Error::NotFoundError)));
    }

    #[test]
    fn duplicate_digest_is_rejected() {
        let cid = random_cid::<sha2::Sha256>();
        let mut index = IndexSorted::new();
        let result = index.load(vec![Record::new(cid, 0), Record::new(cid, 59)]);
        assert!(matches!(result, Err(Error::DuplicateKeyError(_))));
    }

    #[test]
    fn roundtrip_multiple_widths() {
        let mut records = vec![];
        for offset in 0..8u64 {
            let mut data = vec![0u8; 32];
            data.fill_with(random);
            let cid = if offset % 2 == 0 {
                Cid::new_v1(RAW_CODE, generate_multihash::<sha2::Sha256>(&data))
            } else {
                Cid::new_v1(RAW_CODE, generate_multihash::<sha2::Sha512>(&data))
            };
            records.push(Record::new(cid, offset));
        }
        let mut index = IndexSorted::new();
        index.load(records).unwrap();

        let mut buffer = Vec::new();
        index.marshal(&mut buffer).unwrap();

        let mut read_back = IndexSorted::new();
        read_back.unmarshal(&mut buffer.as_slice()).unwrap();
        assert_eq!(read_back, index);
    }

    #[test]
    fn marshalled_bucket_layout() {
        let index = random_index::<sha2::Sha256>(3);

        let mut buffer = Vec::new();
        index.marshal(&mut buffer).unwrap();

        // bucket count (varint), then width, count and data length
        assert_eq!(buffer[0], 1);
        assert_eq!(&buffer[1..5], &32u32.to_le_bytes());
        assert_eq!(&buffer[5..13], &3u64.to_le_bytes());
        assert_eq!(&buffer[13..21], &(3 * (32 + 8) as u64).to_le_bytes());
        assert_eq!(buffer.len(), 21 + 3 * 40);

        // records sorted ascending by digest
        let first = &buffer[21..53];
        let second = &buffer[61..93];
        let third = &buffer[101..133];
        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn inconsistent_data_length_is_rejected() {
        let index = random_index::<sha2::Sha256>(2);
        let mut buffer = Vec::new();
        index.marshal(&mut buffer).unwrap();

        // corrupt the data length field
        buffer[13] ^= 0xff;
        let mut read_back = IndexSorted::new();
        let result = read_back.unmarshal(&mut buffer.as_slice());
        assert!(matches!(result, Err(Error::InvalidHeaderError(_))));
    }
}
