//! Checked unsigned varint decoding for the random-access read paths.
//!
//! The streaming reader and writer use [`integer_encoding`]'s asynchronous
//! varint traits; the functions here serve the `ReadAt`-based consumers
//! (index generation, block store lookups) which decode frames at arbitrary
//! offsets and must reject malformed encodings instead of silently
//! truncating them.

use std::io::{self, Read};

use ipld_core::cid::Cid;

use crate::Error;

/// A `u64` varint never spans more than 10 bytes.
const MAX_VARINT_LEN: usize = 10;

/// Decode an unsigned LEB128 varint, returning the value and its encoded
/// length.
///
/// Encodings longer than 10 bytes, encodings overflowing `u64` and
/// non-minimal encodings (a trailing `0x00` continuation target) are
/// rejected.
pub(crate) fn read_varint_u64<R>(reader: &mut R) -> Result<(u64, usize), Error>
where
    R: Read,
{
    read_varint_u64_or_eof(reader)?.ok_or_else(|| {
        Error::IoError(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "expected a varint",
        ))
    })
}

/// Like [`read_varint_u64`], but yields `None` when the reader is exhausted
/// before the first byte. An EOF in the middle of a varint is still an error.
pub(crate) fn read_varint_u64_or_eof<R>(reader: &mut R) -> Result<Option<(u64, usize)>, Error>
where
    R: Read,
{
    let mut value = 0u64;
    let mut length = 0usize;
    loop {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte)? == 0 {
            if length == 0 {
                return Ok(None);
            }
            return Err(Error::IoError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated varint",
            )));
        }
        let byte = byte[0];

        if length == MAX_VARINT_LEN {
            return Err(Error::InvalidFrameError(
                "varint exceeds 10 bytes".to_string(),
            ));
        }
        // The 10th byte may only carry the single remaining bit of a u64.
        if length == MAX_VARINT_LEN - 1 && (byte & 0x7f) > 1 {
            return Err(Error::InvalidFrameError("varint overflows u64".to_string()));
        }

        value |= u64::from(byte & 0x7f) << (7 * length);
        length += 1;

        if byte & 0x80 == 0 {
            if byte == 0 && length > 1 {
                return Err(Error::InvalidFrameError(
                    "varint is not minimally encoded".to_string(),
                ));
            }
            return Ok(Some((value, length)));
        }
    }
}

/// Parse a CID off the reader, returning it along with the number of bytes
/// it occupied. A CID is not self-delimiting from the outside, so frame
/// arithmetic needs the consumed length.
pub(crate) fn read_cid<R>(reader: R) -> Result<(Cid, usize), Error>
where
    R: Read,
{
    let mut counted = CountRead::new(reader);
    let cid = Cid::read_bytes(&mut counted)?;
    Ok((cid, counted.bytes_read()))
}

/// A reader that keeps track of how many bytes it has read.
struct CountRead<R> {
    inner: R,
    count: usize,
}

impl<R> CountRead<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn bytes_read(&self) -> usize {
        self.count
    }
}

impl<R> Read for CountRead<R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use integer_encoding::VarInt;

    use super::{read_varint_u64, read_varint_u64_or_eof};
    use crate::Error;

    fn decode(bytes: &[u8]) -> Result<(u64, usize), Error> {
        read_varint_u64(&mut Cursor::new(bytes))
    }

    #[test]
    fn roundtrip_boundary_values() {
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u64::MAX] {
            let mut buffer = [0u8; 10];
            let encoded = value.encode_var(&mut buffer);
            let (decoded, length) = decode(&buffer[..encoded]).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(length, encoded);
        }
    }

    #[test]
    fn empty_input_is_none() {
        let result = read_varint_u64_or_eof(&mut Cursor::new(&[] as &[u8])).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn truncated_varint_is_an_error() {
        let result = decode(&[0x80]);
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[test]
    fn eleven_byte_varint_is_rejected() {
        let result = decode(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(matches!(result, Err(Error::InvalidFrameError(_))));
    }

    #[test]
    fn overflowing_varint_is_rejected() {
        // 10 bytes whose last one carries more than the single remaining bit.
        let result = decode(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
        assert!(matches!(result, Err(Error::InvalidFrameError(_))));
    }

    #[test]
    fn non_minimal_varint_is_rejected() {
        // 0x80 0x00 encodes zero over two bytes.
        let result = decode(&[0x80, 0x00]);
        assert!(matches!(result, Err(Error::InvalidFrameError(_))));
    }
}
