//! Random-access byte sources backing the block store and the index
//! generator.

use std::{fs::File, io, sync::Arc};

use positioned_io::{ReadAt, Size};

/// Wrapper type of [`memmap2::Mmap`] that implements [`ReadAt`] and [`Size`].
///
/// Reads past the end of the mapping are clamped instead of panicking, so
/// the mapping behaves like any other finite byte source.
pub struct Mmap(memmap2::Mmap);

impl Mmap {
    /// Memory-map `file` for reading.
    ///
    /// The mapping assumes the file is not concurrently truncated; the map
    /// is released when the value is dropped.
    pub fn map(file: &File) -> io::Result<Self> {
        Ok(Self(unsafe { memmap2::Mmap::map(file)? }))
    }
}

impl ReadAt for Mmap {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = pos as usize;
        if start >= self.0.len() {
            return Ok(0);
        }
        let end = (start + buf.len()).min(self.0.len());
        let len = end - start;
        buf[..len].copy_from_slice(&self.0[start..end]);
        Ok(len)
    }
}

impl Size for Mmap {
    fn size(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.0.len() as u64))
    }
}

/// A shared, bounded window over a [`ReadAt`] source.
///
/// Offset `0` of the slice maps to `offset` of the underlying source, and
/// reads are clamped to `len` bytes. Cloning is cheap; all clones read the
/// same backing.
pub struct SliceReader<B> {
    inner: Arc<B>,
    offset: u64,
    len: u64,
}

impl<B> SliceReader<B> {
    pub(crate) fn new(inner: Arc<B>, offset: u64, len: u64) -> Self {
        Self { inner, offset, len }
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<B> Clone for SliceReader<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            offset: self.offset,
            len: self.len,
        }
    }
}

impl<B> ReadAt for SliceReader<B>
where
    B: ReadAt,
{
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if pos >= self.len {
            return Ok(0);
        }
        let available = (self.len - pos).min(buf.len() as u64) as usize;
        self.inner.read_at(self.offset + pos, &mut buf[..available])
    }
}

impl<B> Size for SliceReader<B> {
    fn size(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.len))
    }
}

/// Sequential [`io::Read`] adapter over a [`ReadAt`] source, starting at a
/// given offset.
pub(crate) struct OffsetReader<'a, B>
where
    B: ?Sized,
{
    inner: &'a B,
    pos: u64,
}

impl<'a, B> OffsetReader<'a, B>
where
    B: ReadAt + ?Sized,
{
    pub(crate) fn new(inner: &'a B, pos: u64) -> Self {
        Self { inner, pos }
    }
}

impl<B> io::Read for OffsetReader<'_, B>
where
    B: ReadAt + ?Sized,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}
