//! Bounded in-memory buffers that spill sorted fragments to disk.

use std::io::{self, Write};

use rayon::prelude::*;

use crate::index::SpillRecord;

/// Byte range of one fragment within its fragment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    pub start: u64,
    pub len: u64,
}

impl FragmentRange {
    /// Number of `T` records in the range.
    #[must_use]
    pub fn records<T: SpillRecord>(&self) -> u64 {
        self.len / T::SERIALIZED_SIZE as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Append-only writer that tracks how many bytes it has written, so each
/// flushed fragment can report its byte range.
#[derive(Debug)]
pub struct FragmentWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> FragmentWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for FragmentWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Fixed-capacity buffer of spill records.
#[derive(Debug)]
pub struct SpillBuffer<T> {
    records: Vec<T>,
    capacity: usize,
}

impl<T: SpillRecord> SpillBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "spill buffer capacity must be positive");
        Self { records: Vec::with_capacity(capacity), capacity }
    }

    /// Add a record. Returns `true` when the buffer is now full and must be
    /// flushed before the next `put`.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was already full.
    pub fn put(&mut self, record: T) -> bool {
        assert!(self.records.len() < self.capacity, "put into a full spill buffer");
        self.records.push(record);
        self.records.len() == self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sort the buffered records, append them to `out` as one fragment and
    /// empty the buffer. `parallel` sorts on the rayon pool.
    ///
    /// # Errors
    ///
    /// Propagates write errors; the buffer keeps its records in that case.
    pub fn flush<W: Write>(
        &mut self,
        out: &mut FragmentWriter<W>,
        parallel: bool,
    ) -> io::Result<FragmentRange> {
        if parallel {
            self.records.par_sort_unstable();
        } else {
            self.records.sort_unstable();
        }
        let start = out.position();
        for record in &self.records {
            record.write_to(out)?;
        }
        self.records.clear();
        Ok(FragmentRange { start, len: out.position() - start })
    }
}
