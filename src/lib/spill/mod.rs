//! External spilling of index entries.
//!
//! A [`Spill`] owns one append-only fragment file per entry kind. Entries
//! collect in a bounded [`SpillBuffer`]; when it fills, the buffer is sorted
//! and appended to the file as one fragment. [`FragmentMerger`] later merges
//! all fragments of a kind back into a single sorted stream, so memory stays
//! bounded by the buffer capacity regardless of input size.

pub mod buffer;
pub mod merge;

pub use buffer::{FragmentRange, FragmentWriter, SpillBuffer};
pub use merge::{Fragment, FragmentMerger, MergedRun, MergedStream};

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::Result;
use crate::index::SpillRecord;

/// Spill buffer plus the fragment file it flushes into.
#[derive(Debug)]
pub struct Spill<T> {
    buffer: SpillBuffer<T>,
    writer: FragmentWriter<BufWriter<File>>,
    path: PathBuf,
    fragments: Vec<FragmentRange>,
    parallel: bool,
    records: u64,
}

impl<T: SpillRecord> Spill<T> {
    /// Create `<dir>/<kind>.frag` and a buffer of `capacity` records.
    /// `parallel` sorts full buffers on the rayon pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the fragment file cannot be created.
    pub fn create(dir: &Path, capacity: usize, parallel: bool) -> Result<Self> {
        let path = dir.join(format!("{}.frag", T::KIND));
        let writer = FragmentWriter::new(BufWriter::new(File::create(&path)?));
        Ok(Self {
            buffer: SpillBuffer::new(capacity),
            writer,
            path,
            fragments: Vec::new(),
            parallel,
            records: 0,
        })
    }

    /// Buffer one record, spilling a fragment if the buffer fills.
    ///
    /// # Errors
    ///
    /// Returns an error if the spill fails.
    pub fn put(&mut self, record: T) -> Result<()> {
        self.records += 1;
        if self.buffer.put(record) {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        let range = self.buffer.flush(&mut self.writer, self.parallel)?;
        if !range.is_empty() {
            debug!(
                "Spilled {} {} entries at offset {}",
                range.records::<T>(),
                T::KIND,
                range.start
            );
            self.fragments.push(range);
        }
        Ok(())
    }

    /// Records put so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Fragments written so far.
    #[must_use]
    pub fn fragments(&self) -> usize {
        self.fragments.len()
    }

    /// Spill what is left and close the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the final spill or the flush fails.
    pub fn finish(mut self) -> Result<Vec<Fragment>> {
        self.spill()?;
        self.writer.into_inner()?;
        let path = self.path;
        Ok(self.fragments.into_iter().map(|range| Fragment { path: path.clone(), range }).collect())
    }
}
