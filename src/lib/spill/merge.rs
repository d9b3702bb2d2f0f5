//! K-way merge of spilled fragments.
//!
//! Each fragment is already sorted, so a min-heap holding the head of every
//! fragment yields the globally sorted sequence. When there are more
//! fragments than the configured fan-in, groups of `fan_in` fragments are
//! first merged into intermediate files until one pass can finish the job.
//! The final pass is not materialised: [`MergedRun::stream`] reopens the
//! remaining sources and merges on the fly, and can be called more than once.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Take};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log::debug;

use super::buffer::{FragmentRange, FragmentWriter};
use crate::index::SpillRecord;

/// Buffer size for reading fragments during merge.
const MERGE_BUFFER_SIZE: usize = 64 * 1024;

/// One sorted fragment: a byte range in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub path: PathBuf,
    pub range: FragmentRange,
}

/// Sequential reader over one fragment.
struct FragmentReader<T> {
    reader: BufReader<Take<File>>,
    remaining: u64,
    _marker: PhantomData<T>,
}

impl<T: SpillRecord> FragmentReader<T> {
    fn open(fragment: &Fragment) -> io::Result<Self> {
        let size = T::SERIALIZED_SIZE as u64;
        if fragment.range.len % size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} fragment at {}+{} in {} is not a whole number of {size}-byte records",
                    T::KIND,
                    fragment.range.start,
                    fragment.range.len,
                    fragment.path.display()
                ),
            ));
        }
        let mut file = File::open(&fragment.path)?;
        file.seek(SeekFrom::Start(fragment.range.start))?;
        Ok(Self {
            reader: BufReader::with_capacity(MERGE_BUFFER_SIZE, file.take(fragment.range.len)),
            remaining: fragment.range.len / size,
            _marker: PhantomData,
        })
    }

    fn next(&mut self) -> io::Result<Option<T>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        T::read_from(&mut self.reader).map(Some)
    }
}

/// Entry in the merge heap. Ties go to the earlier source so equal records
/// keep their arrival order.
struct HeapEntry<T> {
    record: T,
    source: usize,
}

impl<T: Ord> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for HeapEntry<T> {}

impl<T: Ord> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record.cmp(&other.record).then(self.source.cmp(&other.source))
    }
}

/// Sorted stream over a set of fragments.
pub struct MergedStream<T> {
    readers: Vec<FragmentReader<T>>,
    heap: BinaryHeap<Reverse<HeapEntry<T>>>,
    failed: bool,
}

impl<T: SpillRecord> MergedStream<T> {
    fn open(fragments: &[Fragment]) -> io::Result<Self> {
        let mut readers = Vec::with_capacity(fragments.len());
        let mut heap = BinaryHeap::with_capacity(fragments.len());
        for (source, fragment) in fragments.iter().enumerate() {
            let mut reader = FragmentReader::open(fragment)?;
            if let Some(record) = reader.next()? {
                heap.push(Reverse(HeapEntry { record, source }));
            }
            readers.push(reader);
        }
        Ok(Self { readers, heap, failed: false })
    }
}

impl<T: SpillRecord> Iterator for MergedStream<T> {
    type Item = io::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let Reverse(entry) = self.heap.pop()?;
        match self.readers[entry.source].next() {
            Ok(Some(record)) => self.heap.push(Reverse(HeapEntry { record, source: entry.source })),
            Ok(None) => {}
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        }
        Some(Ok(entry.record))
    }
}

/// The sources left after all intermediate passes.
#[derive(Debug, Clone)]
pub struct MergedRun<T> {
    sources: Vec<Fragment>,
    passes: usize,
    _marker: PhantomData<T>,
}

impl<T: SpillRecord> MergedRun<T> {
    /// Open a fresh sorted stream over the run.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be opened or its first record
    /// cannot be read.
    pub fn stream(&self) -> io::Result<MergedStream<T>> {
        MergedStream::open(&self.sources)
    }

    /// Intermediate passes that were needed.
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Sources the final stream merges.
    #[must_use]
    pub fn sources(&self) -> usize {
        self.sources.len()
    }
}

/// Merges sorted fragments, at most `fan_in` at a time.
#[derive(Debug, Clone)]
pub struct FragmentMerger {
    scratch_dir: PathBuf,
    fan_in: usize,
}

impl FragmentMerger {
    /// # Panics
    ///
    /// Panics if `fan_in` is less than 2.
    #[must_use]
    pub fn new(scratch_dir: &Path, fan_in: usize) -> Self {
        assert!(fan_in >= 2, "merge fan-in must be at least 2, got {fan_in}");
        Self { scratch_dir: scratch_dir.to_path_buf(), fan_in }
    }

    /// Reduce `fragments` to at most `fan_in` sources.
    ///
    /// # Errors
    ///
    /// Returns an error if an intermediate merge cannot be read or written.
    pub fn merge<T: SpillRecord>(&self, fragments: Vec<Fragment>) -> io::Result<MergedRun<T>> {
        let mut sources: Vec<Fragment> =
            fragments.into_iter().filter(|f| !f.range.is_empty()).collect();
        let mut passes = 0;
        while sources.len() > self.fan_in {
            passes += 1;
            debug!(
                "Merging {} {} fragments in groups of {} (pass {passes})",
                sources.len(),
                T::KIND,
                self.fan_in
            );
            let mut next = Vec::with_capacity(sources.len().div_ceil(self.fan_in));
            for (group, chunk) in sources.chunks(self.fan_in).enumerate() {
                let path = self.scratch_dir.join(format!("{}.merge{passes}.{group}", T::KIND));
                next.push(self.merge_group::<T>(chunk, path)?);
            }
            // Outputs of the previous pass are no longer needed.
            if passes > 1 {
                for fragment in &sources {
                    std::fs::remove_file(&fragment.path)?;
                }
            }
            sources = next;
        }
        Ok(MergedRun { sources, passes, _marker: PhantomData })
    }

    fn merge_group<T: SpillRecord>(&self, group: &[Fragment], path: PathBuf) -> io::Result<Fragment> {
        let mut out = FragmentWriter::new(BufWriter::new(File::create(&path)?));
        for record in MergedStream::<T>::open(group)? {
            record?.write_to(&mut out)?;
        }
        let len = out.position();
        out.into_inner()?;
        Ok(Fragment { path, range: FragmentRange { start: 0, len } })
    }
}
