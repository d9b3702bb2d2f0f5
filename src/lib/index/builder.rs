//! Streaming index construction.
//!
//! [`IndexBuilder`] owns the reassembler, the bin accumulator and one spill
//! per entry kind. Decompressed blocks go in through [`IndexBuilder::feed`]
//! strictly in file order; [`IndexBuilder::finish`] merges the spilled
//! entries and writes the index.

use std::io::Write;
use std::path::{Path, PathBuf};

use bamidx_record::{checked_u32, validate_with_references};
use log::debug;
use tempfile::TempDir;

use super::accumulator::{BinAccumulator, IndexSink};
use super::entries::{BinChunk, LinearChunk, MetaInfo};
use super::writer::{IndexSummary, IndexWriter};
use crate::errors::{IndexError, Result};
use crate::header::ReferenceTable;
use crate::reassembler::{BlockSlice, RecordReassembler};
use crate::spill::{FragmentMerger, Spill};

/// Tuning for index construction and the ingest pipeline.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Entries held in memory per kind before a fragment is spilled.
    pub spill_capacity: usize,
    /// Maximum fragments merged at once.
    pub merge_fan_in: usize,
    /// Parent directory for spill files; the system temp dir if `None`.
    pub temp_dir: Option<PathBuf>,
    /// Decompression workers. Above 1, full spill buffers are also sorted
    /// in parallel.
    pub threads: usize,
    /// Decompressed block buffers in flight.
    pub buffer_pool_size: usize,
    /// Compressed blocks read per batch.
    pub batch_blocks: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            spill_capacity: 1_000_000,
            merge_fan_in: 64,
            temp_dir: None,
            threads: 1,
            buffer_pool_size: 64,
            batch_blocks: 16,
        }
    }
}

impl IndexerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn spill_capacity(mut self, capacity: usize) -> Self {
        self.spill_capacity = capacity;
        self
    }

    #[must_use]
    pub fn merge_fan_in(mut self, fan_in: usize) -> Self {
        self.merge_fan_in = fan_in;
        self
    }

    #[must_use]
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    /// Set the worker count; the buffer pool grows to keep every worker busy.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self.buffer_pool_size = self.buffer_pool_size.max(self.threads * 4);
        self
    }

    #[must_use]
    pub fn buffer_pool_size(mut self, size: usize) -> Self {
        self.buffer_pool_size = size;
        self
    }

    #[must_use]
    pub fn batch_blocks(mut self, blocks: usize) -> Self {
        self.batch_blocks = blocks;
        self
    }

    fn create_temp_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bamidx.");
        let dir = match &self.temp_dir {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

/// The three spills, acting as the accumulator's sink.
#[derive(Debug)]
struct SpillSet {
    bins: Spill<BinChunk>,
    linear: Spill<LinearChunk>,
    metas: Spill<MetaInfo>,
}

impl SpillSet {
    fn create(dir: &Path, capacity: usize, parallel: bool) -> Result<Self> {
        Ok(Self {
            bins: Spill::create(dir, capacity, parallel)?,
            linear: Spill::create(dir, capacity, parallel)?,
            metas: Spill::create(dir, capacity, parallel)?,
        })
    }
}

impl IndexSink for SpillSet {
    fn bin_chunk(&mut self, chunk: BinChunk) -> Result<()> {
        self.bins.put(chunk)
    }

    fn linear_chunk(&mut self, chunk: LinearChunk) -> Result<()> {
        self.linear.put(chunk)
    }

    fn meta(&mut self, meta: MetaInfo) -> Result<()> {
        self.metas.put(meta)
    }
}

/// Builds a BAI index from decompressed blocks of a coordinate-sorted BAM.
#[derive(Debug)]
pub struct IndexBuilder {
    references: ReferenceTable,
    merge_fan_in: usize,
    reassembler: RecordReassembler,
    accumulator: BinAccumulator,
    spills: SpillSet,
    temp_dir: TempDir,
    records: u64,
}

impl IndexBuilder {
    /// # Errors
    ///
    /// Returns an error if the spill directory or files cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `config.spill_capacity` is zero or `config.merge_fan_in`
    /// is less than 2.
    pub fn new(references: ReferenceTable, config: &IndexerConfig) -> Result<Self> {
        assert!(config.merge_fan_in >= 2, "merge fan-in must be at least 2");
        let temp_dir = config.create_temp_dir()?;
        debug!("Spilling index entries under {}", temp_dir.path().display());
        let spills = SpillSet::create(temp_dir.path(), config.spill_capacity, config.threads > 1)?;
        Ok(Self {
            references,
            merge_fan_in: config.merge_fan_in,
            reassembler: RecordReassembler::new(),
            accumulator: BinAccumulator::new(),
            spills,
            temp_dir,
            records: 0,
        })
    }

    /// Records indexed so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    #[must_use]
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// Index every record completed by `slice`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidRecord`] for a record failing either
    /// validation pass, [`IndexError::SortOrder`] for a record out of
    /// coordinate order, or a spill I/O error. The builder must not be fed
    /// again after an error.
    pub fn feed(&mut self, slice: BlockSlice<'_>) -> Result<()> {
        let n_ref = self.references.len();
        let mut feed = self.reassembler.feed(slice);
        while let Some(assembled) = feed.next_record() {
            self.records += 1;
            let bam = assembled.record.as_bytes();
            let verdict = validate_with_references(bam, n_ref);
            if !verdict.is_valid() {
                let (ref_id, pos) = coordinate(bam);
                return Err(IndexError::InvalidRecord {
                    verdict,
                    record_number: self.records,
                    ref_id,
                    pos,
                    voffset: assembled.start,
                });
            }
            self.accumulator.push(bam, assembled.start, assembled.end, &mut self.spills)?;
        }
        Ok(())
    }

    /// Close the record stream, merge the spilled entries and write the
    /// index to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Truncated`] if the stream ended inside a record,
    /// an [`IndexError::Inconsistent`] or
    /// [`IndexError::ReferenceOutOfRange`] from the writer's checks, or any
    /// I/O error.
    pub fn finish<W: Write>(mut self, out: &mut W) -> Result<IndexSummary> {
        self.reassembler.finish()?;
        let stats = self.accumulator.finish(&mut self.spills)?;
        debug!(
            "Accumulated {} bin chunks and {} linear entries over {} reference(s)",
            stats.bin_chunks, stats.linear_chunks, stats.references
        );

        let SpillSet { bins, linear, metas } = self.spills;
        let bin_fragments = bins.finish()?;
        let linear_fragments = linear.finish()?;
        let meta_fragments = metas.finish()?;
        debug!(
            "Merging {} bin, {} linear and {} meta fragment(s)",
            bin_fragments.len(),
            linear_fragments.len(),
            meta_fragments.len()
        );

        let merger = FragmentMerger::new(self.temp_dir.path(), self.merge_fan_in);
        let bins = merger.merge::<BinChunk>(bin_fragments)?;
        let linear = merger.merge::<LinearChunk>(linear_fragments)?;
        let metas = merger.merge::<MetaInfo>(meta_fragments)?;

        let writer = IndexWriter::new(self.references.len());
        writer.check_consistency(bins.stream()?, linear.stream()?)?;
        let summary = writer.write(out, bins.stream()?, linear.stream()?, metas.stream()?)?;
        debug!(
            "Merged spilled entries with {} intermediate pass(es)",
            bins.passes() + linear.passes() + metas.passes()
        );
        Ok(summary)
    }
}

/// Reference id and position of a possibly short record, -1 where absent.
pub(crate) fn coordinate(bam: &[u8]) -> (i32, i32) {
    let field = |offset| checked_u32(bam, offset).map_or(-1, |v| v as i32);
    (field(0), field(4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Reference;
    use crate::index::reader::Index;
    use bamidx_record::RecordVerdict;
    use bamidx_record::testutil::{frame_records, mapped_record, unmapped_record};
    use std::io::Cursor;

    fn references(n: usize) -> ReferenceTable {
        ReferenceTable::new(
            (0..n).map(|i| Reference { name: format!("chr{}", i + 1), length: 1_000_000 }).collect(),
        )
    }

    fn config(dir: &TempDir) -> IndexerConfig {
        IndexerConfig::new().temp_dir(dir.path()).spill_capacity(2).merge_fan_in(2)
    }

    /// Feed `stream` in `block`-byte pieces, each posing as its own BGZF
    /// block.
    fn build(records: &[Vec<u8>], block: usize, n_ref: usize) -> Result<(IndexSummary, Index)> {
        let dir = TempDir::new().unwrap();
        let stream = frame_records(records);
        let mut builder = IndexBuilder::new(references(n_ref), &config(&dir))?;
        for (i, piece) in stream.chunks(block).enumerate() {
            builder.feed(BlockSlice::new(i as u64 * 1000, 1000, piece))?;
        }
        let mut out = Vec::new();
        let summary = builder.finish(&mut out)?;
        let index = Index::read_from(&mut Cursor::new(out))?;
        Ok((summary, index))
    }

    #[test]
    fn test_two_references_three_alignments_each() {
        let records = vec![
            mapped_record(0, 100, 50, b"a1"),
            mapped_record(0, 20_000, 100, b"a2"),
            mapped_record(0, 40_000, 10_000, b"a3"),
            mapped_record(1, 5, 5, b"b1"),
            mapped_record(1, 70_000, 20, b"b2"),
            mapped_record(1, 70_010, 20, b"b3"),
        ];
        let (summary, index) = build(&records, 37, 2).unwrap();
        assert_eq!(summary.mapped, 6);
        assert_eq!(summary.references_with_data, 2);
        assert_eq!(summary.unplaced_unmapped, None);

        let ref0 = index.reference(0).unwrap();
        assert_eq!(ref0.intervals.len(), ((40_000 + 10_000) >> 14) + 1);
        let ref1 = index.reference(1).unwrap();
        assert_eq!(ref1.intervals.len(), ((70_010 + 20) >> 14) + 1);
        for reference in index.references() {
            for bin in &reference.bins {
                for chunk in &bin.chunks {
                    assert!(chunk.start <= chunk.end);
                }
                assert!(bin.chunks.windows(2).all(|w| w[0].end <= w[1].start));
            }
            assert!(reference.intervals.windows(2).all(|w| w[0] <= w[1]));
        }
        assert_eq!(ref1.metadata.unwrap().mapped, 3);
    }

    #[test]
    fn test_block_size_does_not_change_index() {
        let records: Vec<_> = (0..40)
            .map(|i| mapped_record(i / 20, (i % 20) * 3000, 150, format!("r{i}").as_bytes()))
            .collect();
        let (_, small) = build(&records, 7, 2).unwrap();
        let (_, large) = build(&records, 100_000, 2).unwrap();
        // Virtual offsets differ with the block layout, but the shape does not.
        for (a, b) in small.references().iter().zip(large.references()) {
            let ids = |r: &crate::index::ReferenceIndex| r.bins.iter().map(|b| b.id).collect::<Vec<_>>();
            assert_eq!(ids(a), ids(b));
            assert_eq!(a.intervals.len(), b.intervals.len());
            assert_eq!(a.metadata.map(|m| m.mapped), b.metadata.map(|m| m.mapped));
        }
    }

    #[test]
    fn test_unmapped_records_are_counted() {
        let records = vec![
            mapped_record(0, 100, 50, b"m"),
            unmapped_record(0, 100, b"placed"),
            unmapped_record(-1, -1, b"u1"),
            unmapped_record(-1, -1, b"u2"),
        ];
        let (summary, index) = build(&records, 64, 1).unwrap();
        assert_eq!(summary.mapped, 1);
        assert_eq!(summary.unmapped, 1);
        assert_eq!(summary.unplaced_unmapped, Some(2));
        assert_eq!(index.unplaced_unmapped(), Some(2));
        assert_eq!(index.reference(0).unwrap().metadata.unwrap().unmapped, 1);
    }

    #[test]
    fn test_sort_violation_is_fatal() {
        let records = vec![mapped_record(1, 100, 10, b"x"), mapped_record(0, 50, 10, b"y")];
        let err = build(&records, 1000, 2).unwrap_err();
        assert!(matches!(
            err,
            IndexError::SortOrder { prev_ref_id: 1, prev_pos: 100, ref_id: 0, pos: 50, .. }
        ));
    }

    #[test]
    fn test_invalid_record_reports_context() {
        let mut bad = mapped_record(0, 300, 10, b"bad");
        bad[32] = b'@';
        let records = vec![mapped_record(0, 100, 10, b"ok"), bad];
        match build(&records, 1000, 1).unwrap_err() {
            IndexError::InvalidRecord { verdict, record_number, ref_id, pos, .. } => {
                assert_eq!(verdict, RecordVerdict::IllegalNameCharacter);
                assert_eq!((record_number, ref_id, pos), (2, 0, 300));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reference_outside_header_is_rejected() {
        let records = vec![mapped_record(3, 100, 10, b"r")];
        let err = build(&records, 1000, 2).unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidRecord { verdict: RecordVerdict::InvalidReferenceId, .. }
        ));
    }

    #[test]
    fn test_alignment_past_binning_range_is_rejected() {
        use bamidx_record::testutil::{encode_op, make_bam_bytes};

        let mut ops = vec![encode_op(0, 1)];
        ops.extend(std::iter::repeat_n(encode_op(3, (1 << 28) - 1), 20));
        ops.push(encode_op(0, 1));
        let records = vec![make_bam_bytes(0, 0, 0, b"r", &ops, 2, -1, -1, &[])];
        match build(&records, 1000, 1).unwrap_err() {
            IndexError::InvalidRecord { verdict, record_number, .. } => {
                assert_eq!(verdict, RecordVerdict::InvalidPosition);
                assert_eq!(record_number, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_stream_is_fatal() {
        let dir = TempDir::new().unwrap();
        let stream = frame_records(&[mapped_record(0, 1, 10, b"r")]);
        let mut builder = IndexBuilder::new(references(1), &config(&dir)).unwrap();
        builder.feed(BlockSlice::new(0, 10, &stream[..stream.len() - 1])).unwrap();
        let err = builder.finish(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, IndexError::Truncated { .. }));
    }

    #[test]
    fn test_empty_stream_writes_empty_references() {
        let (summary, index) = build(&[], 10, 3).unwrap();
        assert_eq!(summary.references, 3);
        assert_eq!(summary.references_with_data, 0);
        assert!(index.references().iter().all(|r| r.bins.is_empty() && r.intervals.is_empty()));
    }

    #[test]
    fn test_temp_dir_is_removed() {
        let parent = TempDir::new().unwrap();
        let config = IndexerConfig::new().temp_dir(parent.path());
        let builder = IndexBuilder::new(references(1), &config).unwrap();
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 1);
        builder.finish(&mut Vec::new()).unwrap();
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }
}
