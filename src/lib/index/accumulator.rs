//! Per-record bin and linear-index accumulation.
//!
//! [`BinAccumulator`] walks the coordinate-sorted record stream once. It keeps
//! the currently open reference and bin, and emits a [`BinChunk`] whenever
//! the bin or reference changes, a [`LinearChunk`] for every 16 KiB window a
//! record newly enters, and a [`MetaInfo`] when a reference closes.

use bamidx_record::{LINEAR_WINDOW_SHIFT, alignment_bin, reference_length_from_raw_bam};

use super::entries::{BinChunk, LinearChunk, MetaInfo};
use super::VirtualOffset;
use crate::errors::{IndexError, Result};

/// Destination for closed index entries.
pub trait IndexSink {
    fn bin_chunk(&mut self, chunk: BinChunk) -> Result<()>;
    fn linear_chunk(&mut self, chunk: LinearChunk) -> Result<()>;
    fn meta(&mut self, meta: MetaInfo) -> Result<()>;
}

/// Counts of entries emitted so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorStats {
    pub records: u64,
    pub bin_chunks: u64,
    pub linear_chunks: u64,
    pub references: u64,
}

#[derive(Debug, Clone, Copy)]
struct OpenBin {
    bin: u32,
    start: VirtualOffset,
}

#[derive(Debug)]
struct OpenReference {
    ref_id: i32,
    start: VirtualOffset,
    last_end: VirtualOffset,
    mapped: u64,
    unmapped: u64,
    open_bin: Option<OpenBin>,
    max_window: Option<u64>,
}

impl OpenReference {
    fn new(ref_id: i32, start: VirtualOffset) -> Self {
        Self {
            ref_id,
            start,
            last_end: start,
            mapped: 0,
            unmapped: 0,
            open_bin: None,
            max_window: None,
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    InReference(OpenReference),
}

/// Streaming state machine over coordinate-sorted records.
#[derive(Debug)]
pub struct BinAccumulator {
    state: State,
    last_coordinate: Option<(i32, i32)>,
    stats: AccumulatorStats,
}

impl Default for BinAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BinAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self { state: State::Idle, last_coordinate: None, stats: AccumulatorStats::default() }
    }

    #[must_use]
    pub fn stats(&self) -> AccumulatorStats {
        self.stats
    }

    /// Reference currently open, if any.
    #[must_use]
    pub fn current_reference(&self) -> Option<i32> {
        match &self.state {
            State::Idle => None,
            State::InReference(open) => Some(open.ref_id),
        }
    }

    /// Account for one structurally valid record occupying `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::SortOrder`] if the record sorts before its
    /// predecessor; nothing is emitted for it in that case. Sink errors are
    /// propagated.
    pub fn push<S: IndexSink>(
        &mut self,
        bam: &[u8],
        start: VirtualOffset,
        end: VirtualOffset,
        sink: &mut S,
    ) -> Result<()> {
        let ref_id = bamidx_record::ref_id(bam);
        let pos = bamidx_record::pos(bam);
        self.check_order(ref_id, pos, start)?;
        self.last_coordinate = Some((ref_id, pos));
        self.stats.records += 1;

        let reference_changed = self.current_reference() != Some(ref_id);
        if reference_changed {
            self.close_reference(sink)?;
            self.state = State::InReference(OpenReference::new(ref_id, start));
            self.stats.references += 1;
        }
        let State::InReference(open) = &mut self.state else {
            unreachable!("a reference is always open after a push");
        };

        let unmapped = bamidx_record::is_unmapped(bam) || ref_id < 0;
        if unmapped {
            open.unmapped += 1;
        } else {
            open.mapped += 1;
        }

        let span = if unmapped || pos < 0 { None } else { Some(reference_length_from_raw_bam(bam).max(1)) };
        let bin = span.map(|span| alignment_bin(pos, span));

        if open.open_bin.map(|b| b.bin) != bin {
            if let Some(closed) = open.open_bin.take() {
                sink.bin_chunk(BinChunk {
                    ref_id,
                    bin: closed.bin,
                    start: closed.start,
                    end: open.last_end,
                })?;
                self.stats.bin_chunks += 1;
            }
            open.open_bin = bin.map(|bin| OpenBin { bin, start });
        }

        if let Some(span) = span {
            let first = (pos as u64) >> LINEAR_WINDOW_SHIFT;
            let last = (pos as u64 + span - 1) >> LINEAR_WINDOW_SHIFT;
            let from = open.max_window.map_or(first, |seen| first.max(seen + 1));
            for window in from..=last {
                sink.linear_chunk(LinearChunk { ref_id, window: window as u32, pos, voffset: start })?;
                self.stats.linear_chunks += 1;
            }
            open.max_window = Some(open.max_window.map_or(last, |seen| seen.max(last)));
        }

        open.last_end = end;
        Ok(())
    }

    /// Close the open bin and reference. Call once at end of stream.
    ///
    /// # Errors
    ///
    /// Propagates sink errors.
    pub fn finish<S: IndexSink>(mut self, sink: &mut S) -> Result<AccumulatorStats> {
        self.close_reference(sink)?;
        Ok(self.stats)
    }

    fn check_order(&self, ref_id: i32, pos: i32, voffset: VirtualOffset) -> Result<()> {
        let Some((prev_ref_id, prev_pos)) = self.last_coordinate else {
            return Ok(());
        };
        // -1 compares as u32::MAX so unplaced records sort after every reference.
        let prev_key = prev_ref_id as u32;
        let key = ref_id as u32;
        let out_of_order = key < prev_key || (key == prev_key && ref_id >= 0 && pos < prev_pos);
        if out_of_order {
            return Err(IndexError::SortOrder { prev_ref_id, prev_pos, ref_id, pos, voffset });
        }
        Ok(())
    }

    fn close_reference<S: IndexSink>(&mut self, sink: &mut S) -> Result<()> {
        let State::InReference(open) = std::mem::replace(&mut self.state, State::Idle) else {
            return Ok(());
        };
        if let Some(bin) = open.open_bin {
            sink.bin_chunk(BinChunk {
                ref_id: open.ref_id,
                bin: bin.bin,
                start: bin.start,
                end: open.last_end,
            })?;
            self.stats.bin_chunks += 1;
        }
        sink.meta(MetaInfo {
            ref_id: open.ref_id,
            start: open.start,
            end: open.last_end,
            mapped: open.mapped,
            unmapped: open.unmapped,
        })
    }
}
