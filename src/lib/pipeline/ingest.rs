//! Parallel BGZF ingest feeding the header parser and a block consumer.
//!
//! ```text
//!   coordinator                       workers (threads)
//!   ───────────                       ─────────────────
//!   read batch ──▶ scheduler ──(block, buffer)──▶ inflate + CRC
//!                      ▲                              │
//!                      └──────── decompressed ◀───────┘
//!   consume in block order, release buffer
//! ```
//!
//! The coordinator is the only thread that touches the scheduler, the
//! header parser and the consumer, so ordering is decided in one place.
//! Channels are sized to the buffer pool, so neither side ever blocks on a
//! send while holding a buffer.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use bamidx_record::{RecordVerdict, validate_with_references};
use crossbeam_channel::{Receiver, Sender, bounded};
use libdeflater::Decompressor;
use log::{debug, warn};

use super::pool::BufferPool;
use super::scheduler::BlockScheduler;
use crate::bgzf_reader::{BgzfBlockReader, CompressedBlock, decompress_into};
use crate::errors::{IndexError, Result};
use crate::header::{BamHeader, HeaderParser, HeaderStatus};
use crate::index::builder::coordinate;
use crate::index::{IndexBuilder, IndexSummary, IndexerConfig};
use crate::logging::{OperationTimer, log_index_summary, log_verdict_counts};
use crate::progress::ProgressTracker;
use crate::reassembler::{BlockSlice, RecordReassembler};

/// A block after decompression.
#[derive(Debug)]
pub struct DecompressedBlock {
    pub block_id: u64,
    pub coffset: u64,
    pub compressed_len: u64,
    pub data: Vec<u8>,
}

impl DecompressedBlock {
    /// The whole block as a reassembler input.
    #[must_use]
    pub fn slice(&self) -> BlockSlice<'_> {
        BlockSlice::new(self.coffset, self.compressed_len, &self.data)
    }
}

/// Counters from one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// BGZF blocks read, empty ones included.
    pub blocks: u64,
    /// Compressed bytes read.
    pub compressed_bytes: u64,
    /// Times dispatch found the buffer pool exhausted.
    pub stalls: u64,
}

/// Decompress `input` on `config.threads` workers and hand every block to
/// `consume` in file order.
///
/// # Errors
///
/// Returns the first error from reading, decompression or `consume`; all
/// workers are stopped before returning.
pub fn for_each_block<F>(input: &Path, config: &IndexerConfig, consume: F) -> Result<PipelineStats>
where
    F: FnMut(&DecompressedBlock) -> Result<()>,
{
    let reader = BgzfBlockReader::new(BufReader::new(File::open(input)?));
    run_pipeline(reader, config, consume)
}

fn run_pipeline<R, F>(reader: BgzfBlockReader<R>, config: &IndexerConfig, consume: F) -> Result<PipelineStats>
where
    R: Read,
    F: FnMut(&DecompressedBlock) -> Result<()>,
{
    let pool = BufferPool::new(config.buffer_pool_size.max(1));
    let (work_tx, work_rx) = bounded::<(CompressedBlock, Vec<u8>)>(pool.capacity());
    let (done_tx, done_rx) = bounded::<Result<DecompressedBlock>>(pool.capacity());

    std::thread::scope(|scope| {
        for _ in 0..config.threads.max(1) {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || decompress_worker(&work_rx, &done_tx));
        }
        drop(work_rx);
        drop(done_tx);
        // Returning drops both channel ends, which stops the workers.
        dispatch_blocks(reader, &pool, work_tx, done_rx, config.batch_blocks.max(1), consume)
    })
}

fn decompress_worker(
    work_rx: &Receiver<(CompressedBlock, Vec<u8>)>,
    done_tx: &Sender<Result<DecompressedBlock>>,
) {
    let mut decompressor = Decompressor::new();
    for (block, mut data) in work_rx {
        let result = decompress_into(&block, &mut decompressor, &mut data).map(|()| DecompressedBlock {
            block_id: block.block_id,
            coffset: block.coffset,
            compressed_len: block.compressed_len(),
            data,
        });
        if done_tx.send(result).is_err() {
            break;
        }
    }
}

fn pipeline_error(reason: &str) -> IndexError {
    IndexError::Pipeline { reason: reason.to_string() }
}

fn dispatch_blocks<R, F>(
    mut reader: BgzfBlockReader<R>,
    pool: &BufferPool,
    work_tx: Sender<(CompressedBlock, Vec<u8>)>,
    done_rx: Receiver<Result<DecompressedBlock>>,
    batch_blocks: usize,
    mut consume: F,
) -> Result<PipelineStats>
where
    R: Read,
    F: FnMut(&DecompressedBlock) -> Result<()>,
{
    let mut scheduler: BlockScheduler<CompressedBlock, DecompressedBlock> = BlockScheduler::new();
    let mut in_flight = 0usize;
    let mut eof = false;

    loop {
        if !eof && scheduler.blocked() < batch_blocks {
            let batch = reader.read_batch(batch_blocks)?;
            eof = batch.len() < batch_blocks;
            for block in batch {
                scheduler.submit(block.block_id, block);
            }
        }
        for work in scheduler.dispatch(pool) {
            work_tx.send(work).map_err(|_| pipeline_error("decompression workers exited early"))?;
            in_flight += 1;
        }
        if in_flight == 0 {
            if !eof {
                continue;
            }
            if !scheduler.is_idle() {
                return Err(pipeline_error("blocks left undelivered at end of input"));
            }
            break;
        }

        let block = done_rx.recv().map_err(|_| pipeline_error("decompression workers exited early"))??;
        in_flight -= 1;
        scheduler.complete(block.block_id, block);
        while let Some(block) = scheduler.next_ready() {
            consume(&block)?;
            pool.release(block.data);
        }
    }

    let stats = PipelineStats {
        blocks: reader.blocks_read(),
        compressed_bytes: reader.position(),
        stalls: pool.stalls(),
    };
    debug!(
        "Read {} BGZF blocks ({} bytes); buffer pool of {} stalled {} time(s)",
        stats.blocks,
        stats.compressed_bytes,
        pool.capacity(),
        stats.stalls
    );
    Ok(stats)
}

/// Feeds blocks to a [`HeaderParser`] until the header is complete, then
/// passes the remainder of that block and every later block on.
struct HeaderSplitter {
    parser: Option<HeaderParser>,
}

impl HeaderSplitter {
    fn new() -> Self {
        Self { parser: Some(HeaderParser::new()) }
    }

    /// Returns the parsed header once, on the block that completes it, along
    /// with the offset where record data starts in that block.
    fn split(&mut self, block: &DecompressedBlock) -> Result<Option<(Option<BamHeader>, usize)>> {
        let Some(parser) = self.parser.as_mut() else {
            return Ok(Some((None, 0)));
        };
        match parser.feed(&block.data)? {
            HeaderStatus::NeedMore => Ok(None),
            HeaderStatus::Complete { consumed } => {
                let header = self.parser.take().map(HeaderParser::finish).transpose()?;
                Ok(Some((header, consumed)))
            }
        }
    }

    fn finish(self) -> Result<()> {
        match self.parser {
            Some(parser) => parser.finish().map(|_| ()),
            None => Ok(()),
        }
    }
}

/// What [`index_bam`] did.
#[derive(Debug, Clone, Copy)]
pub struct IndexReport {
    pub summary: IndexSummary,
    pub records: u64,
    pub pipeline: PipelineStats,
}

/// Build a BAI index for `input` and write it to `out`.
///
/// # Errors
///
/// Returns the first fatal error: unreadable input, a malformed header or
/// record, records out of coordinate order, truncation, or an I/O failure
/// while spilling or writing.
pub fn index_bam<W: Write>(input: &Path, out: &mut W, config: &IndexerConfig) -> Result<IndexReport> {
    let timer = OperationTimer::new("Indexing records");
    let progress = ProgressTracker::new("Indexed records");
    let mut splitter = HeaderSplitter::new();
    let mut builder: Option<IndexBuilder> = None;

    let pipeline = for_each_block(input, config, |block| {
        let Some((header, offset)) = splitter.split(block)? else {
            return Ok(());
        };
        if let Some(header) = header {
            debug!("Header lists {} reference(s)", header.references.len());
            builder = Some(IndexBuilder::new(header.references, config)?);
        }
        if let Some(builder) = builder.as_mut() {
            let before = builder.records();
            builder.feed(block.slice().starting_at(offset))?;
            progress.add(builder.records() - before);
        }
        Ok(())
    })?;
    splitter.finish()?;

    let Some(builder) = builder else {
        return Err(pipeline_error("header completed without creating an index builder"));
    };
    let records = builder.records();
    let summary = builder.finish(out)?;
    progress.log_final();
    timer.log_completion(records);
    log_index_summary(&summary);
    Ok(IndexReport { summary, records, pipeline })
}

/// Result of [`validate_bam`].
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub records: u64,
    /// One entry per verdict, `Valid` included, in declaration order.
    pub counts: Vec<(RecordVerdict, u64)>,
}

impl ValidationReport {
    /// Records with any verdict other than `Valid`.
    #[must_use]
    pub fn invalid(&self) -> u64 {
        self.counts.iter().filter(|(v, _)| !v.is_valid()).map(|(_, n)| n).sum()
    }
}

/// Run both validation passes over every record of `input` without
/// indexing. Up to `max_errors` invalid records are logged individually.
///
/// # Errors
///
/// Invalid records are counted, not returned as errors. Errors are returned
/// only for unreadable input, a malformed header, or a truncated stream.
pub fn validate_bam(input: &Path, config: &IndexerConfig, max_errors: usize) -> Result<ValidationReport> {
    let timer = OperationTimer::new("Validating records");
    let progress = ProgressTracker::new("Validated records");
    let mut splitter = HeaderSplitter::new();
    let mut n_ref = 0;
    let mut reassembler = RecordReassembler::new();
    let mut counts = vec![0u64; RecordVerdict::ALL.len()];
    let mut logged = 0usize;

    for_each_block(input, config, |block| {
        let Some((header, offset)) = splitter.split(block)? else {
            return Ok(());
        };
        if let Some(header) = header {
            n_ref = header.references.len();
        }
        let reassembler_records = reassembler.records();
        let mut feed = reassembler.feed(block.slice().starting_at(offset));
        let mut records = 0;
        while let Some(assembled) = feed.next_record() {
            records += 1;
            let bam = assembled.record.as_bytes();
            let verdict = validate_with_references(bam, n_ref);
            if let Some(slot) = RecordVerdict::ALL.iter().position(|v| *v == verdict) {
                counts[slot] += 1;
            }
            if !verdict.is_valid() && logged < max_errors {
                logged += 1;
                let (ref_id, pos) = coordinate(bam);
                warn!(
                    "Invalid record #{} at {} (ref_id={ref_id}, pos={pos}): {verdict}",
                    reassembler_records + records,
                    assembled.start
                );
            }
        }
        progress.add(records);
        Ok(())
    })?;
    splitter.finish()?;
    reassembler.finish()?;

    let report = ValidationReport {
        records: reassembler.records(),
        counts: RecordVerdict::ALL.iter().copied().zip(counts).collect(),
    };
    progress.log_final();
    timer.log_completion(report.records);
    log_verdict_counts(&report.counts);
    Ok(report)
}
