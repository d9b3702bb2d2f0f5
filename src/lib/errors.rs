//! Error types for index building.

use bamidx_record::RecordVerdict;
use thiserror::Error;

use crate::index::VirtualOffset;

/// Result type alias for bamidx operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Fatal conditions that abort reading or indexing.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The stream ended inside a record.
    #[error("Truncated BAM stream: {pending} byte(s) of an incomplete record at {voffset}")]
    Truncated {
        /// Bytes of the partial record (length prefix included) that were received.
        pending: usize,
        /// Where the partial record started.
        voffset: VirtualOffset,
    },

    /// A record failed structural validation.
    #[error(
        "Invalid record #{record_number} at {voffset} (ref_id={ref_id}, pos={pos}): {verdict}"
    )]
    InvalidRecord {
        /// Why the record is invalid.
        verdict: RecordVerdict,
        /// 1-based ordinal of the record in the stream.
        record_number: u64,
        /// Reference id, or -1 if the fixed header is incomplete.
        ref_id: i32,
        /// Position, or -1 if the fixed header is incomplete.
        pos: i32,
        /// Start of the record.
        voffset: VirtualOffset,
    },

    /// Records are not in coordinate order.
    #[error(
        "BAM is not coordinate sorted: record at {voffset} (ref_id={ref_id}, pos={pos}) follows (ref_id={prev_ref_id}, pos={prev_pos})"
    )]
    SortOrder {
        prev_ref_id: i32,
        prev_pos: i32,
        ref_id: i32,
        pos: i32,
        voffset: VirtualOffset,
    },

    /// The merged bin and linear streams disagree.
    #[error("Index streams are inconsistent: {reason}")]
    Inconsistent {
        /// What did not match.
        reason: String,
    },

    /// A reference id is not in the header.
    #[error("Reference id {ref_id} is out of range for a header with {n_ref} reference(s)")]
    ReferenceOutOfRange { ref_id: i32, n_ref: usize },

    /// The BAM header could not be parsed.
    #[error("Invalid BAM header: {reason}")]
    Header {
        /// What was wrong.
        reason: String,
    },

    /// A BGZF block could not be read or decompressed.
    #[error("BGZF block {block_id} at offset {coffset}: {source}")]
    Bgzf {
        block_id: u64,
        coffset: u64,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline stage stopped unexpectedly.
    #[error("Pipeline failure: {reason}")]
    Pipeline {
        /// What went wrong.
        reason: String,
    },

    /// I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
