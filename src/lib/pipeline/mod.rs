//! Multi-threaded block ingest.
//!
//! Compressed blocks are read on the calling thread, inflated on a pool of
//! workers, and handed back to the caller strictly in file order. Memory is
//! bounded by the [`BufferPool`]; [`BlockScheduler`] holds blocks back while
//! the pool is exhausted and restores order on completion.

pub mod ingest;
pub mod pool;
pub mod scheduler;

pub use ingest::{
    DecompressedBlock, IndexReport, PipelineStats, ValidationReport, for_each_block, index_bam,
    validate_bam,
};
pub use pool::BufferPool;
pub use scheduler::BlockScheduler;
