//! BAI index construction and reading.
//!
//! Construction is a single pass over the coordinate-sorted record stream:
//!
//! 1. [`BinAccumulator`] turns records into bin, linear and meta entries.
//! 2. The entries are spilled to fragment files (see [`crate::spill`]) and
//!    merged back into one sorted stream per kind.
//! 3. [`IndexWriter`] serialises the merged streams one reference at a time.
//!
//! [`IndexBuilder`] wires these together behind a `feed`/`finish` API, and
//! [`Index`] reads a finished file back for queries.

pub mod accumulator;
pub mod builder;
pub mod entries;
pub mod reader;
pub mod voffset;
pub mod writer;

pub use accumulator::{AccumulatorStats, BinAccumulator, IndexSink};
pub use builder::{IndexBuilder, IndexerConfig};
pub use entries::{BinChunk, LinearChunk, MetaInfo, SpillRecord};
pub use reader::{Bin, Chunk, Index, ReferenceIndex, ReferenceMetadata};
pub use voffset::VirtualOffset;
pub use writer::{BAI_MAGIC, IndexSummary, IndexWriter};
