#![deny(unsafe_code)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::items_after_statements,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

//! # bamidx - streaming BAI index builder
//!
//! Builds the standard `.bai` index for a coordinate-sorted BAM file in a
//! single pass with bounded memory, and validates record structure along
//! the way.
//!
//! ## Overview
//!
//! - **[`bgzf_reader`]** - raw BGZF block reading and CRC-checked inflation
//! - **[`header`]** - incremental parsing of the binary BAM header
//! - **[`reassembler`]** - length-prefixed records across block boundaries
//! - **[`index`]** - bin accumulation, writing and reading of BAI files
//! - **[`spill`]** - external sort of index entries through fragment files
//! - **[`pipeline`]** - multi-threaded decompression in file order
//! - **[`logging`]** / **[`progress`]** - timing and progress reporting
//!
//! Record-level decoding and validation live in the `bamidx_record` crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufWriter;
//! use std::path::Path;
//!
//! use bamidx_lib::index::IndexerConfig;
//! use bamidx_lib::pipeline::index_bam;
//!
//! # fn main() -> bamidx_lib::Result<()> {
//! let config = IndexerConfig::new().threads(4);
//! let mut out = BufWriter::new(File::create("input.bam.bai")?);
//! let report = index_bam(Path::new("input.bam"), &mut out, &config)?;
//! println!("indexed {} records", report.records);
//! # Ok(())
//! # }
//! ```

pub mod bgzf_reader;
pub mod errors;
pub mod header;
pub mod index;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod reassembler;
pub mod spill;

pub use errors::{IndexError, Result};
