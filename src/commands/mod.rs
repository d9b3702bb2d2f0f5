//! CLI command implementations for bamidx.
//!
//! - [`index`] - build a `.bai` index for a coordinate-sorted BAM
//! - [`validate`] - check every record's structure without indexing
//! - [`idxstats`] - per-reference mapped and unmapped counts from an index

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod idxstats;
pub mod index;
pub mod validate;
