//! Integration tests for the bamidx library and binary.
//!
//! These tests write real BGZF files and run them through the full
//! pipeline, checking the produced index against known record offsets and
//! against an independent BAI reader.

mod helpers;
mod test_commands;
mod test_error_paths;
mod test_index_build;
mod test_validate;
