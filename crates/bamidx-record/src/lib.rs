//! Raw alignment record codec.
//!
//! Records are handled in their wire layout: [`fields`] reads and writes the
//! fixed header at named offsets, [`cigar`], [`sequence`] and [`tags`] decode
//! the variable-length sections, [`binning`] implements the BAI bin scheme,
//! [`validate`] checks structure, and [`RawRecord`]/[`RecordBuilder`] own
//! and construct record buffers.
#![deny(unsafe_code)]
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

pub mod binning;
pub mod builder;
pub mod cigar;
pub mod fields;
pub mod record;
pub mod sequence;
pub mod tags;
pub mod validate;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

// Flat re-exports: callers use bamidx_record::ref_id() etc.
pub use binning::*;
pub use builder::*;
pub use cigar::*;
pub use fields::*;
pub use record::*;
pub use sequence::*;
pub use tags::*;
pub use validate::*;

#[cfg(any(test, feature = "test-utils"))]
pub use testutil::*;
