//! Helper utilities for integration tests.

pub mod bam_generator;

pub use bam_generator::*;

use bamidx_record::testutil::{mapped_record, unmapped_record};

/// A sorted set of records over two references: mapped reads spread over
/// several linear windows, a placed unmapped mate, and unplaced reads at the
/// end.
pub fn sorted_records() -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    for i in 0..40 {
        let name = format!("r1_{i:03}");
        records.push(mapped_record(0, i * 1500, 100, name.as_bytes()));
    }
    records.push(unmapped_record(0, 58_500, b"r1_mate"));
    for i in 0..20 {
        let name = format!("r2_{i:03}");
        records.push(mapped_record(1, 10_000 + i * 20_000, 250, name.as_bytes()));
    }
    for i in 0..5 {
        let name = format!("unplaced_{i}");
        records.push(unmapped_record(-1, -1, name.as_bytes()));
    }
    records
}

/// References matching [`sorted_records`].
pub const REFERENCES: &[(&str, u32)] = &[("chr1", 100_000), ("chr2", 500_000), ("chr3", 1_000)];
