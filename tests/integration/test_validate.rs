//! Whole-file validation without indexing.

use bamidx_lib::index::IndexerConfig;
use bamidx_lib::pipeline::validate_bam;
use bamidx_record::RecordVerdict;
use bamidx_record::testutil::{encode_op, make_bam_bytes, mapped_record};
use tempfile::TempDir;

use crate::helpers::{BamFileBuilder, REFERENCES, sorted_records};

fn count(report: &bamidx_lib::pipeline::ValidationReport, verdict: RecordVerdict) -> u64 {
    report.counts.iter().find(|(v, _)| *v == verdict).map_or(0, |(_, n)| *n)
}

#[test]
fn test_valid_file() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("ok.bam");
    BamFileBuilder::new(REFERENCES).block_bytes(150).records(sorted_records()).write(&bam).unwrap();

    let report = validate_bam(&bam, &IndexerConfig::new().threads(2), 10).unwrap();
    assert_eq!(report.records, 66);
    assert_eq!(report.invalid(), 0);
    assert_eq!(count(&report, RecordVerdict::Valid), 66);
    assert_eq!(report.counts.len(), RecordVerdict::ALL.len());
}

#[test]
fn test_invalid_records_are_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("mixed.bam");
    BamFileBuilder::new(REFERENCES)
        .block_bytes(90)
        .record(mapped_record(0, 100, 50, b"good1"))
        .record(mapped_record(7, 100, 50, b"bad_reference"))
        .record(make_bam_bytes(0, 200, 0, b"bad_cigar", &[encode_op(9, 10)], 10, -1, -1, &[]))
        .record(make_bam_bytes(0, 300, 0, b"", &[encode_op(0, 10)], 10, -1, -1, &[]))
        // Out of order, which validation does not check.
        .record(mapped_record(0, 10, 50, b"good2"))
        .write(&bam)
        .unwrap();

    let report = validate_bam(&bam, &IndexerConfig::new(), 1).unwrap();
    assert_eq!(report.records, 5);
    assert_eq!(report.invalid(), 3);
    assert_eq!(count(&report, RecordVerdict::Valid), 2);
    assert_eq!(count(&report, RecordVerdict::InvalidReferenceId), 1);
    assert_eq!(count(&report, RecordVerdict::UnknownCigarOperator), 1);
    assert_eq!(count(&report, RecordVerdict::EmptyName), 1);
}

#[test]
fn test_truncated_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("truncated.bam");
    BamFileBuilder::new(REFERENCES)
        .record(mapped_record(0, 100, 50, b"good"))
        .trailing_bytes(&[200, 0, 0, 0, 1, 2, 3])
        .write(&bam)
        .unwrap();
    let err = validate_bam(&bam, &IndexerConfig::new(), 10).unwrap_err();
    assert!(err.to_string().contains("Truncated"), "{err}");
}
