//! Fatal conditions surfaced by `index_bam`.

use std::fs;
use std::path::Path;

use bamidx_lib::IndexError;
use bamidx_lib::index::IndexerConfig;
use bamidx_lib::pipeline::index_bam;
use bamidx_record::RecordVerdict;
use bamidx_record::testutil::{encode_op, make_bam_bytes, mapped_record, unmapped_record};
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{BamFileBuilder, REFERENCES};

fn index(path: &Path, config: &IndexerConfig) -> Result<(), IndexError> {
    let mut out = Vec::new();
    index_bam(path, &mut out, config).map(|_| ())
}

#[rstest]
#[case::single_thread(1)]
#[case::threaded(4)]
fn test_unsorted_positions(#[case] threads: usize) {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("unsorted.bam");
    BamFileBuilder::new(REFERENCES)
        .block_bytes(100)
        .record(mapped_record(0, 500, 50, b"a"))
        .record(mapped_record(0, 900, 50, b"b"))
        .record(mapped_record(0, 700, 50, b"c"))
        .write(&bam)
        .unwrap();
    let err = index(&bam, &IndexerConfig::new().threads(threads)).unwrap_err();
    match err {
        IndexError::SortOrder { prev_pos, pos, ref_id, .. } => {
            assert_eq!((prev_pos, pos, ref_id), (900, 700, 0));
        }
        other => panic!("expected a sort order error, got {other}"),
    }
}

#[test]
fn test_placed_record_after_unplaced() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("unplaced_first.bam");
    BamFileBuilder::new(REFERENCES)
        .record(unmapped_record(-1, -1, b"u"))
        .record(mapped_record(1, 10, 50, b"m"))
        .write(&bam)
        .unwrap();
    let err = index(&bam, &IndexerConfig::new()).unwrap_err();
    assert!(matches!(err, IndexError::SortOrder { prev_ref_id: -1, ref_id: 1, .. }), "{err}");
}

#[test]
fn test_invalid_record_stops_indexing() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("invalid.bam");
    let offsets = BamFileBuilder::new(REFERENCES)
        .record(mapped_record(0, 100, 50, b"ok"))
        .record(make_bam_bytes(0, 200, 0, b"bad", &[encode_op(9, 10)], 10, -1, -1, &[]))
        .write(&bam)
        .unwrap();
    let err = index(&bam, &IndexerConfig::new()).unwrap_err();
    match err {
        IndexError::InvalidRecord { verdict, record_number, ref_id, pos, voffset } => {
            assert_eq!(verdict, RecordVerdict::UnknownCigarOperator);
            assert_eq!(record_number, 2);
            assert_eq!((ref_id, pos), (0, 200));
            assert_eq!(u64::from(voffset), offsets[1].start);
        }
        other => panic!("expected an invalid record error, got {other}"),
    }
}

#[test]
fn test_reference_missing_from_header() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("unknown_ref.bam");
    BamFileBuilder::new(&[("chr1", 1000)])
        .record(mapped_record(3, 100, 50, b"r"))
        .write(&bam)
        .unwrap();
    let err = index(&bam, &IndexerConfig::new()).unwrap_err();
    assert!(
        matches!(err, IndexError::InvalidRecord { verdict: RecordVerdict::InvalidReferenceId, .. }),
        "{err}"
    );
}

#[test]
fn test_truncated_record() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("truncated.bam");
    BamFileBuilder::new(REFERENCES)
        .record(mapped_record(0, 100, 50, b"r"))
        .trailing_bytes(&[64, 0, 0, 0, 1, 2])
        .write(&bam)
        .unwrap();
    let err = index(&bam, &IndexerConfig::new()).unwrap_err();
    assert!(matches!(err, IndexError::Truncated { pending: 6, .. }), "{err}");
}

#[test]
fn test_not_a_bam() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.txt");
    fs::write(&path, b"this is not bgzf").unwrap();
    let err = index(&path, &IndexerConfig::new()).unwrap_err();
    assert!(matches!(err, IndexError::Bgzf { block_id: 0, coffset: 0, .. }), "{err}");
}

#[test]
fn test_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.bam");
    fs::write(&path, b"").unwrap();
    let err = index(&path, &IndexerConfig::new()).unwrap_err();
    assert!(matches!(err, IndexError::Header { .. }), "{err}");
}

#[test]
fn test_missing_file() {
    let err = index(Path::new("/definitely/not/here.bam"), &IndexerConfig::new()).unwrap_err();
    assert!(matches!(err, IndexError::Io(_)), "{err}");
}
