//! End-to-end index construction.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use bamidx_lib::index::{Index, IndexerConfig, VirtualOffset};
use bamidx_lib::pipeline::{IndexReport, index_bam};
use noodles::csi::BinningIndex;
use noodles::csi::binning_index::ReferenceSequence as _;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{BamFileBuilder, REFERENCES, RecordOffsets, sorted_records};

fn build_index(bam: &Path, bai: &Path, config: &IndexerConfig) -> IndexReport {
    let mut out = BufWriter::new(File::create(bai).unwrap());
    let report = index_bam(bam, &mut out, config).unwrap();
    drop(out);
    report
}

fn write_sorted_bam(dir: &Path, block_bytes: usize) -> (std::path::PathBuf, Vec<RecordOffsets>) {
    let bam = dir.join("sorted.bam");
    let offsets = BamFileBuilder::new(REFERENCES)
        .block_bytes(block_bytes)
        .records(sorted_records())
        .write(&bam)
        .unwrap();
    (bam, offsets)
}

fn v(raw: u64) -> VirtualOffset {
    VirtualOffset::from_raw(raw)
}

#[test]
fn test_index_records_match_file_offsets() {
    let dir = TempDir::new().unwrap();
    let (bam, offsets) = write_sorted_bam(dir.path(), 300);
    let bai = dir.path().join("sorted.bam.bai");
    let report = build_index(&bam, &bai, &IndexerConfig::new());

    assert_eq!(report.records, 66);
    assert_eq!(report.summary.references, 3);
    assert_eq!(report.summary.references_with_data, 2);
    assert_eq!(report.summary.mapped, 60);
    assert_eq!(report.summary.unmapped, 1);
    assert_eq!(report.summary.unplaced_unmapped, Some(5));

    let index = Index::from_path(&bai).unwrap();
    assert_eq!(index.references().len(), 3);

    let chr1 = index.reference(0).unwrap();
    let meta = chr1.metadata.unwrap();
    assert_eq!(meta.start, v(offsets[0].start));
    assert_eq!(meta.end, v(offsets[40].end));
    assert_eq!((meta.mapped, meta.unmapped), (40, 1));
    // Reads end at 58,600, so windows 0 through 3.
    assert_eq!(chr1.intervals.len(), 4);
    assert_eq!(chr1.intervals[0], v(offsets[0].start));
    // First read reaching 16,384 starts at 16,500.
    assert_eq!(chr1.intervals[1], v(offsets[11].start));

    let chr2 = index.reference(1).unwrap();
    let meta = chr2.metadata.unwrap();
    assert_eq!(meta.start, v(offsets[41].start));
    assert_eq!(meta.end, v(offsets[60].end));
    assert_eq!((meta.mapped, meta.unmapped), (20, 0));
    assert_eq!(chr2.intervals.len(), 24);
    assert_eq!(chr2.intervals[1], v(offsets[42].start));
    // No read touches window 2; it inherits window 1.
    assert_eq!(chr2.intervals[2], chr2.intervals[1]);

    let chr3 = index.reference(2).unwrap();
    assert!(chr3.metadata.is_none() && chr3.bins.is_empty() && chr3.intervals.is_empty());
    assert_eq!(index.unplaced_unmapped(), Some(5));
}

#[test]
fn test_query_finds_overlapping_reads() {
    let dir = TempDir::new().unwrap();
    let (bam, offsets) = write_sorted_bam(dir.path(), 500);
    let bai = dir.path().join("sorted.bam.bai");
    build_index(&bam, &bai, &IndexerConfig::new());
    let index = Index::from_path(&bai).unwrap();

    let covers = |chunks: &[bamidx_lib::index::Chunk], record: RecordOffsets| {
        chunks.iter().any(|c| c.start <= v(record.start) && v(record.end) <= c.end)
    };

    // r1_010 covers 15,000..15,100.
    let chunks = index.query(0, 15_050, 15_060);
    assert!(covers(&chunks, offsets[10]));
    // r2_005 covers 110,000..110,250.
    let chunks = index.query(1, 110_100, 110_200);
    assert!(covers(&chunks, offsets[46]));
    assert!(index.query(2, 0, 1000).is_empty());
}

#[rstest]
#[case::parallel(IndexerConfig::new().threads(4))]
#[case::tiny_pool(IndexerConfig::new().threads(3).buffer_pool_size(1).batch_blocks(2))]
#[case::many_spills(IndexerConfig::new().spill_capacity(3).merge_fan_in(2))]
#[case::everything(IndexerConfig::new().threads(2).buffer_pool_size(3).spill_capacity(2).merge_fan_in(3))]
fn test_output_independent_of_tuning(#[case] config: IndexerConfig) {
    let dir = TempDir::new().unwrap();
    let (bam, _) = write_sorted_bam(dir.path(), 211);
    let reference = dir.path().join("reference.bai");
    let tuned = dir.path().join("tuned.bai");
    build_index(&bam, &reference, &IndexerConfig::new());
    build_index(&bam, &tuned, &config);
    assert_eq!(fs::read(&reference).unwrap(), fs::read(&tuned).unwrap());
}

#[rstest]
#[case(64)]
#[case(1000)]
#[case(50_000)]
fn test_summary_independent_of_block_layout(#[case] block_bytes: usize) {
    let dir = TempDir::new().unwrap();
    let (bam, _) = write_sorted_bam(dir.path(), block_bytes);
    let report = build_index(&bam, &dir.path().join("out.bai"), &IndexerConfig::new().threads(2));
    assert_eq!(report.records, 66);
    assert_eq!(report.summary.mapped, 60);
    assert_eq!(report.summary.unmapped, 1);
    assert_eq!(report.summary.unplaced_unmapped, Some(5));
}

#[test]
fn test_index_readable_by_noodles() {
    let dir = TempDir::new().unwrap();
    let (bam, offsets) = write_sorted_bam(dir.path(), 400);
    let bai = dir.path().join("sorted.bam.bai");
    build_index(&bam, &bai, &IndexerConfig::new());

    let index = noodles::bam::bai::fs::read(&bai).unwrap();
    let references = index.reference_sequences();
    assert_eq!(references.len(), 3);

    let meta = references[0].metadata().unwrap();
    assert_eq!(meta.mapped_record_count(), 40);
    assert_eq!(meta.unmapped_record_count(), 1);
    assert_eq!(u64::from(meta.start_position()), offsets[0].start);
    assert_eq!(u64::from(meta.end_position()), offsets[40].end);

    let meta = references[1].metadata().unwrap();
    assert_eq!(meta.mapped_record_count(), 20);
    assert!(references[2].metadata().is_none());
    assert_eq!(index.unplaced_unmapped_record_count(), Some(5));
}

#[test]
fn test_no_unplaced_reads_omits_trailing_count() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("placed.bam");
    let records: Vec<_> = sorted_records().into_iter().take(61).collect();
    BamFileBuilder::new(REFERENCES).records(records).write(&bam).unwrap();
    let bai = dir.path().join("placed.bai");
    let report = build_index(&bam, &bai, &IndexerConfig::new());
    assert_eq!(report.summary.unplaced_unmapped, None);
    assert_eq!(Index::from_path(&bai).unwrap().unplaced_unmapped(), None);
}

#[test]
fn test_header_only_bam() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("empty.bam");
    BamFileBuilder::new(REFERENCES).write(&bam).unwrap();
    let bai = dir.path().join("empty.bai");
    let report = build_index(&bam, &bai, &IndexerConfig::new());
    assert_eq!(report.records, 0);
    let index = Index::from_path(&bai).unwrap();
    assert_eq!(index.references().len(), 3);
    assert!(index.references().iter().all(|r| r.bins.is_empty() && r.metadata.is_none()));
}

#[test]
fn test_spill_directory_is_removed() {
    let dir = TempDir::new().unwrap();
    let (bam, _) = write_sorted_bam(dir.path(), 300);
    let spill_root = dir.path().join("spill");
    fs::create_dir(&spill_root).unwrap();
    let config = IndexerConfig::new().temp_dir(&spill_root).spill_capacity(4);
    build_index(&bam, &dir.path().join("out.bai"), &config);
    assert_eq!(fs::read_dir(&spill_root).unwrap().count(), 0);
}
