//! The `bamidx` binary end to end.

use std::path::PathBuf;
use std::process::{Command, Output};

use bamidx_record::testutil::{encode_op, make_bam_bytes, mapped_record};
use tempfile::TempDir;

use crate::helpers::{BamFileBuilder, REFERENCES, sorted_records};

fn bamidx(args: &[&str]) -> Output {
    Command::new(PathBuf::from(env!("CARGO_BIN_EXE_bamidx")))
        .args(args)
        .output()
        .expect("failed to run bamidx")
}

#[test]
fn test_index_then_idxstats() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("sorted.bam");
    BamFileBuilder::new(REFERENCES).block_bytes(256).records(sorted_records()).write(&bam).unwrap();
    let bam_arg = bam.to_str().unwrap();

    let output = bamidx(&["index", "-i", bam_arg, "--threads", "2", "--spill-records", "5"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(dir.path().join("sorted.bam.bai").exists());

    let output = bamidx(&["idxstats", "-i", bam_arg]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "chr1\t100000\t40\t1\nchr2\t500000\t20\t0\nchr3\t1000\t0\t0\n*\t0\t0\t5\n"
    );
}

#[test]
fn test_index_explicit_output() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("in.bam");
    let bai = dir.path().join("custom.bai");
    BamFileBuilder::new(REFERENCES).records(sorted_records()).write(&bam).unwrap();
    let output = bamidx(&["index", "-i", bam.to_str().unwrap(), "-o", bai.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(bai.exists());
    assert!(!dir.path().join("in.bam.bai").exists());
}

#[test]
fn test_failed_index_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("unsorted.bam");
    BamFileBuilder::new(REFERENCES)
        .record(mapped_record(0, 900, 50, b"b"))
        .record(mapped_record(0, 100, 50, b"a"))
        .write(&bam)
        .unwrap();
    let output = bamidx(&["index", "-i", bam.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not coordinate sorted"));
    assert!(!dir.path().join("unsorted.bam.bai").exists());
}

#[test]
fn test_validate_exit_status() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.bam");
    BamFileBuilder::new(REFERENCES).records(sorted_records()).write(&good).unwrap();
    assert!(bamidx(&["validate", "-i", good.to_str().unwrap()]).status.success());

    let bad = dir.path().join("bad.bam");
    BamFileBuilder::new(REFERENCES)
        .record(mapped_record(0, 100, 50, b"ok"))
        .record(make_bam_bytes(0, 200, 0, b"bad", &[encode_op(9, 10)], 10, -1, -1, &[]))
        .write(&bad)
        .unwrap();
    let output = bamidx(&["validate", "-i", bad.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 records"));
}

#[test]
fn test_missing_input() {
    let output = bamidx(&["index", "-i", "/no/such/input.bam"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}

#[test]
fn test_bad_fan_in_rejected() {
    let dir = TempDir::new().unwrap();
    let bam = dir.path().join("in.bam");
    BamFileBuilder::new(REFERENCES).write(&bam).unwrap();
    let output = bamidx(&["index", "-i", bam.to_str().unwrap(), "--merge-fan-in", "1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--merge-fan-in"));
}
