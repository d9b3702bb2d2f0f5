//! Integration tests for bamidx building blocks.
//!
//! Run with: `cargo test --test integration_tests`
//!
//! These drive the public single-threaded API by hand (block reader, header
//! parser, builder) to check that the pieces compose the same way the
//! threaded pipeline uses them.

use std::io::{Cursor, Write};
use std::time::Duration;

use bamidx_lib::bgzf_reader::{BgzfBlockReader, decompress_into};
use bamidx_lib::header::{HeaderParser, HeaderStatus};
use bamidx_lib::index::{Index, IndexBuilder, IndexerConfig};
use bamidx_lib::logging::{format_count, format_duration, format_rate};
use bamidx_lib::reassembler::BlockSlice;
use bamidx_record::testutil::{frame_records, mapped_record};
use libdeflater::Decompressor;
use noodles::bgzf;

fn header_bytes(references: &[(&str, u32)]) -> Vec<u8> {
    let mut buf = b"BAM\x01".to_vec();
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&(references.len() as i32).to_le_bytes());
    for (name, length) in references {
        buf.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&length.to_le_bytes());
    }
    buf
}

fn compress(stream: &[u8], block_bytes: usize) -> Vec<u8> {
    let mut writer = bgzf::Writer::new(Vec::new());
    for chunk in stream.chunks(block_bytes) {
        writer.write_all(chunk).unwrap();
        writer.flush().unwrap();
    }
    writer.finish().unwrap()
}

#[test]
fn test_manual_pipeline_builds_queryable_index() {
    let records: Vec<Vec<u8>> =
        (0..30).map(|i| mapped_record(0, i * 1000, 80, format!("read{i}").as_bytes())).collect();
    let mut stream = header_bytes(&[("chrA", 50_000)]);
    stream.extend(frame_records(&records));
    let file = compress(&stream, 333);

    let mut reader = BgzfBlockReader::new(Cursor::new(file));
    let mut decompressor = Decompressor::new();
    let mut data = Vec::new();
    let mut parser = Some(HeaderParser::new());
    let mut builder = None;

    while let Some(block) = reader.read_block().unwrap() {
        decompress_into(&block, &mut decompressor, &mut data).unwrap();
        let mut offset = 0;
        if let Some(p) = parser.as_mut() {
            match p.feed(&data).unwrap() {
                HeaderStatus::NeedMore => continue,
                HeaderStatus::Complete { consumed } => {
                    offset = consumed;
                    let header = parser.take().unwrap().finish().unwrap();
                    builder = Some(IndexBuilder::new(header.references, &IndexerConfig::new()).unwrap());
                }
            }
        }
        let slice = BlockSlice::new(block.coffset, block.compressed_len(), &data).starting_at(offset);
        builder.as_mut().unwrap().feed(slice).unwrap();
    }

    let builder = builder.unwrap();
    assert_eq!(builder.records(), 30);
    let mut out = Vec::new();
    let summary = builder.finish(&mut out).unwrap();
    assert_eq!(summary.mapped, 30);

    let index = Index::read_from(&mut Cursor::new(out)).unwrap();
    let reference = index.reference(0).unwrap();
    assert_eq!(reference.metadata.unwrap().mapped, 30);
    assert!(!index.query(0, 5_000, 5_050).is_empty());
    assert!(index.query(0, 40_000, 41_000).is_empty());
}

#[test]
fn test_log_formatting() {
    assert_eq!(format_count(1_234_567), "1,234,567");
    assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    assert!(format_rate(100_000, Duration::from_secs(10)).contains("10,000 items/s"));
}
