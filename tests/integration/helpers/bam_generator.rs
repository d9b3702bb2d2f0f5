//! Writes small BGZF-compressed BAM files with controlled block boundaries.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use noodles::bgzf;

/// A record's placement in the written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOffsets {
    /// Virtual offset of the record's length prefix.
    pub start: u64,
    /// Virtual offset just past the record's last byte.
    pub end: u64,
}

/// Builds a BAM file from raw record bytes.
///
/// The decompressed stream is cut into blocks of `block_bytes`, so records
/// and the header can be made to straddle block boundaries.
#[derive(Debug, Clone)]
pub struct BamFileBuilder {
    references: Vec<(String, u32)>,
    text: Vec<u8>,
    records: Vec<Vec<u8>>,
    block_bytes: usize,
    trailing: Vec<u8>,
}

impl BamFileBuilder {
    pub fn new(references: &[(&str, u32)]) -> Self {
        Self {
            references: references.iter().map(|(n, l)| ((*n).to_string(), *l)).collect(),
            text: b"@HD\tVN:1.6\tSO:coordinate\n".to_vec(),
            records: Vec::new(),
            block_bytes: 4096,
            trailing: Vec::new(),
        }
    }

    pub fn block_bytes(mut self, block_bytes: usize) -> Self {
        assert!(block_bytes > 0 && block_bytes < 60_000);
        self.block_bytes = block_bytes;
        self
    }

    pub fn record(mut self, record: Vec<u8>) -> Self {
        self.records.push(record);
        self
    }

    pub fn records(mut self, records: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.records.extend(records);
        self
    }

    /// Raw bytes appended after the last record, e.g. a partial record.
    pub fn trailing_bytes(mut self, bytes: &[u8]) -> Self {
        self.trailing = bytes.to_vec();
        self
    }

    fn header_bytes(&self) -> Vec<u8> {
        let mut buf = b"BAM\x01".to_vec();
        buf.extend_from_slice(&(self.text.len() as i32).to_le_bytes());
        buf.extend_from_slice(&self.text);
        buf.extend_from_slice(&(self.references.len() as i32).to_le_bytes());
        for (name, length) in &self.references {
            buf.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
            buf.extend_from_slice(&length.to_le_bytes());
        }
        buf
    }

    /// Write the file and return each record's virtual offsets.
    pub fn write(&self, path: &Path) -> io::Result<Vec<RecordOffsets>> {
        let mut stream = self.header_bytes();
        let mut spans = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let start = stream.len();
            stream.extend_from_slice(&(record.len() as u32).to_le_bytes());
            stream.extend_from_slice(record);
            spans.push((start, stream.len()));
        }
        stream.extend_from_slice(&self.trailing);

        let mut writer = bgzf::Writer::new(File::create(path)?);
        let mut block_starts = Vec::new();
        for chunk in stream.chunks(self.block_bytes) {
            block_starts.push(u64::from(writer.virtual_position()) >> 16);
            writer.write_all(chunk)?;
            writer.flush()?;
        }
        block_starts.push(u64::from(writer.virtual_position()) >> 16);
        writer.finish()?;

        let voffset = |position: usize| {
            let block = position / self.block_bytes;
            let within = position % self.block_bytes;
            (block_starts[block] << 16) | within as u64
        };
        Ok(spans.into_iter().map(|(s, e)| RecordOffsets { start: voffset(s), end: voffset(e) }).collect())
    }
}
