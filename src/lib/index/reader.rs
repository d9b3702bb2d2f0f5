//! Reading BAI files and querying them by region.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bamidx_record::{LINEAR_WINDOW_SHIFT, META_BIN, region_to_bins};

use super::VirtualOffset;
use super::writer::BAI_MAGIC;
use crate::errors::Result;

/// A `[start, end)` range of virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub id: u32,
    pub chunks: Vec<Chunk>,
}

/// Contents of the meta pseudo-bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceMetadata {
    /// Start of the reference's first record.
    pub start: VirtualOffset,
    /// End of the reference's last record.
    pub end: VirtualOffset,
    pub mapped: u64,
    pub unmapped: u64,
}

/// Bins, metadata and linear index of one reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    pub bins: Vec<Bin>,
    pub metadata: Option<ReferenceMetadata>,
    pub intervals: Vec<VirtualOffset>,
}

impl ReferenceIndex {
    /// Smallest offset at which a record overlapping `start` can begin.
    #[must_use]
    pub fn min_offset(&self, start: i32) -> Option<VirtualOffset> {
        let window = (start.max(0) as usize) >> LINEAR_WINDOW_SHIFT;
        self.intervals.get(window).or_else(|| self.intervals.last()).copied()
    }
}

/// A parsed BAI file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    references: Vec<ReferenceIndex>,
    unplaced_unmapped: Option<u64>,
}

impl Index {
    /// Read an index file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::read_from(&mut BufReader::new(File::open(path)?))
    }

    /// Parse an index.
    ///
    /// # Errors
    ///
    /// Returns an error on a bad magic number, a negative count, a short
    /// read, or trailing bytes that are not a single 8-byte count.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != BAI_MAGIC {
            return Err(invalid(format!("bad BAI magic number {magic:02x?}")).into());
        }
        let n_ref = read_count(reader, "n_ref")?;
        let references = (0..n_ref).map(|_| read_reference(reader)).collect::<io::Result<_>>()?;

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        let unplaced_unmapped = match rest.len() {
            0 => None,
            8 => Some(u64::from_le_bytes(rest.try_into().unwrap_or_default())),
            n => return Err(invalid(format!("{n} unexpected trailing byte(s)")).into()),
        };
        Ok(Self { references, unplaced_unmapped })
    }

    #[must_use]
    pub fn references(&self) -> &[ReferenceIndex] {
        &self.references
    }

    #[must_use]
    pub fn reference(&self, ref_id: usize) -> Option<&ReferenceIndex> {
        self.references.get(ref_id)
    }

    /// Records with no reference, if the index records them.
    #[must_use]
    pub fn unplaced_unmapped(&self) -> Option<u64> {
        self.unplaced_unmapped
    }

    /// Chunks that may hold records overlapping `[start, end)` on `ref_id`,
    /// sorted, with overlapping chunks merged. Empty for an unknown
    /// reference.
    #[must_use]
    pub fn query(&self, ref_id: usize, start: i32, end: i32) -> Vec<Chunk> {
        let Some(reference) = self.references.get(ref_id) else {
            return Vec::new();
        };
        let wanted = region_to_bins(i64::from(start), i64::from(end));
        let mut chunks: Vec<Chunk> = reference
            .bins
            .iter()
            .filter(|bin| wanted.contains(&bin.id))
            .flat_map(|bin| bin.chunks.iter().copied())
            .collect();
        if let Some(min_offset) = reference.min_offset(start) {
            chunks.retain(|chunk| chunk.end > min_offset);
        }
        merge_chunks(chunks)
    }
}

fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_unstable();
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.start <= last.end => last.end = last.end.max(chunk.end),
            _ => merged.push(chunk),
        }
    }
    merged
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> io::Result<usize> {
    let value = read_u32(reader)? as i32;
    usize::try_from(value).map_err(|_| invalid(format!("negative {what}: {value}")))
}

fn read_voffset<R: Read>(reader: &mut R) -> io::Result<VirtualOffset> {
    read_u64(reader).map(VirtualOffset::from_raw)
}

fn read_reference<R: Read>(reader: &mut R) -> io::Result<ReferenceIndex> {
    let n_bin = read_count(reader, "n_bin")?;
    let mut index = ReferenceIndex::default();
    for _ in 0..n_bin {
        let id = read_u32(reader)?;
        let n_chunk = read_count(reader, "n_chunk")?;
        if id == META_BIN {
            if n_chunk != 2 {
                return Err(invalid(format!("meta bin has {n_chunk} chunks, expected 2")));
            }
            index.metadata = Some(ReferenceMetadata {
                start: read_voffset(reader)?,
                end: read_voffset(reader)?,
                mapped: read_u64(reader)?,
                unmapped: read_u64(reader)?,
            });
            continue;
        }
        let chunks = (0..n_chunk)
            .map(|_| Ok(Chunk { start: read_voffset(reader)?, end: read_voffset(reader)? }))
            .collect::<io::Result<_>>()?;
        index.bins.push(Bin { id, chunks });
    }
    let n_intv = read_count(reader, "n_intv")?;
    index.intervals = (0..n_intv).map(|_| read_voffset(reader)).collect::<io::Result<_>>()?;
    Ok(index)
}
