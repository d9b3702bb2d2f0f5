//! Fixed-size entries emitted by the bin accumulator.
//!
//! Each kind is spilled to its own fragment file and merged back in its
//! natural order: reference id (with -1 last), then bin or window, then file
//! order of the records that produced it.

use std::cmp::Ordering;
use std::io::{self, Read, Write};

use super::VirtualOffset;

/// A record type that can be spilled to and merged from fragment files.
///
/// Implementations serialise to exactly `SERIALIZED_SIZE` bytes, so fragment
/// boundaries are always a whole number of records.
pub trait SpillRecord: Ord + Copy + Send + Sync + Sized {
    /// Fixed byte size when serialized.
    const SERIALIZED_SIZE: usize;

    /// Short name used in temp file names and logs.
    const KIND: &'static str;

    /// Serialize to a writer.
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Deserialize from a reader. Must be the inverse of `write_to`.
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self>;
}

#[inline]
fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

#[inline]
fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[inline]
fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reference id ordering key: -1 (no reference) sorts after every real one.
#[inline]
fn ref_key(ref_id: i32) -> u32 {
    ref_id as u32
}

// ============================================================================
// BinChunk
// ============================================================================

/// A closed run of consecutive records sharing one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinChunk {
    pub ref_id: i32,
    pub bin: u32,
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

impl Ord for BinChunk {
    fn cmp(&self, other: &Self) -> Ordering {
        (ref_key(self.ref_id), self.bin, self.start, self.end).cmp(&(
            ref_key(other.ref_id),
            other.bin,
            other.start,
            other.end,
        ))
    }
}

impl PartialOrd for BinChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SpillRecord for BinChunk {
    const SERIALIZED_SIZE: usize = 24;
    const KIND: &'static str = "bins";

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.ref_id.to_le_bytes())?;
        writer.write_all(&self.bin.to_le_bytes())?;
        writer.write_all(&self.start.as_raw().to_le_bytes())?;
        writer.write_all(&self.end.as_raw().to_le_bytes())
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            ref_id: read_i32(reader)?,
            bin: read_u32(reader)?,
            start: VirtualOffset::from_raw(read_u64(reader)?),
            end: VirtualOffset::from_raw(read_u64(reader)?),
        })
    }
}

// ============================================================================
// LinearChunk
// ============================================================================

/// First record entering a 16 KiB window of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearChunk {
    pub ref_id: i32,
    /// Window id (`position >> 14`).
    pub window: u32,
    /// Alignment start of the record that entered the window.
    pub pos: i32,
    /// Start of that record.
    pub voffset: VirtualOffset,
}

impl Ord for LinearChunk {
    fn cmp(&self, other: &Self) -> Ordering {
        (ref_key(self.ref_id), self.window, self.voffset, self.pos).cmp(&(
            ref_key(other.ref_id),
            other.window,
            other.voffset,
            other.pos,
        ))
    }
}

impl PartialOrd for LinearChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SpillRecord for LinearChunk {
    const SERIALIZED_SIZE: usize = 20;
    const KIND: &'static str = "linear";

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.ref_id.to_le_bytes())?;
        writer.write_all(&self.window.to_le_bytes())?;
        writer.write_all(&self.pos.to_le_bytes())?;
        writer.write_all(&self.voffset.as_raw().to_le_bytes())
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            ref_id: read_i32(reader)?,
            window: read_u32(reader)?,
            pos: read_i32(reader)?,
            voffset: VirtualOffset::from_raw(read_u64(reader)?),
        })
    }
}

// ============================================================================
// MetaInfo
// ============================================================================

/// Per-reference span and record counts. The entry for reference -1 carries
/// the number of unplaced unmapped records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaInfo {
    pub ref_id: i32,
    /// Start of the reference's first record.
    pub start: VirtualOffset,
    /// End of the reference's last record.
    pub end: VirtualOffset,
    pub mapped: u64,
    pub unmapped: u64,
}

impl Ord for MetaInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        (ref_key(self.ref_id), self.start, self.end, self.mapped, self.unmapped).cmp(&(
            ref_key(other.ref_id),
            other.start,
            other.end,
            other.mapped,
            other.unmapped,
        ))
    }
}

impl PartialOrd for MetaInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SpillRecord for MetaInfo {
    const SERIALIZED_SIZE: usize = 36;
    const KIND: &'static str = "meta";

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.ref_id.to_le_bytes())?;
        writer.write_all(&self.start.as_raw().to_le_bytes())?;
        writer.write_all(&self.end.as_raw().to_le_bytes())?;
        writer.write_all(&self.mapped.to_le_bytes())?;
        writer.write_all(&self.unmapped.to_le_bytes())
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            ref_id: read_i32(reader)?,
            start: VirtualOffset::from_raw(read_u64(reader)?),
            end: VirtualOffset::from_raw(read_u64(reader)?),
            mapped: read_u64(reader)?,
            unmapped: read_u64(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn serialized_len<T: SpillRecord>(value: &T) -> usize {
        let mut buf = Vec::new();
        value.write_to(&mut buf).unwrap();
        buf.len()
    }

    #[test]
    fn test_serialized_sizes_match_constants() {
        let v = VirtualOffset::new(1, 2);
        let bin = BinChunk { ref_id: 0, bin: 4681, start: v, end: v };
        let lin = LinearChunk { ref_id: 0, window: 3, pos: 50_000, voffset: v };
        let meta = MetaInfo { ref_id: -1, start: v, end: v, mapped: 0, unmapped: 9 };
        assert_eq!(serialized_len(&bin), BinChunk::SERIALIZED_SIZE);
        assert_eq!(serialized_len(&lin), LinearChunk::SERIALIZED_SIZE);
        assert_eq!(serialized_len(&meta), MetaInfo::SERIALIZED_SIZE);
    }

    #[test]
    fn test_read_back_meta() {
        let meta = MetaInfo {
            ref_id: 7,
            start: VirtualOffset::new(100, 3),
            end: VirtualOffset::new(900, 0),
            mapped: 12,
            unmapped: 1,
        };
        let mut buf = Vec::new();
        meta.write_to(&mut buf).unwrap();
        assert_eq!(MetaInfo::read_from(&mut Cursor::new(buf)).unwrap(), meta);
    }

    #[test]
    fn test_unplaced_reference_sorts_last() {
        let v = VirtualOffset::new(0, 0);
        let mut metas = vec![
            MetaInfo { ref_id: -1, start: v, end: v, mapped: 0, unmapped: 4 },
            MetaInfo { ref_id: 2, start: v, end: v, mapped: 1, unmapped: 0 },
            MetaInfo { ref_id: 0, start: v, end: v, mapped: 1, unmapped: 0 },
        ];
        metas.sort();
        let ids: Vec<_> = metas.iter().map(|m| m.ref_id).collect();
        assert_eq!(ids, vec![0, 2, -1]);
    }

    #[test]
    fn test_bin_chunks_order_by_bin_then_offset() {
        let a = BinChunk {
            ref_id: 0,
            bin: 4681,
            start: VirtualOffset::new(5, 0),
            end: VirtualOffset::new(6, 0),
        };
        let b = BinChunk { bin: 4681, start: VirtualOffset::new(1, 0), ..a };
        let c = BinChunk { bin: 585, start: VirtualOffset::new(9, 0), ..a };
        let mut v = vec![a, b, c];
        v.sort();
        assert_eq!(v, vec![c, b, a]);
    }
}
