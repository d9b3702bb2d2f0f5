//! Serialises merged index entries into a BAI file.
//!
//! The merged bin, linear and meta streams are each sorted by reference, so
//! the writer walks them in lock step one reference at a time and never holds
//! more than one reference's entries in memory.

use std::io::{self, Write};
use std::iter::Peekable;

use bamidx_record::META_BIN;

use super::entries::{BinChunk, LinearChunk, MetaInfo};
use super::VirtualOffset;
use crate::errors::{IndexError, Result};

/// BAI magic number.
pub const BAI_MAGIC: &[u8; 4] = b"BAI\x01";

/// Totals describing a written index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    /// References in the header.
    pub references: usize,
    /// References with at least one record.
    pub references_with_data: usize,
    /// Distinct bins written, meta pseudo-bins excluded.
    pub bins: u64,
    /// Chunks written across all bins, meta pseudo-bins excluded.
    pub chunks: u64,
    /// Linear index entries written.
    pub linear_entries: u64,
    /// Mapped records over all references.
    pub mapped: u64,
    /// Placed unmapped records over all references.
    pub unmapped: u64,
    /// Records with no reference, if any were seen.
    pub unplaced_unmapped: Option<u64>,
}

/// Writes the BAI layout for a header with `n_ref` references.
#[derive(Debug, Clone, Copy)]
pub struct IndexWriter {
    n_ref: usize,
}

impl IndexWriter {
    #[must_use]
    pub fn new(n_ref: usize) -> Self {
        Self { n_ref }
    }

    /// Check that the bin and linear streams name the same references in the
    /// same order and that every reference is in the header.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Inconsistent`] or
    /// [`IndexError::ReferenceOutOfRange`]; I/O errors from the streams are
    /// propagated.
    pub fn check_consistency<B, L>(&self, bins: B, linear: L) -> Result<()>
    where
        B: IntoIterator<Item = io::Result<BinChunk>>,
        L: IntoIterator<Item = io::Result<LinearChunk>>,
    {
        let bin_refs = distinct_refs(bins.into_iter().map(|r| r.map(|c| c.ref_id)))?;
        let linear_refs = distinct_refs(linear.into_iter().map(|r| r.map(|c| c.ref_id)))?;
        if bin_refs != linear_refs {
            return Err(IndexError::Inconsistent {
                reason: format!(
                    "bin stream covers references {bin_refs:?} but linear stream covers {linear_refs:?}"
                ),
            });
        }
        for &ref_id in &bin_refs {
            self.check_ref(ref_id)?;
        }
        Ok(())
    }

    fn check_ref(&self, ref_id: i32) -> Result<()> {
        if usize::try_from(ref_id).is_ok_and(|id| id < self.n_ref) {
            Ok(())
        } else {
            Err(IndexError::ReferenceOutOfRange { ref_id, n_ref: self.n_ref })
        }
    }

    /// Write the complete index.
    ///
    /// # Errors
    ///
    /// Returns an error if a stream names a reference outside the header, the
    /// streams are not sorted, or writing fails.
    pub fn write<W, B, L, M>(&self, out: &mut W, bins: B, linear: L, metas: M) -> Result<IndexSummary>
    where
        W: Write,
        B: IntoIterator<Item = io::Result<BinChunk>>,
        L: IntoIterator<Item = io::Result<LinearChunk>>,
        M: IntoIterator<Item = io::Result<MetaInfo>>,
    {
        let mut bins = bins.into_iter().peekable();
        let mut linear = linear.into_iter().peekable();
        let mut metas = metas.into_iter().peekable();
        let mut summary = IndexSummary { references: self.n_ref, ..IndexSummary::default() };

        out.write_all(BAI_MAGIC)?;
        write_u32(out, count_u32(self.n_ref)?)?;

        for ref_id in 0..self.n_ref {
            let ref_id = ref_id as i32;
            let groups = group_bins(take_ref(&mut bins, ref_id, |c| c.ref_id)?);
            let windows = take_ref(&mut linear, ref_id, |c| c.ref_id)?;
            let meta = take_ref(&mut metas, ref_id, |m| m.ref_id)?;
            if meta.len() > 1 {
                return Err(IndexError::Inconsistent {
                    reason: format!("reference {ref_id} has {} metadata entries", meta.len()),
                });
            }
            let meta = meta.first().copied();

            write_u32(out, count_u32(groups.len() + usize::from(meta.is_some()))?)?;
            for (bin, chunks) in &groups {
                write_u32(out, *bin)?;
                write_u32(out, count_u32(chunks.len())?)?;
                for (start, end) in chunks {
                    write_u64(out, start.as_raw())?;
                    write_u64(out, end.as_raw())?;
                }
                summary.bins += 1;
                summary.chunks += chunks.len() as u64;
            }
            if let Some(meta) = meta {
                write_u32(out, META_BIN)?;
                write_u32(out, 2)?;
                write_u64(out, meta.start.as_raw())?;
                write_u64(out, meta.end.as_raw())?;
                write_u64(out, meta.mapped)?;
                write_u64(out, meta.unmapped)?;
                summary.references_with_data += 1;
                summary.mapped += meta.mapped;
                summary.unmapped += meta.unmapped;
            }

            let offsets = linear_offsets(&windows);
            write_u32(out, count_u32(offsets.len())?)?;
            for offset in &offsets {
                write_u64(out, offset.as_raw())?;
            }
            summary.linear_entries += offsets.len() as u64;
        }

        // Only the unplaced pseudo-reference's metadata may remain.
        let leftover = [
            bins.next().transpose()?.map(|c| c.ref_id),
            linear.next().transpose()?.map(|c| c.ref_id),
        ];
        if let Some(ref_id) = leftover.into_iter().flatten().next() {
            self.check_ref(ref_id)?;
            return Err(IndexError::Inconsistent {
                reason: format!("entries for reference {ref_id} are out of order"),
            });
        }
        if let Some(meta) = metas.next().transpose()? {
            if meta.ref_id != -1 {
                return Err(IndexError::ReferenceOutOfRange { ref_id: meta.ref_id, n_ref: self.n_ref });
            }
            write_u64(out, meta.unmapped)?;
            summary.unplaced_unmapped = Some(meta.unmapped);
        }
        out.flush()?;
        Ok(summary)
    }
}

fn count_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| IndexError::Inconsistent { reason: format!("count {n} exceeds u32") })
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(out: &mut W, value: u64) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

/// Reference ids in stream order with consecutive duplicates removed.
fn distinct_refs<I: Iterator<Item = io::Result<i32>>>(ids: I) -> Result<Vec<i32>> {
    let mut refs: Vec<i32> = Vec::new();
    for id in ids {
        let id = id?;
        if refs.last() != Some(&id) {
            refs.push(id);
        }
    }
    Ok(refs)
}

/// Pull every leading entry for `ref_id` off a sorted stream.
fn take_ref<T, I, F>(stream: &mut Peekable<I>, ref_id: i32, key: F) -> Result<Vec<T>>
where
    I: Iterator<Item = io::Result<T>>,
    F: Fn(&T) -> i32,
{
    let mut taken = Vec::new();
    loop {
        match stream.peek() {
            Some(Ok(entry)) if key(entry) == ref_id => {}
            Some(Err(_)) => {
                if let Some(Err(e)) = stream.next() {
                    return Err(e.into());
                }
            }
            _ => return Ok(taken),
        }
        if let Some(Ok(entry)) = stream.next() {
            taken.push(entry);
        }
    }
}

/// Group a reference's chunks by bin, keeping each bin's chunks in order.
fn group_bins(chunks: Vec<BinChunk>) -> Vec<(u32, Vec<(VirtualOffset, VirtualOffset)>)> {
    let mut groups: Vec<(u32, Vec<(VirtualOffset, VirtualOffset)>)> = Vec::new();
    for chunk in chunks {
        match groups.last_mut() {
            Some((bin, list)) if *bin == chunk.bin => list.push((chunk.start, chunk.end)),
            _ => groups.push((chunk.bin, vec![(chunk.start, chunk.end)])),
        }
    }
    groups
}

/// Build the linear array: one offset per window up to the highest window
/// seen, using the earliest record entering each window and carrying the
/// previous value forward for windows no record entered.
fn linear_offsets(windows: &[LinearChunk]) -> Vec<VirtualOffset> {
    let Some(max) = windows.iter().map(|w| w.window).max() else {
        return Vec::new();
    };
    let mut direct: Vec<Option<VirtualOffset>> = vec![None; max as usize + 1];
    for w in windows {
        let slot = &mut direct[w.window as usize];
        *slot = Some(slot.map_or(w.voffset, |v| v.min(w.voffset)));
    }
    let mut previous = VirtualOffset::default();
    direct
        .into_iter()
        .map(|slot| {
            if let Some(v) = slot {
                previous = v;
            }
            previous
        })
        .collect()
}
