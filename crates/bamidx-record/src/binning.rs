//! The 5-level nested bin scheme used by BAI indexes.
//!
//! Level 0 is one bin covering 512 Mbp; each level below splits its parent
//! into eight, down to 16 kbp bins at level 5 (ids 4681..=37448). Positions
//! are limited to `2^29`.

/// Largest coordinate the scheme can address (exclusive).
pub const MAX_COORDINATE: i64 = 1 << 29;

/// Bin assigned to records that have no alignment span.
pub const UNMAPPED_BIN: u16 = 4680;

/// Id of the pseudo-bin holding per-reference metadata.
pub const META_BIN: u32 = 37450;

/// Number of real bins (0..=37448), used to size lookups.
pub const MAX_BIN: u32 = 37449;

/// log2 of the linear index window size (16 KiB).
pub const LINEAR_WINDOW_SHIFT: u32 = 14;

/// Linear index window id of a 0-based position.
#[inline]
#[must_use]
pub fn linear_window(pos: i64) -> u64 {
    (pos.max(0) >> LINEAR_WINDOW_SHIFT) as u64
}

/// Smallest bin containing the 0-based half-open interval `[beg, end)`.
#[inline]
#[must_use]
pub fn reg2bin(beg: i64, end: i64) -> u32 {
    let end = end - 1;
    if beg >> 14 == end >> 14 {
        return (((1 << 15) - 1) / 7 + (beg >> 14)) as u32;
    }
    if beg >> 17 == end >> 17 {
        return (((1 << 12) - 1) / 7 + (beg >> 17)) as u32;
    }
    if beg >> 20 == end >> 20 {
        return (((1 << 9) - 1) / 7 + (beg >> 20)) as u32;
    }
    if beg >> 23 == end >> 23 {
        return (((1 << 6) - 1) / 7 + (beg >> 23)) as u32;
    }
    if beg >> 26 == end >> 26 {
        return (((1 << 3) - 1) / 7 + (beg >> 26)) as u32;
    }
    0
}

/// All bins that may hold records overlapping `[beg, end)`.
#[must_use]
pub fn region_to_bins(beg: i64, end: i64) -> Vec<u32> {
    let beg = beg.clamp(0, MAX_COORDINATE - 1);
    let end = (end - 1).clamp(beg, MAX_COORDINATE - 1);
    let mut bins = vec![0];
    for (offset, shift) in [(1, 26), (9, 23), (73, 20), (585, 17), (4681, 14)] {
        let first = offset + (beg >> shift);
        let last = offset + (end >> shift);
        bins.extend((first..=last).map(|b| b as u32));
    }
    bins
}

/// Bin of an alignment starting at `pos` spanning `reference_length` bases.
///
/// A zero-length span is treated as one base.
#[inline]
#[must_use]
pub fn alignment_bin(pos: i32, reference_length: u64) -> u32 {
    let beg = i64::from(pos);
    let span = i64::try_from(reference_length.max(1)).unwrap_or(MAX_COORDINATE);
    reg2bin(beg, beg + span)
}
