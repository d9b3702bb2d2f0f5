//! CIGAR operation helpers.
//!
//! Each operation is stored as a little-endian `u32`: the low 4 bits hold the
//! operator code and the high 28 bits the length.

use crate::fields::{cigar_offset, n_cigar_op};

/// Alignment match (can be a sequence match or mismatch).
pub const CIGAR_MATCH: u32 = 0;
/// Insertion to the reference.
pub const CIGAR_INS: u32 = 1;
/// Deletion from the reference.
pub const CIGAR_DEL: u32 = 2;
/// Skipped region from the reference.
pub const CIGAR_REF_SKIP: u32 = 3;
/// Soft clip.
pub const CIGAR_SOFT_CLIP: u32 = 4;
/// Hard clip.
pub const CIGAR_HARD_CLIP: u32 = 5;
/// Padding.
pub const CIGAR_PAD: u32 = 6;
/// Sequence match.
pub const CIGAR_EQUAL: u32 = 7;
/// Sequence mismatch.
pub const CIGAR_DIFF: u32 = 8;

/// Highest defined operator code.
pub const MAX_CIGAR_OP: u32 = CIGAR_DIFF;

/// Largest operation length representable in 28 bits.
pub const MAX_CIGAR_OP_LEN: u32 = (1 << 28) - 1;

/// Operator codes rendered as SAM characters.
pub const CIGAR_OP_CHARS: [u8; 9] = *b"MIDNSHP=X";

/// Pack an operator and length into a raw CIGAR op.
///
/// # Panics
///
/// Panics if `op` is not a defined operator or `len` does not fit in 28 bits.
#[inline]
#[must_use]
pub fn pack_cigar_op(op: u32, len: u32) -> u32 {
    assert!(op <= MAX_CIGAR_OP, "unknown CIGAR operator {op}");
    assert!(len <= MAX_CIGAR_OP_LEN, "CIGAR operation length {len} exceeds 28 bits");
    (len << 4) | op
}

/// Operator code of a raw CIGAR op.
#[inline]
#[must_use]
pub fn cigar_op_type(op: u32) -> u32 {
    op & 0xF
}

/// Length of a raw CIGAR op.
#[inline]
#[must_use]
pub fn cigar_op_len(op: u32) -> u32 {
    op >> 4
}

/// True when the operator advances along the reference (M, D, N, =, X).
#[inline]
#[must_use]
pub fn consumes_reference(op_type: u32) -> bool {
    matches!(op_type, CIGAR_MATCH | CIGAR_DEL | CIGAR_REF_SKIP | CIGAR_EQUAL | CIGAR_DIFF)
}

/// True when the operator advances along the read (M, I, S, =, X).
#[inline]
#[must_use]
pub fn consumes_query(op_type: u32) -> bool {
    matches!(op_type, CIGAR_MATCH | CIGAR_INS | CIGAR_SOFT_CLIP | CIGAR_EQUAL | CIGAR_DIFF)
}

/// Read the raw op at a byte offset.
#[inline]
fn cigar_op_at(bam: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bam[offset], bam[offset + 1], bam[offset + 2], bam[offset + 3]])
}

/// Iterate the raw CIGAR ops of a record without allocating.
///
/// Yields nothing if the CIGAR would run past the end of the record.
pub fn cigar_ops(bam: &[u8]) -> impl Iterator<Item = u32> + '_ {
    let start = cigar_offset(bam);
    let end = start + n_cigar_op(bam) as usize * 4;
    let bytes = bam.get(start..end).unwrap_or(&[]);
    bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
}

/// Collect the CIGAR ops of a record.
#[must_use]
pub fn get_cigar_ops(bam: &[u8]) -> Vec<u32> {
    cigar_ops(bam).collect()
}

/// Reference span of a list of ops (sum of M/D/N/=/X lengths).
#[inline]
#[must_use]
pub fn reference_length_from_cigar(ops: &[u32]) -> u64 {
    ops.iter()
        .filter(|&&op| consumes_reference(cigar_op_type(op)))
        .map(|&op| u64::from(cigar_op_len(op)))
        .sum()
}

/// Read length implied by a list of ops (sum of M/I/S/=/X lengths).
#[inline]
#[must_use]
pub fn query_length_from_cigar(ops: &[u32]) -> u64 {
    ops.iter()
        .filter(|&&op| consumes_query(cigar_op_type(op)))
        .map(|&op| u64::from(cigar_op_len(op)))
        .sum()
}

/// Reference span computed straight from the record bytes.
#[inline]
#[must_use]
pub fn reference_length_from_raw_bam(bam: &[u8]) -> u64 {
    let n = n_cigar_op(bam) as usize;
    let start = cigar_offset(bam);
    if start + n * 4 > bam.len() {
        return 0;
    }
    (0..n)
        .map(|i| cigar_op_at(bam, start + i * 4))
        .filter(|&op| consumes_reference(cigar_op_type(op)))
        .map(|op| u64::from(cigar_op_len(op)))
        .sum()
}

/// Render ops as a SAM CIGAR string (`*` when empty).
#[must_use]
pub fn cigar_to_string(ops: &[u32]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    let mut out = String::with_capacity(ops.len() * 4);
    for &op in ops {
        let ty = cigar_op_type(op) as usize;
        let ch = CIGAR_OP_CHARS.get(ty).copied().unwrap_or(b'?');
        out.push_str(&cigar_op_len(op).to_string());
        out.push(ch as char);
    }
    out
}
