//! Packed 4-bit sequence encoding.
//!
//! Two bases per byte, high nibble first. Codes index `=ACMGRSVTWYHKDBN`.
//! Both lookup tables are `const` and built at compile time.

use crate::fields::{l_seq, seq_offset};

/// 4-bit code to ASCII base.
pub const BAM_BASE_TO_ASCII: [u8; 16] = *b"=ACMGRSVTWYHKDBN";

/// ASCII base to 4-bit code. Unknown characters map to `N` (15).
pub const ASCII_TO_BAM_BASE: [u8; 256] = build_seq_codes();

const fn build_seq_codes() -> [u8; 256] {
    let mut codes = [0x0F; 256];
    let mut i = 0;
    while i < BAM_BASE_TO_ASCII.len() {
        let base = BAM_BASE_TO_ASCII[i];
        codes[base as usize] = i as u8;
        codes[base.to_ascii_lowercase() as usize] = i as u8;
        i += 1;
    }
    codes
}

/// 4-bit code of the base at `position` within packed data starting at `seq_off`.
#[inline]
#[must_use]
pub fn get_base(bam: &[u8], seq_off: usize, position: usize) -> u8 {
    let byte = bam[seq_off + position / 2];
    if position.is_multiple_of(2) { byte >> 4 } else { byte & 0xF }
}

/// Number of bytes needed to pack `len` bases.
#[inline]
#[must_use]
pub fn packed_len(len: usize) -> usize {
    len.div_ceil(2)
}

/// Pack ASCII bases and append them to `dst`. An odd final base leaves the
/// low nibble of the last byte zero.
pub fn pack_sequence_into(dst: &mut Vec<u8>, bases: &[u8]) {
    dst.reserve(packed_len(bases.len()));
    let mut pairs = bases.chunks_exact(2);
    for pair in pairs.by_ref() {
        dst.push((ASCII_TO_BAM_BASE[pair[0] as usize] << 4) | ASCII_TO_BAM_BASE[pair[1] as usize]);
    }
    if let [last] = pairs.remainder() {
        dst.push(ASCII_TO_BAM_BASE[*last as usize] << 4);
    }
}

/// Unpack `len` bases from packed bytes into ASCII.
#[must_use]
pub fn unpack_sequence(packed: &[u8], len: usize) -> Vec<u8> {
    (0..len).map(|i| BAM_BASE_TO_ASCII[get_base(packed, 0, i) as usize]).collect()
}

/// Decode the full sequence of a record as ASCII.
#[must_use]
pub fn extract_sequence(bam: &[u8]) -> Vec<u8> {
    let len = l_seq(bam) as usize;
    let off = seq_offset(bam);
    unpack_sequence(&bam[off..off + packed_len(len)], len)
}
