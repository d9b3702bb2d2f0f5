//! Named-offset accessors for raw BAM alignment records.
//!
//! A record is handled as the bytes that follow its 4-byte `block_size`
//! prefix. Fixed-width fields live at the offsets below and are read and
//! written through the functions in this module instead of reinterpreting the
//! buffer as a struct, so layout and endianness never depend on the host.
//!
//! # Record Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0-3     4     refID (i32) - reference sequence ID
//! 4-7     4     pos (i32) - 0-based leftmost position
//! 8       1     l_read_name (u8) - length of read name + NUL
//! 9       1     mapq (u8) - mapping quality
//! 10-11   2     bin (u16) - BAI bin
//! 12-13   2     n_cigar_op (u16) - number of CIGAR operations
//! 14-15   2     flag (u16) - bitwise flags
//! 16-19   4     l_seq (u32) - length of sequence
//! 20-23   4     next_refID (i32) - mate reference sequence ID
//! 24-27   4     next_pos (i32) - mate 0-based position
//! 28-31   4     tlen (i32) - template length
//! 32+     var   read_name, cigar, seq, qual, aux
//! ```
//!
//! The plain accessors index the slice directly and panic when it is shorter
//! than the field they read; the validator only calls them after confirming
//! the fixed header is present and uses the `checked_*` variants for
//! everything else.

/// Length of the fixed portion of a record.
pub const MIN_BAM_HEADER_LEN: usize = 32;

/// Quality byte used for every position when a record stores no qualities.
pub const MISSING_QUALITY: u8 = 0xFF;

/// Largest legal Phred quality value.
pub const MAX_QUALITY: u8 = 93;

/// BAM flag bits.
pub mod flags {
    /// Read is paired in sequencing.
    pub const PAIRED: u16 = 0x1;
    /// Read is mapped in a proper pair.
    pub const PROPER_PAIR: u16 = 0x2;
    /// Read is unmapped.
    pub const UNMAPPED: u16 = 0x4;
    /// Mate is unmapped.
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Read is reverse complemented.
    pub const REVERSE: u16 = 0x10;
    /// Mate is reverse complemented.
    pub const MATE_REVERSE: u16 = 0x20;
    /// First segment in template.
    pub const FIRST_SEGMENT: u16 = 0x40;
    /// Last segment in template.
    pub const LAST_SEGMENT: u16 = 0x80;
    /// Secondary alignment.
    pub const SECONDARY: u16 = 0x100;
    /// Not passing quality controls.
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate.
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment.
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Byte offsets of the fixed fields.
pub mod offsets {
    pub const REF_ID: usize = 0;
    pub const POS: usize = 4;
    pub const L_READ_NAME: usize = 8;
    pub const MAPQ: usize = 9;
    pub const BIN: usize = 10;
    pub const N_CIGAR_OP: usize = 12;
    pub const FLAG: usize = 14;
    pub const L_SEQ: usize = 16;
    pub const NEXT_REF_ID: usize = 20;
    pub const NEXT_POS: usize = 24;
    pub const TLEN: usize = 28;
    pub const READ_NAME: usize = 32;
}

// ============================================================================
// Checked Primitives
// ============================================================================

/// Read a little-endian `u16` at `offset`, or `None` if it runs past the end.
#[inline]
#[must_use]
pub fn checked_u16(bam: &[u8], offset: usize) -> Option<u16> {
    let bytes = bam.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian `u32` at `offset`, or `None` if it runs past the end.
#[inline]
#[must_use]
pub fn checked_u32(bam: &[u8], offset: usize) -> Option<u32> {
    let bytes = bam.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
fn read_i32(bam: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([bam[offset], bam[offset + 1], bam[offset + 2], bam[offset + 3]])
}

#[inline]
fn write_i32(bam: &mut [u8], offset: usize, value: i32) {
    bam[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_u16(bam: &mut [u8], offset: usize, value: u16) {
    bam[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

// ============================================================================
// Read Primitives
// ============================================================================

/// Extract reference sequence ID.
#[inline]
#[must_use]
pub fn ref_id(bam: &[u8]) -> i32 {
    read_i32(bam, offsets::REF_ID)
}

/// Extract 0-based leftmost position.
#[inline]
#[must_use]
pub fn pos(bam: &[u8]) -> i32 {
    read_i32(bam, offsets::POS)
}

/// Extract `l_read_name` (length of read name + NUL).
#[inline]
#[must_use]
pub fn l_read_name(bam: &[u8]) -> u8 {
    bam[offsets::L_READ_NAME]
}

/// Extract mapping quality.
#[inline]
#[must_use]
pub fn mapq(bam: &[u8]) -> u8 {
    bam[offsets::MAPQ]
}

/// Extract the stored bin.
#[inline]
#[must_use]
pub fn bin(bam: &[u8]) -> u16 {
    u16::from_le_bytes([bam[offsets::BIN], bam[offsets::BIN + 1]])
}

/// Extract number of CIGAR operations.
#[inline]
#[must_use]
pub fn n_cigar_op(bam: &[u8]) -> u16 {
    u16::from_le_bytes([bam[offsets::N_CIGAR_OP], bam[offsets::N_CIGAR_OP + 1]])
}

/// Extract flags.
#[inline]
#[must_use]
pub fn flags(bam: &[u8]) -> u16 {
    u16::from_le_bytes([bam[offsets::FLAG], bam[offsets::FLAG + 1]])
}

/// Extract sequence length.
#[inline]
#[must_use]
pub fn l_seq(bam: &[u8]) -> u32 {
    u32::from_le_bytes([
        bam[offsets::L_SEQ],
        bam[offsets::L_SEQ + 1],
        bam[offsets::L_SEQ + 2],
        bam[offsets::L_SEQ + 3],
    ])
}

/// Extract mate reference sequence ID.
#[inline]
#[must_use]
pub fn mate_ref_id(bam: &[u8]) -> i32 {
    read_i32(bam, offsets::NEXT_REF_ID)
}

/// Extract mate 0-based position.
#[inline]
#[must_use]
pub fn mate_pos(bam: &[u8]) -> i32 {
    read_i32(bam, offsets::NEXT_POS)
}

/// Extract template length.
#[inline]
#[must_use]
pub fn template_length(bam: &[u8]) -> i32 {
    read_i32(bam, offsets::TLEN)
}

/// True when the unmapped flag is set.
#[inline]
#[must_use]
pub fn is_unmapped(bam: &[u8]) -> bool {
    flags(bam) & flags::UNMAPPED != 0
}

/// Extract read name without the NUL terminator.
#[inline]
#[must_use]
pub fn read_name(bam: &[u8]) -> &[u8] {
    let l = l_read_name(bam) as usize;
    if l > 1 { &bam[offsets::READ_NAME..offsets::READ_NAME + l - 1] } else { &[] }
}

// ============================================================================
// Section Offsets
// ============================================================================

/// Offset of the first CIGAR operation.
#[inline]
#[must_use]
pub fn cigar_offset(bam: &[u8]) -> usize {
    offsets::READ_NAME + l_read_name(bam) as usize
}

/// Offset of the packed sequence.
#[inline]
#[must_use]
pub fn seq_offset(bam: &[u8]) -> usize {
    cigar_offset(bam) + n_cigar_op(bam) as usize * 4
}

/// Offset of the quality scores.
#[inline]
#[must_use]
pub fn qual_offset(bam: &[u8]) -> usize {
    seq_offset(bam) + (l_seq(bam) as usize).div_ceil(2)
}

/// Offset of the auxiliary data, computed from the record's own counts.
#[inline]
#[must_use]
pub fn aux_offset(bam: &[u8]) -> usize {
    aux_data_offset(l_read_name(bam) as usize, n_cigar_op(bam) as usize, l_seq(bam) as usize)
}

/// Calculate the offset to auxiliary data from the variable-length counts.
///
/// `aux_offset = 32 + l_read_name + n_cigar_op*4 + (l_seq+1)/2 + l_seq`
#[inline]
#[must_use]
pub fn aux_data_offset(l_read_name: usize, n_cigar_op: usize, l_seq: usize) -> usize {
    MIN_BAM_HEADER_LEN + l_read_name + n_cigar_op * 4 + l_seq.div_ceil(2) + l_seq
}

/// Raw quality bytes (`l_seq` of them).
#[inline]
#[must_use]
pub fn quality_scores(bam: &[u8]) -> &[u8] {
    let start = qual_offset(bam);
    &bam[start..start + l_seq(bam) as usize]
}

/// Raw auxiliary data bytes.
#[inline]
#[must_use]
pub fn aux_data(bam: &[u8]) -> &[u8] {
    &bam[aux_offset(bam).min(bam.len())..]
}

// ============================================================================
// Write Primitives
// ============================================================================

/// Set the reference sequence ID.
#[inline]
pub fn set_ref_id(bam: &mut [u8], value: i32) {
    write_i32(bam, offsets::REF_ID, value);
}

/// Set the 0-based position.
#[inline]
pub fn set_pos(bam: &mut [u8], value: i32) {
    write_i32(bam, offsets::POS, value);
}

/// Set the mapping quality.
#[inline]
pub fn set_mapq(bam: &mut [u8], value: u8) {
    bam[offsets::MAPQ] = value;
}

/// Set the stored bin.
#[inline]
pub fn set_bin(bam: &mut [u8], value: u16) {
    write_u16(bam, offsets::BIN, value);
}

/// Set the flags.
#[inline]
pub fn set_flags(bam: &mut [u8], value: u16) {
    write_u16(bam, offsets::FLAG, value);
}

/// Set the mate reference sequence ID.
#[inline]
pub fn set_mate_ref_id(bam: &mut [u8], value: i32) {
    write_i32(bam, offsets::NEXT_REF_ID, value);
}

/// Set the mate position.
#[inline]
pub fn set_mate_pos(bam: &mut [u8], value: i32) {
    write_i32(bam, offsets::NEXT_POS, value);
}

/// Set the template length.
#[inline]
pub fn set_template_length(bam: &mut [u8], value: i32) {
    write_i32(bam, offsets::TLEN, value);
}
