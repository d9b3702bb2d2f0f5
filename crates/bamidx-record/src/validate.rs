//! Structural validation of raw alignment records.
//!
//! [`validate`] is a pure function over record bytes that never panics and
//! never mutates. Checks run in a fixed order and the first violated one
//! decides the verdict, so the same corrupt record always reports the same
//! kind. [`validate_references`] is the second pass that needs the reference
//! count from the header.

use std::fmt;

use crate::binning::MAX_COORDINATE;
use crate::cigar::{MAX_CIGAR_OP, cigar_op_len, cigar_op_type, consumes_query, consumes_reference};
use crate::fields::{
    MAX_QUALITY, MIN_BAM_HEADER_LEN, MISSING_QUALITY, checked_u32, flags, l_read_name, l_seq,
    mate_pos, mate_ref_id, n_cigar_op, offsets, pos, ref_id, template_length,
};
use crate::tags::check_aux_data;

/// Outcome of validating one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordVerdict {
    Valid,
    BlockTooSmall,
    NameExtendsPastBlock,
    NameLengthMismatch,
    EmptyName,
    IllegalNameCharacter,
    CigarExtendsPastBlock,
    SequenceExtendsPastBlock,
    QualityExtendsPastBlock,
    UnknownCigarOperator,
    CigarSequenceMismatch,
    InvalidPosition,
    InvalidMatePosition,
    InvalidTemplateLength,
    InvalidQualityValue,
    InvalidAuxiliaryData,
    InvalidReferenceId,
    InvalidMateReferenceId,
}

impl RecordVerdict {
    /// Every verdict, in check order.
    pub const ALL: [RecordVerdict; 18] = [
        Self::Valid,
        Self::BlockTooSmall,
        Self::NameExtendsPastBlock,
        Self::NameLengthMismatch,
        Self::EmptyName,
        Self::IllegalNameCharacter,
        Self::CigarExtendsPastBlock,
        Self::SequenceExtendsPastBlock,
        Self::QualityExtendsPastBlock,
        Self::UnknownCigarOperator,
        Self::CigarSequenceMismatch,
        Self::InvalidPosition,
        Self::InvalidMatePosition,
        Self::InvalidTemplateLength,
        Self::InvalidQualityValue,
        Self::InvalidAuxiliaryData,
        Self::InvalidReferenceId,
        Self::InvalidMateReferenceId,
    ];

    #[inline]
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Short stable identifier, used in logs and summary tables.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::BlockTooSmall => "block_too_small",
            Self::NameExtendsPastBlock => "name_extends_past_block",
            Self::NameLengthMismatch => "name_length_mismatch",
            Self::EmptyName => "empty_name",
            Self::IllegalNameCharacter => "illegal_name_character",
            Self::CigarExtendsPastBlock => "cigar_extends_past_block",
            Self::SequenceExtendsPastBlock => "sequence_extends_past_block",
            Self::QualityExtendsPastBlock => "quality_extends_past_block",
            Self::UnknownCigarOperator => "unknown_cigar_operator",
            Self::CigarSequenceMismatch => "cigar_sequence_mismatch",
            Self::InvalidPosition => "invalid_position",
            Self::InvalidMatePosition => "invalid_mate_position",
            Self::InvalidTemplateLength => "invalid_template_length",
            Self::InvalidQualityValue => "invalid_quality_value",
            Self::InvalidAuxiliaryData => "invalid_auxiliary_data",
            Self::InvalidReferenceId => "invalid_reference_id",
            Self::InvalidMateReferenceId => "invalid_mate_reference_id",
        }
    }
}

impl fmt::Display for RecordVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Valid => "record is valid",
            Self::BlockTooSmall => "block is smaller than the 32-byte fixed header",
            Self::NameExtendsPastBlock => "read name extends past end of block",
            Self::NameLengthMismatch => "read name is not terminated at its declared length",
            Self::EmptyName => "read name is empty",
            Self::IllegalNameCharacter => "read name contains an illegal character",
            Self::CigarExtendsPastBlock => "CIGAR extends past end of block",
            Self::SequenceExtendsPastBlock => "sequence extends past end of block",
            Self::QualityExtendsPastBlock => "quality scores extend past end of block",
            Self::UnknownCigarOperator => "CIGAR contains an unknown operator",
            Self::CigarSequenceMismatch => "CIGAR read length does not match sequence length",
            Self::InvalidPosition => "position is outside the indexable range",
            Self::InvalidMatePosition => "mate position is outside the indexable range",
            Self::InvalidTemplateLength => "template length is outside the indexable range",
            Self::InvalidQualityValue => "quality scores contain an illegal value",
            Self::InvalidAuxiliaryData => "auxiliary data is malformed",
            Self::InvalidReferenceId => "reference id is not in the header",
            Self::InvalidMateReferenceId => "mate reference id is not in the header",
        };
        f.write_str(text)
    }
}

/// Legal read name bytes: printable ASCII except `@`.
const NAME_CHAR_OK: [bool; 256] = {
    let mut table = [false; 256];
    let mut c = b'!';
    while c <= b'~' {
        table[c as usize] = c != b'@';
        c += 1;
    }
    table
};

#[inline]
fn valid_coordinate(value: i32) -> bool {
    (-1..MAX_COORDINATE).contains(&i64::from(value))
}

/// Validate the structure of one record (bytes after the `block_size` prefix).
#[must_use]
pub fn validate(bam: &[u8]) -> RecordVerdict {
    let len = bam.len();
    if len < MIN_BAM_HEADER_LEN {
        return RecordVerdict::BlockTooSmall;
    }

    let name_len = l_read_name(bam) as usize;
    let name_end = offsets::READ_NAME + name_len;
    if name_end > len {
        return RecordVerdict::NameExtendsPastBlock;
    }
    let name = &bam[offsets::READ_NAME..name_end];
    if name_len > 0 && name.iter().position(|&b| b == 0) != Some(name_len - 1) {
        return RecordVerdict::NameLengthMismatch;
    }
    if name_len <= 1 {
        return RecordVerdict::EmptyName;
    }
    if !name[..name_len - 1].iter().all(|&b| NAME_CHAR_OK[b as usize]) {
        return RecordVerdict::IllegalNameCharacter;
    }

    let n_ops = n_cigar_op(bam) as usize;
    let cigar_end = name_end + n_ops * 4;
    if cigar_end > len {
        return RecordVerdict::CigarExtendsPastBlock;
    }
    let seq_len = l_seq(bam) as usize;
    let seq_end = cigar_end.saturating_add(seq_len.div_ceil(2));
    if seq_end > len {
        return RecordVerdict::SequenceExtendsPastBlock;
    }
    let qual_end = seq_end.saturating_add(seq_len);
    if qual_end > len {
        return RecordVerdict::QualityExtendsPastBlock;
    }

    let mut query_len = 0u64;
    let mut reference_len = 0u64;
    for i in 0..n_ops {
        let Some(op) = checked_u32(bam, name_end + i * 4) else {
            return RecordVerdict::CigarExtendsPastBlock;
        };
        let ty = cigar_op_type(op);
        if ty > MAX_CIGAR_OP {
            return RecordVerdict::UnknownCigarOperator;
        }
        if consumes_query(ty) {
            query_len += u64::from(cigar_op_len(op));
        }
        if consumes_reference(ty) {
            reference_len += u64::from(cigar_op_len(op));
        }
    }
    let mapped = crate::fields::flags(bam) & flags::UNMAPPED == 0;
    if mapped && n_ops > 0 && seq_len > 0 && query_len != seq_len as u64 {
        return RecordVerdict::CigarSequenceMismatch;
    }

    let start = pos(bam);
    if !valid_coordinate(start) {
        return RecordVerdict::InvalidPosition;
    }
    // The alignment end must stay inside the binning range.
    if mapped && start >= 0 && start as u64 + reference_len > MAX_COORDINATE as u64 {
        return RecordVerdict::InvalidPosition;
    }
    if !valid_coordinate(mate_pos(bam)) {
        return RecordVerdict::InvalidMatePosition;
    }
    if i64::from(template_length(bam)).abs() >= MAX_COORDINATE {
        return RecordVerdict::InvalidTemplateLength;
    }

    let quals = &bam[seq_end..qual_end];
    let quals_ok = match quals.first() {
        None => true,
        Some(&MISSING_QUALITY) => quals.iter().all(|&q| q == MISSING_QUALITY),
        Some(_) => quals.iter().all(|&q| q <= MAX_QUALITY),
    };
    if !quals_ok {
        return RecordVerdict::InvalidQualityValue;
    }

    if check_aux_data(&bam[qual_end..]).is_err() {
        return RecordVerdict::InvalidAuxiliaryData;
    }

    RecordVerdict::Valid
}

/// Second-pass check of the reference ids against a header with `n_ref`
/// references. Assumes the record already passed [`validate`].
#[must_use]
pub fn validate_references(bam: &[u8], n_ref: usize) -> RecordVerdict {
    let in_table = |id: i32| id == -1 || usize::try_from(id).is_ok_and(|i| i < n_ref);
    if !in_table(ref_id(bam)) {
        return RecordVerdict::InvalidReferenceId;
    }
    if !in_table(mate_ref_id(bam)) {
        return RecordVerdict::InvalidMateReferenceId;
    }
    RecordVerdict::Valid
}

/// Both passes.
#[must_use]
pub fn validate_with_references(bam: &[u8], n_ref: usize) -> RecordVerdict {
    match validate(bam) {
        RecordVerdict::Valid => validate_references(bam, n_ref),
        verdict => verdict,
    }
}
