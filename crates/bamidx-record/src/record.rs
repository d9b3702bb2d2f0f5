//! Owned alignment record buffer.
//!
//! [`RawRecord`] owns the bytes of one record (everything after the 4-byte
//! `block_size` prefix) and exposes the field accessors from
//! [`crate::fields`] as methods. The buffer is reused across records: it is
//! only reallocated when a record needs more room than the current capacity.

use std::io::{self, Read, Write};

use crate::binning::{UNMAPPED_BIN, alignment_bin};
use crate::cigar::{cigar_ops, reference_length_from_raw_bam};
use crate::fields::{self, MIN_BAM_HEADER_LEN, MISSING_QUALITY, offsets};
use crate::sequence::{extract_sequence, pack_sequence_into};

/// A single alignment record in its wire layout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawRecord {
    buf: Vec<u8>,
}

impl RawRecord {
    /// Create an empty record buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record buffer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    /// Wrap existing record bytes (without the `block_size` prefix).
    #[must_use]
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Record bytes without the `block_size` prefix.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the record, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes in the record; the value of its `block_size` prefix.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Clear the buffer in preparation for a record of `block_size` bytes,
    /// growing the allocation only if it is too small.
    pub fn prepare(&mut self, block_size: usize) {
        self.buf.clear();
        if block_size > self.buf.capacity() {
            self.buf.reserve_exact(block_size);
        }
    }

    /// Append body bytes to a record being assembled.
    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    // ========================================================================
    // Serialisation
    // ========================================================================

    /// Read one length-prefixed record, replacing the current contents.
    ///
    /// Returns `Ok(false)` if the reader is at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` if the stream ends inside the length prefix or
    /// the body, or any error from the underlying reader.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<bool> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match reader.read(&mut len_buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Truncated BAM record length",
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        let block_size = u32::from_le_bytes(len_buf) as usize;
        self.prepare(block_size);
        self.buf.resize(block_size, 0);
        reader.read_exact(&mut self.buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated BAM record")
            } else {
                e
            }
        })?;
        Ok(true)
    }

    /// Write the record with its `block_size` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is larger than `u32::MAX` bytes or the
    /// writer fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let block_size = u32::try_from(self.buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))?;
        writer.write_all(&block_size.to_le_bytes())?;
        writer.write_all(&self.buf)
    }

    // ========================================================================
    // Accessors
    //
    // These assume a structurally valid record (see `crate::validate`).
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn ref_id(&self) -> i32 {
        fields::ref_id(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn pos(&self) -> i32 {
        fields::pos(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn mapq(&self) -> u8 {
        fields::mapq(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn bin(&self) -> u16 {
        fields::bin(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> u16 {
        fields::flags(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        fields::is_unmapped(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn mate_ref_id(&self) -> i32 {
        fields::mate_ref_id(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn mate_pos(&self) -> i32 {
        fields::mate_pos(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn template_length(&self) -> i32 {
        fields::template_length(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn read_name(&self) -> &[u8] {
        fields::read_name(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn l_seq(&self) -> usize {
        fields::l_seq(&self.buf) as usize
    }

    /// Raw CIGAR ops.
    pub fn cigar_ops(&self) -> impl Iterator<Item = u32> + '_ {
        cigar_ops(&self.buf)
    }

    /// Number of reference bases covered by the CIGAR.
    #[inline]
    #[must_use]
    pub fn reference_length(&self) -> u64 {
        reference_length_from_raw_bam(&self.buf)
    }

    /// Decoded ASCII bases.
    #[must_use]
    pub fn sequence(&self) -> Vec<u8> {
        extract_sequence(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn quality_scores(&self) -> &[u8] {
        fields::quality_scores(&self.buf)
    }

    #[inline]
    #[must_use]
    pub fn aux_data(&self) -> &[u8] {
        fields::aux_data(&self.buf)
    }

    /// Bin implied by the position and CIGAR, as htslib computes it on write.
    #[must_use]
    pub fn computed_bin(&self) -> u16 {
        let pos = self.pos();
        if pos < 0 {
            return UNMAPPED_BIN;
        }
        // The scheme's largest bin id is 37448, which fits in u16.
        alignment_bin(pos, self.reference_length()) as u16
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Mutable access to the fixed header for the `fields::set_*` functions.
    ///
    /// # Panics
    ///
    /// Panics if the record is shorter than the fixed header.
    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..MIN_BAM_HEADER_LEN]
    }

    /// Replace the CIGAR, shifting the following sections and refreshing
    /// `n_cigar_op` and the bin.
    ///
    /// # Panics
    ///
    /// Panics if `ops` has more than `u16::MAX` entries.
    pub fn replace_cigar(&mut self, ops: &[u32]) {
        let n_cigar_op = u16::try_from(ops.len()).expect("too many CIGAR operations");
        let range = fields::cigar_offset(&self.buf)..fields::seq_offset(&self.buf);
        self.buf.splice(range, ops.iter().flat_map(|op| op.to_le_bytes()));
        self.buf[offsets::N_CIGAR_OP..offsets::N_CIGAR_OP + 2]
            .copy_from_slice(&n_cigar_op.to_le_bytes());
        let bin = self.computed_bin();
        fields::set_bin(&mut self.buf, bin);
    }

    /// Replace the sequence and qualities. `None` qualities are stored as
    /// the missing-quality sentinel.
    ///
    /// # Panics
    ///
    /// Panics if `quals` is given with a different length than `bases`.
    pub fn replace_sequence(&mut self, bases: &[u8], quals: Option<&[u8]>) {
        if let Some(q) = quals {
            assert_eq!(q.len(), bases.len(), "quality length must match sequence length");
        }
        let l_seq = u32::try_from(bases.len()).expect("sequence too long");
        let mut section = Vec::with_capacity(bases.len().div_ceil(2) + bases.len());
        pack_sequence_into(&mut section, bases);
        match quals {
            Some(q) => section.extend_from_slice(q),
            None => section.resize(section.len() + bases.len(), MISSING_QUALITY),
        }
        let range = fields::seq_offset(&self.buf)..fields::aux_offset(&self.buf);
        self.buf.splice(range, section);
        self.buf[offsets::L_SEQ..offsets::L_SEQ + 4].copy_from_slice(&l_seq.to_le_bytes());
    }
}

impl AsRef<[u8]> for RawRecord {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{encode_op, frame_records, make_bam_bytes};
    use crate::builder::RecordBuilder;
    use crate::cigar::{consumes_query, pack_cigar_op};
    use crate::validate::{RecordVerdict, validate};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn mapped() -> RawRecord {
        let mut aux = Vec::new();
        crate::tags::append_string_tag(&mut aux, b"RG", b"A");
        RawRecord::from_bytes(make_bam_bytes(1, 1000, 0, b"q1", &[encode_op(0, 8)], 8, 1, 1200, &aux))
    }

    #[test]
    fn test_write_then_read_identical_bytes() {
        let rec = mapped();
        let mut out = Vec::new();
        rec.write_to(&mut out).unwrap();
        assert_eq!(&out[..4], &(rec.len() as u32).to_le_bytes());

        let mut back = RawRecord::new();
        assert!(back.read_from(&mut Cursor::new(&out)).unwrap());
        assert_eq!(back, rec);
    }

    /// CIGAR ops (excluding clips and padding) plus matching bases and
    /// optional qualities.
    fn alignment() -> impl Strategy<Value = (Vec<u32>, Vec<u8>, Option<Vec<u8>>)> {
        let op = (prop::sample::select(vec![0u32, 1, 2, 3, 4, 7, 8]), 1u32..40);
        prop::collection::vec(op, 0..8).prop_flat_map(|ops| {
            let query_len: u32 = ops.iter().filter(|(ty, _)| consumes_query(*ty)).map(|(_, n)| n).sum();
            let cigar: Vec<u32> = ops.iter().map(|&(ty, n)| pack_cigar_op(ty, n)).collect();
            let len = query_len as usize;
            (
                Just(cigar),
                prop::collection::vec(prop::sample::select(b"ACGTN".to_vec()), len),
                prop::option::of(prop::collection::vec(0u8..=93, len)),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_built_record_survives_write_and_read(
            name in "[A-Za-z0-9:_]{1,60}",
            ref_id in 0i32..4,
            pos in 0i32..1_000_000,
            mapq in any::<u8>(),
            (cigar, bases, quals) in alignment(),
            read_group in prop::option::of("[A-Za-z0-9]{1,12}"),
            edit_distance in prop::option::of(any::<i32>()),
        ) {
            let mut builder = RecordBuilder::new()
                .name(name.as_bytes())
                .reference(ref_id, pos)
                .mapq(mapq)
                .cigar(&cigar)
                .sequence(&bases, quals.as_deref());
            if let Some(rg) = &read_group {
                builder = builder.string_tag(b"RG", rg.as_bytes());
            }
            if let Some(nm) = edit_distance {
                builder = builder.int_tag(b"NM", nm);
            }
            let rec = builder.build();
            prop_assert_eq!(validate(rec.as_bytes()), RecordVerdict::Valid);

            let mut out = Vec::new();
            rec.write_to(&mut out).unwrap();
            let mut back = RawRecord::new();
            prop_assert!(back.read_from(&mut Cursor::new(&out)).unwrap());
            prop_assert_eq!(back.as_bytes(), rec.as_bytes());
            prop_assert_eq!(back.read_name(), name.as_bytes());
            prop_assert_eq!((back.ref_id(), back.pos(), back.mapq()), (ref_id, pos, mapq));
            prop_assert_eq!(back.cigar_ops().collect::<Vec<_>>(), cigar);
            prop_assert_eq!(back.sequence(), bases);
            match &quals {
                Some(q) => {
                    prop_assert_eq!(back.quality_scores(), q.as_slice());
                }
                None => {
                    prop_assert!(back.quality_scores().iter().all(|&q| q == MISSING_QUALITY));
                }
            }
            prop_assert_eq!(back.bin(), back.computed_bin());
            // Nothing follows the record in the stream.
            prop_assert!(!back.read_from(&mut Cursor::new(&out[out.len()..])).unwrap());
        }
    }

    #[test]
    fn test_read_from_clean_eof_and_truncation() {
        let mut rec = RawRecord::new();
        assert!(!rec.read_from(&mut Cursor::new(Vec::<u8>::new())).unwrap());

        let err = rec.read_from(&mut Cursor::new(vec![40u8, 0])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut stream = frame_records(&[mapped().into_bytes()]);
        stream.truncate(stream.len() - 3);
        let err = rec.read_from(&mut Cursor::new(stream)).unwrap_err();
        assert!(err.to_string().contains("Truncated BAM record"));
    }

    #[test]
    fn test_prepare_reuses_capacity() {
        let mut rec = RawRecord::with_capacity(256);
        let before = rec.capacity();
        rec.prepare(100);
        assert_eq!(rec.capacity(), before);
        rec.prepare(1024);
        assert!(rec.capacity() >= 1024);
    }

    #[test]
    fn test_replace_cigar_rebuilds_buffer() {
        let mut rec = mapped();
        let aux_before = rec.aux_data().to_vec();
        let seq_before = rec.sequence();
        rec.replace_cigar(&[encode_op(4, 2), encode_op(0, 4), encode_op(2, 30000), encode_op(0, 2)]);
        assert_eq!(rec.cigar_ops().count(), 4);
        assert_eq!(rec.reference_length(), 30006);
        assert_eq!(rec.bin(), rec.computed_bin());
        assert_eq!(rec.bin(), 585);
        assert_eq!(rec.sequence(), seq_before);
        assert_eq!(rec.aux_data(), aux_before.as_slice());
        assert_eq!(validate(rec.as_bytes()), RecordVerdict::Valid);
    }

    #[test]
    fn test_replace_sequence_with_and_without_quals() {
        let mut rec = mapped();
        rec.replace_cigar(&[encode_op(0, 5)]);
        rec.replace_sequence(b"ACGTN", Some(&[30, 31, 32, 33, 2]));
        assert_eq!(rec.sequence(), b"ACGTN".to_vec());
        assert_eq!(rec.quality_scores(), &[30, 31, 32, 33, 2]);
        assert_eq!(validate(rec.as_bytes()), RecordVerdict::Valid);

        rec.replace_sequence(b"ACGTA", None);
        assert!(rec.quality_scores().iter().all(|&q| q == MISSING_QUALITY));
        assert_eq!(rec.aux_data(), b"RGZA\0");
        assert_eq!(validate(rec.as_bytes()), RecordVerdict::Valid);
    }

    #[test]
    fn test_computed_bin_for_unplaced() {
        let rec = RawRecord::from_bytes(make_bam_bytes(-1, -1, 0x4, b"u", &[], 0, -1, -1, &[]));
        assert_eq!(rec.computed_bin(), UNMAPPED_BIN);
    }
}
