use crate::binning::{UNMAPPED_BIN, alignment_bin};
use crate::cigar::reference_length_from_cigar;
use crate::fields::MISSING_QUALITY;
use crate::record::RawRecord;
use crate::sequence::pack_sequence_into;
use crate::tags::{append_array_tag, append_float_tag, append_int_tag, append_string_tag};

// ============================================================================
// Record Builder
// ============================================================================

/// Reusable builder for raw alignment records.
///
/// Fields default to an unplaced, unmapped record (`ref_id=-1`, `pos=-1`,
/// no CIGAR, mate unset). Set what you need, add tags, then call
/// [`Self::build`]. The bin is computed from the position and CIGAR, the way
/// htslib fills it on write.
///
/// ```rust,ignore
/// let record = RecordBuilder::new()
///     .name(b"q1")
///     .reference(0, 1000)
///     .cigar(&[pack_cigar_op(CIGAR_MATCH, 100)])
///     .sequence(&bases, Some(&quals))
///     .string_tag(b"RG", b"sample1")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    name: Vec<u8>,
    flags: u16,
    ref_id: i32,
    pos: i32,
    mapq: u8,
    cigar: Vec<u32>,
    bases: Vec<u8>,
    quals: Option<Vec<u8>>,
    mate_ref_id: i32,
    mate_pos: i32,
    template_length: i32,
    aux: Vec<u8>,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self {
            name: b"*".to_vec(),
            flags: crate::fields::flags::UNMAPPED,
            ref_id: -1,
            pos: -1,
            mapq: 255,
            cigar: Vec::new(),
            bases: Vec::new(),
            quals: None,
            mate_ref_id: -1,
            mate_pos: -1,
            template_length: 0,
            aux: Vec::new(),
        }
    }
}

impl RecordBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read name without the NUL terminator.
    #[must_use]
    pub fn name(mut self, name: &[u8]) -> Self {
        self.name = name.to_vec();
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    /// Place the record at `pos` on reference `ref_id` and clear the unmapped
    /// flag.
    #[must_use]
    pub fn reference(mut self, ref_id: i32, pos: i32) -> Self {
        self.ref_id = ref_id;
        self.pos = pos;
        self.flags &= !crate::fields::flags::UNMAPPED;
        self
    }

    #[must_use]
    pub fn mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    #[must_use]
    pub fn cigar(mut self, ops: &[u32]) -> Self {
        self.cigar = ops.to_vec();
        self
    }

    /// ASCII bases and raw Phred qualities (`None` for missing).
    #[must_use]
    pub fn sequence(mut self, bases: &[u8], quals: Option<&[u8]>) -> Self {
        self.bases = bases.to_vec();
        self.quals = quals.map(<[u8]>::to_vec);
        self
    }

    #[must_use]
    pub fn mate(mut self, ref_id: i32, pos: i32) -> Self {
        self.mate_ref_id = ref_id;
        self.mate_pos = pos;
        self
    }

    #[must_use]
    pub fn template_length(mut self, tlen: i32) -> Self {
        self.template_length = tlen;
        self
    }

    #[must_use]
    pub fn string_tag(mut self, tag: &[u8; 2], value: &[u8]) -> Self {
        append_string_tag(&mut self.aux, tag, value);
        self
    }

    #[must_use]
    pub fn int_tag(mut self, tag: &[u8; 2], value: i32) -> Self {
        append_int_tag(&mut self.aux, tag, value);
        self
    }

    #[must_use]
    pub fn float_tag(mut self, tag: &[u8; 2], value: f32) -> Self {
        append_float_tag(&mut self.aux, tag, value);
        self
    }

    #[must_use]
    pub fn array_tag(mut self, tag: &[u8; 2], subtype: u8, elements: &[u8]) -> Self {
        append_array_tag(&mut self.aux, tag, subtype, elements);
        self
    }

    /// Pre-encoded auxiliary bytes, appended as-is.
    #[must_use]
    pub fn raw_aux(mut self, aux: &[u8]) -> Self {
        self.aux.extend_from_slice(aux);
        self
    }

    /// Serialise into `record`, reusing its allocation.
    ///
    /// # Panics
    ///
    /// Panics if the name is 255 bytes or longer, there are more than
    /// `u16::MAX` CIGAR ops, or qualities are given with a different length
    /// than the bases.
    pub fn build_into(&self, record: &mut RawRecord) {
        assert!(self.name.len() < 255, "read name too long ({} bytes, max 254)", self.name.len());
        if let Some(q) = &self.quals {
            assert_eq!(q.len(), self.bases.len(), "quality length must match sequence length");
        }
        let l_read_name = u8::try_from(self.name.len() + 1).expect("read name length overflow");
        let n_cigar_op = u16::try_from(self.cigar.len()).expect("too many CIGAR operations");
        let l_seq = u32::try_from(self.bases.len()).expect("sequence too long");
        let bin = if self.pos < 0 {
            UNMAPPED_BIN
        } else {
            alignment_bin(self.pos, reference_length_from_cigar(&self.cigar)) as u16
        };

        let size = crate::fields::aux_data_offset(
            l_read_name as usize,
            self.cigar.len(),
            self.bases.len(),
        ) + self.aux.len();
        record.prepare(size);

        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&self.ref_id.to_le_bytes());
        buf.extend_from_slice(&self.pos.to_le_bytes());
        buf.push(l_read_name);
        buf.push(self.mapq);
        buf.extend_from_slice(&bin.to_le_bytes());
        buf.extend_from_slice(&n_cigar_op.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&l_seq.to_le_bytes());
        buf.extend_from_slice(&self.mate_ref_id.to_le_bytes());
        buf.extend_from_slice(&self.mate_pos.to_le_bytes());
        buf.extend_from_slice(&self.template_length.to_le_bytes());
        buf.extend_from_slice(&self.name);
        buf.push(0);
        for op in &self.cigar {
            buf.extend_from_slice(&op.to_le_bytes());
        }
        pack_sequence_into(&mut buf, &self.bases);
        match &self.quals {
            Some(q) => buf.extend_from_slice(q),
            None => buf.resize(buf.len() + self.bases.len(), MISSING_QUALITY),
        }
        buf.extend_from_slice(&self.aux);
        record.extend_from_slice(&buf);
    }

    /// Serialise into a new record.
    ///
    /// # Panics
    ///
    /// See [`Self::build_into`].
    #[must_use]
    pub fn build(&self) -> RawRecord {
        let mut record = RawRecord::new();
        self.build_into(&mut record);
        record
    }
}
