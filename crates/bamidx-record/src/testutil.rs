//! Helpers for building raw records in tests.
#![allow(clippy::too_many_arguments)]

/// Build raw record bytes (no `block_size` prefix).
///
/// Sequence bytes are zero (`=`), qualities are zero, mapq and tlen are zero
/// and the stored bin is zero.
///
/// # Panics
///
/// Panics if the name, CIGAR or sequence are too long for their count fields.
#[must_use]
pub fn make_bam_bytes(
    tid: i32,
    pos: i32,
    flag: u16,
    name: &[u8],
    cigar_ops: &[u32],
    seq_len: usize,
    mate_tid: i32,
    mate_pos: i32,
    aux_data: &[u8],
) -> Vec<u8> {
    let l_read_name = u8::try_from(name.len() + 1).unwrap();
    let n_cigar_op = u16::try_from(cigar_ops.len()).unwrap();
    let mut buf = Vec::with_capacity(64 + name.len() + cigar_ops.len() * 4 + seq_len * 2);
    buf.extend_from_slice(&tid.to_le_bytes());
    buf.extend_from_slice(&pos.to_le_bytes());
    buf.push(l_read_name);
    buf.push(0);
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&n_cigar_op.to_le_bytes());
    buf.extend_from_slice(&flag.to_le_bytes());
    buf.extend_from_slice(&u32::try_from(seq_len).unwrap().to_le_bytes());
    buf.extend_from_slice(&mate_tid.to_le_bytes());
    buf.extend_from_slice(&mate_pos.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(name);
    buf.push(0);
    for op in cigar_ops {
        buf.extend_from_slice(&op.to_le_bytes());
    }
    buf.resize(buf.len() + seq_len.div_ceil(2) + seq_len, 0);
    buf.extend_from_slice(aux_data);
    buf
}

/// Like [`make_bam_bytes`] with an explicit template length.
#[must_use]
pub fn make_bam_bytes_with_tlen(
    tid: i32,
    pos: i32,
    flag: u16,
    name: &[u8],
    cigar_ops: &[u32],
    seq_len: usize,
    mate_tid: i32,
    mate_pos: i32,
    tlen: i32,
    aux_data: &[u8],
) -> Vec<u8> {
    let mut rec =
        make_bam_bytes(tid, pos, flag, name, cigar_ops, seq_len, mate_tid, mate_pos, aux_data);
    rec[28..32].copy_from_slice(&tlen.to_le_bytes());
    rec
}

/// A mapped record at `pos` with a single `M` op of `ref_len` and a matching
/// sequence, bin filled in.
#[must_use]
pub fn mapped_record(tid: i32, pos: i32, ref_len: u32, name: &[u8]) -> Vec<u8> {
    let mut rec = make_bam_bytes(
        tid,
        pos,
        0,
        name,
        &[encode_op(0, ref_len as usize)],
        ref_len as usize,
        -1,
        -1,
        &[],
    );
    let bin = crate::binning::alignment_bin(pos, u64::from(ref_len)) as u16;
    crate::fields::set_bin(&mut rec, bin);
    rec
}

/// An unmapped record. Pass `tid = -1, pos = -1` for an unplaced one.
#[must_use]
pub fn unmapped_record(tid: i32, pos: i32, name: &[u8]) -> Vec<u8> {
    let mut rec =
        make_bam_bytes(tid, pos, crate::fields::flags::UNMAPPED, name, &[], 4, -1, -1, &[]);
    crate::fields::set_bin(&mut rec, crate::binning::UNMAPPED_BIN);
    rec
}

/// Concatenate records, each with its `block_size` prefix.
#[must_use]
pub fn frame_records(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for rec in records {
        out.extend_from_slice(&u32::try_from(rec.len()).unwrap().to_le_bytes());
        out.extend_from_slice(rec);
    }
    out
}

/// Encode a single CIGAR op. `op_type`: M=0, I=1, D=2, N=3, S=4, H=5, P=6, `=`=7, X=8.
///
/// Unlike [`crate::cigar::pack_cigar_op`] this accepts undefined operators so
/// tests can build corrupt records.
#[must_use]
pub fn encode_op(op_type: u32, len: usize) -> u32 {
    (u32::try_from(len).unwrap() << 4) | op_type
}
