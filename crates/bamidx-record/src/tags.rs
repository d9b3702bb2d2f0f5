//! Auxiliary field parsing and construction.
//!
//! Each field is a 2-byte tag, a 1-byte type code and a payload whose size
//! depends on the type. Numeric payloads are little-endian; `f` payloads are
//! IEEE-754 bit patterns converted with [`f32::from_bits`]/[`f32::to_bits`].

use std::fmt;

/// Fixed payload sizes indexed by type byte. 0 = variable or unknown.
pub(crate) const TAG_FIXED_SIZES: [u8; 256] = {
    let mut table = [0u8; 256];
    table[b'A' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'C' as usize] = 1;
    table[b's' as usize] = 2;
    table[b'S' as usize] = 2;
    table[b'i' as usize] = 4;
    table[b'I' as usize] = 4;
    table[b'f' as usize] = 4;
    table
};

/// Element size of a `B` array subtype, or `None` if the subtype is invalid.
#[inline]
#[must_use]
pub fn array_element_size(subtype: u8) -> Option<usize> {
    match subtype {
        b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        _ => None,
    }
}

/// True for a legal tag name: `[A-Za-z][A-Za-z0-9]`.
#[inline]
#[must_use]
pub fn is_valid_tag(tag: [u8; 2]) -> bool {
    tag[0].is_ascii_alphabetic() && tag[1].is_ascii_alphanumeric()
}

/// Ways an auxiliary data section can be malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxError {
    /// Tag name is not `[A-Za-z][A-Za-z0-9]`.
    MalformedTag([u8; 2]),
    /// Type code is not one of `AcCsSiIfZHB`.
    UnknownType(u8),
    /// `B` array element type is not one of `cCsSiIf`.
    InvalidArraySubtype(u8),
    /// The field's declared length runs past the end of the data.
    Overrun { offset: usize },
}

impl fmt::Display for AuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedTag(t) => write!(f, "malformed tag {:?}", String::from_utf8_lossy(t)),
            Self::UnknownType(t) => write!(f, "unknown type code 0x{t:02x}"),
            Self::InvalidArraySubtype(t) => write!(f, "invalid array element type 0x{t:02x}"),
            Self::Overrun { offset } => write!(f, "field at offset {offset} runs past end"),
        }
    }
}

impl std::error::Error for AuxError {}

/// A borrowed `B` array payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxArray<'a> {
    /// Element type code.
    pub subtype: u8,
    /// Number of elements.
    pub count: usize,
    /// Raw little-endian element bytes.
    pub data: &'a [u8],
}

impl AuxArray<'_> {
    /// Element `index` as an integer, or `None` for float arrays or out of range.
    #[must_use]
    pub fn int(&self, index: usize) -> Option<i64> {
        let size = array_element_size(self.subtype)?;
        let b = self.data.get(index * size..(index + 1) * size)?;
        match self.subtype {
            b'c' => Some(i64::from(b[0].cast_signed())),
            b'C' => Some(i64::from(b[0])),
            b's' => Some(i64::from(i16::from_le_bytes([b[0], b[1]]))),
            b'S' => Some(i64::from(u16::from_le_bytes([b[0], b[1]]))),
            b'i' => Some(i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
            b'I' => Some(i64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
            _ => None,
        }
    }

    /// Element `index` of an `f` array.
    #[must_use]
    pub fn float(&self, index: usize) -> Option<f32> {
        if self.subtype != b'f' {
            return None;
        }
        let b = self.data.get(index * 4..index * 4 + 4)?;
        Some(f32::from_bits(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
    }
}

/// A decoded auxiliary value borrowing from the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuxValue<'a> {
    Char(u8),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    String(&'a [u8]),
    Hex(&'a [u8]),
    Array(AuxArray<'a>),
}

impl AuxValue<'_> {
    /// Integer value for any of the integer types.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int8(v) => Some(i64::from(v)),
            Self::UInt8(v) => Some(i64::from(v)),
            Self::Int16(v) => Some(i64::from(v)),
            Self::UInt16(v) => Some(i64::from(v)),
            Self::Int32(v) => Some(i64::from(v)),
            Self::UInt32(v) => Some(i64::from(v)),
            _ => None,
        }
    }
}

/// One auxiliary field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxField<'a> {
    pub tag: [u8; 2],
    pub value: AuxValue<'a>,
}

/// Iterator over the fields of an auxiliary data section.
///
/// Stops after the first error, which it yields.
pub struct AuxIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

/// Iterate the fields in `aux_data`.
#[must_use]
pub fn aux_fields(aux_data: &[u8]) -> AuxIter<'_> {
    AuxIter { data: aux_data, offset: 0, failed: false }
}

impl<'a> AuxIter<'a> {
    fn parse_next(&mut self) -> Result<AuxField<'a>, AuxError> {
        let start = self.offset;
        let overrun = AuxError::Overrun { offset: start };
        let head = self.data.get(start..start + 3).ok_or(overrun)?;
        let tag = [head[0], head[1]];
        let ty = head[2];
        if !is_valid_tag(tag) {
            return Err(AuxError::MalformedTag(tag));
        }
        let body = &self.data[start + 3..];

        let (value, consumed) = match ty {
            b'Z' | b'H' => {
                let nul = body.iter().position(|&b| b == 0).ok_or(overrun)?;
                let text = &body[..nul];
                let value = if ty == b'Z' { AuxValue::String(text) } else { AuxValue::Hex(text) };
                (value, nul + 1)
            }
            b'B' => {
                let head = body.get(..5).ok_or(overrun)?;
                let subtype = head[0];
                let size =
                    array_element_size(subtype).ok_or(AuxError::InvalidArraySubtype(subtype))?;
                let count = u32::from_le_bytes([head[1], head[2], head[3], head[4]]) as usize;
                let len = count.checked_mul(size).ok_or(overrun)?;
                let data = body.get(5..5 + len).ok_or(overrun)?;
                (AuxValue::Array(AuxArray { subtype, count, data }), 5 + len)
            }
            _ => {
                let size = TAG_FIXED_SIZES[ty as usize] as usize;
                if size == 0 {
                    return Err(AuxError::UnknownType(ty));
                }
                let b = body.get(..size).ok_or(overrun)?;
                let value = match ty {
                    b'A' => AuxValue::Char(b[0]),
                    b'c' => AuxValue::Int8(b[0].cast_signed()),
                    b'C' => AuxValue::UInt8(b[0]),
                    b's' => AuxValue::Int16(i16::from_le_bytes([b[0], b[1]])),
                    b'S' => AuxValue::UInt16(u16::from_le_bytes([b[0], b[1]])),
                    b'i' => AuxValue::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                    b'I' => AuxValue::UInt32(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                    _ => AuxValue::Float(f32::from_bits(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
                };
                (value, size)
            }
        };
        self.offset = start + 3 + consumed;
        Ok(AuxField { tag, value })
    }
}

impl<'a> Iterator for AuxIter<'a> {
    type Item = Result<AuxField<'a>, AuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let result = self.parse_next();
        self.failed = result.is_err();
        Some(result)
    }
}

/// Check that an auxiliary section parses completely.
///
/// # Errors
///
/// Returns the first [`AuxError`] encountered.
pub fn check_aux_data(aux_data: &[u8]) -> Result<(), AuxError> {
    aux_fields(aux_data).try_for_each(|field| field.map(|_| ()))
}

/// Find the value of `tag`, ignoring fields after a malformed one.
#[must_use]
pub fn find_tag<'a>(aux_data: &'a [u8], tag: &[u8; 2]) -> Option<AuxValue<'a>> {
    aux_fields(aux_data).map_while(Result::ok).find(|f| &f.tag == tag).map(|f| f.value)
}

// ============================================================================
// Construction
// ============================================================================

/// Append a `Z` string field.
pub fn append_string_tag(record: &mut Vec<u8>, tag: &[u8; 2], value: &[u8]) {
    record.extend_from_slice(tag);
    record.push(b'Z');
    record.extend_from_slice(value);
    record.push(0);
}

/// Append an `i` integer field.
pub fn append_int_tag(record: &mut Vec<u8>, tag: &[u8; 2], value: i32) {
    record.extend_from_slice(tag);
    record.push(b'i');
    record.extend_from_slice(&value.to_le_bytes());
}

/// Append an `f` float field.
pub fn append_float_tag(record: &mut Vec<u8>, tag: &[u8; 2], value: f32) {
    record.extend_from_slice(tag);
    record.push(b'f');
    record.extend_from_slice(&value.to_bits().to_le_bytes());
}

/// Append a `B` array field from pre-encoded little-endian elements.
///
/// # Panics
///
/// Panics if `subtype` is invalid, `elements` is not a whole number of
/// elements, or the count exceeds `u32::MAX`.
pub fn append_array_tag(record: &mut Vec<u8>, tag: &[u8; 2], subtype: u8, elements: &[u8]) {
    let size = array_element_size(subtype).expect("invalid array subtype");
    assert!(elements.len().is_multiple_of(size), "partial array element");
    let count = u32::try_from(elements.len() / size).expect("array too long");
    record.extend_from_slice(tag);
    record.push(b'B');
    record.push(subtype);
    record.extend_from_slice(&count.to_le_bytes());
    record.extend_from_slice(elements);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_aux() -> Vec<u8> {
        let mut aux = Vec::new();
        append_string_tag(&mut aux, b"RG", b"grp1");
        append_int_tag(&mut aux, b"NM", -3);
        append_float_tag(&mut aux, b"XF", 1.5);
        append_array_tag(&mut aux, b"ZB", b's', &[0x01, 0x00, 0xFF, 0xFF]);
        aux.extend_from_slice(b"XAAQ");
        aux.extend_from_slice(b"XCC\x07");
        aux
    }

    #[test]
    fn test_iterates_all_fields() {
        let aux = sample_aux();
        let fields: Vec<_> = aux_fields(&aux).collect::<Result<_, _>>().unwrap();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0].value, AuxValue::String(b"grp1"));
        assert_eq!(fields[1].value.as_int(), Some(-3));
        assert_eq!(fields[2].value, AuxValue::Float(1.5));
        assert_eq!(fields[4].value, AuxValue::Char(b'Q'));
        assert_eq!(fields[5].value, AuxValue::UInt8(7));
        let AuxValue::Array(array) = fields[3].value else { panic!("expected array") };
        assert_eq!(array.count, 2);
        assert_eq!(array.int(0), Some(1));
        assert_eq!(array.int(1), Some(-1));
        assert_eq!(array.int(2), None);
    }

    #[test]
    fn test_float_bits_preserved() {
        let mut aux = Vec::new();
        append_float_tag(&mut aux, b"XF", f32::MIN_POSITIVE);
        assert_eq!(&aux[3..], &f32::MIN_POSITIVE.to_bits().to_le_bytes());
        assert_eq!(find_tag(&aux, b"XF"), Some(AuxValue::Float(f32::MIN_POSITIVE)));
    }

    #[test]
    fn test_find_tag() {
        let aux = sample_aux();
        assert_eq!(find_tag(&aux, b"RG"), Some(AuxValue::String(b"grp1")));
        assert_eq!(find_tag(&aux, b"ZZ"), None);
    }

    #[rstest]
    #[case::bad_tag_digit_first(b"1Ai\0\0\0\0".to_vec(), AuxError::MalformedTag(*b"1A"))]
    #[case::unknown_type(b"XAq\0".to_vec(), AuxError::UnknownType(b'q'))]
    #[case::bad_subtype(b"XBBx\x01\0\0\0\0".to_vec(), AuxError::InvalidArraySubtype(b'x'))]
    #[case::short_int(b"XAi\0\0".to_vec(), AuxError::Overrun { offset: 0 })]
    #[case::unterminated_string(b"XAZabc".to_vec(), AuxError::Overrun { offset: 0 })]
    #[case::array_past_end(b"XBBi\x02\0\0\0\0\0\0\0".to_vec(), AuxError::Overrun { offset: 0 })]
    #[case::dangling_bytes(b"XAA!XB".to_vec(), AuxError::Overrun { offset: 4 })]
    fn test_malformed(#[case] aux: Vec<u8>, #[case] expected: AuxError) {
        assert_eq!(check_aux_data(&aux), Err(expected));
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let aux = b"XAq\0XBA!".to_vec();
        let items: Vec<_> = aux_fields(&aux).collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn test_empty_is_valid() {
        assert_eq!(check_aux_data(&[]), Ok(()));
    }
}
