use crate::element::{Element, Tuple};
use crate::error::TupleError;
use crate::pack::{
    unflip_int, unpack_f32_bits, unpack_f64_bits, TAG_BOOL_FALSE, TAG_BOOL_TRUE, TAG_BYTES, TAG_DOUBLE, TAG_FLOAT, TAG_INT, TAG_STRING,
    TAG_TIMESTAMP, TAG_TUPLE, TAG_VERSIONSTAMP,
};
use crate::versionstamp::Versionstamp;

/// Reads an escaped, `0x00 0x00`-terminated byte string starting at
/// `bytes[*pos]`, un-escaping `0x00 0xFF` back to a literal `0x00`. Leaves
/// `*pos` positioned just past the terminator.
fn read_escaped(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, TupleError> {
    let mut out = Vec::new();
    loop {
        if *pos >= bytes.len() {
            return Err(TupleError::Truncated { offset: *pos });
        }
        let b = bytes[*pos];
        if b == 0x00 {
            match bytes.get(*pos + 1) {
                Some(0xFF) => {
                    out.push(0x00);
                    *pos += 2;
                }
                Some(0x00) => {
                    *pos += 2;
                    return Ok(out);
                }
                _ => return Err(TupleError::Truncated { offset: *pos }),
            }
        } else {
            out.push(b);
            *pos += 1;
        }
    }
}

fn read_fixed<const N: usize>(bytes: &[u8], pos: &mut usize) -> Result<[u8; N], TupleError> {
    if *pos + N > bytes.len() {
        return Err(TupleError::Truncated { offset: *pos });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[*pos..*pos + N]);
    *pos += N;
    Ok(out)
}

fn unpack_one(bytes: &[u8], pos: &mut usize) -> Result<Element, TupleError> {
    if *pos >= bytes.len() {
        return Err(TupleError::Truncated { offset: *pos });
    }
    let tag = bytes[*pos];
    *pos += 1;
    match tag {
        TAG_BYTES => Ok(Element::Bytes(read_escaped(bytes, pos)?)),
        TAG_STRING => {
            let raw = read_escaped(bytes, pos)?;
            String::from_utf8(raw).map(Element::String).map_err(|e| TupleError::InvalidUtf8(e.to_string()))
        }
        TAG_TUPLE => {
            let raw = read_escaped(bytes, pos)?;
            unpack(&raw).map(Element::Tuple)
        }
        TAG_INT => Ok(Element::Int(unflip_int(read_fixed(bytes, pos)?))),
        TAG_BOOL_FALSE => Ok(Element::Bool(false)),
        TAG_BOOL_TRUE => Ok(Element::Bool(true)),
        TAG_FLOAT => Ok(Element::Float(unpack_f32_bits(u32::from_be_bytes(read_fixed(bytes, pos)?)))),
        TAG_DOUBLE => Ok(Element::Double(unpack_f64_bits(u64::from_be_bytes(read_fixed(bytes, pos)?)))),
        TAG_TIMESTAMP => Ok(Element::Timestamp(unflip_int(read_fixed(bytes, pos)?))),
        TAG_VERSIONSTAMP => Ok(Element::Versionstamp(Versionstamp(read_fixed(bytes, pos)?))),
        other => Err(TupleError::UnknownTag { tag: other, offset: *pos - 1 }),
    }
}

/// Unpacks an entire byte slice into a tuple. All bytes must be consumed;
/// trailing bytes are an error rather than silently ignored.
pub fn unpack(bytes: &[u8]) -> Result<Tuple, TupleError> {
    let mut pos = 0;
    let mut out = Vec::new();
    while pos < bytes.len() {
        out.push(unpack_one(bytes, &mut pos)?);
    }
    if pos != bytes.len() {
        return Err(TupleError::TrailingBytes { consumed: pos, total: bytes.len() });
    }
    Ok(out)
}

/// Unpacks the first `n` elements from `bytes`, returning them along with
/// the byte offset immediately following the last one consumed. Used by
/// covering-index reconstruction (spec.md §4.9) to split a composite key
/// into its indexed-field and primary-key prefixes without needing their
/// exact boundary ahead of time.
pub fn unpack_prefix(bytes: &[u8], n: usize) -> Result<(Tuple, usize), TupleError> {
    let mut pos = 0;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(unpack_one(bytes, &mut pos)?);
    }
    Ok((out, pos))
}
