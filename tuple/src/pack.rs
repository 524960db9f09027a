use crate::element::{Element, Tuple};

// Type tags. Ordering across tags is not required by the contract (only
// same-type comparisons must be order-preserving) but is kept monotonic
// here anyway so mixed-type ranges behave predictably.
pub(crate) const TAG_BYTES: u8 = 0x01;
pub(crate) const TAG_STRING: u8 = 0x02;
pub(crate) const TAG_TUPLE: u8 = 0x03;
pub(crate) const TAG_INT: u8 = 0x04;
pub(crate) const TAG_BOOL_FALSE: u8 = 0x05;
pub(crate) const TAG_BOOL_TRUE: u8 = 0x06;
pub(crate) const TAG_FLOAT: u8 = 0x07;
pub(crate) const TAG_DOUBLE: u8 = 0x08;
pub(crate) const TAG_TIMESTAMP: u8 = 0x09;
pub(crate) const TAG_VERSIONSTAMP: u8 = 0x0a;

/// Escapes `0x00` as `0x00 0xFF` and terminates with `0x00 0x00`, the same
/// scheme FoundationDB's tuple layer uses for byte strings so that
/// lexicographic order of the escaped form matches the unescaped form.
fn escape_into(raw: &[u8], out: &mut Vec<u8>) {
    for &b in raw {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
}

/// Sign-flips the top bit of a big-endian signed integer so that
/// lexicographic order of the bytes matches numeric order across the full
/// range, including negatives.
fn pack_int(value: i64, out: &mut Vec<u8>) {
    let flipped = (value as u64) ^ (1u64 << 63);
    out.extend_from_slice(&flipped.to_be_bytes());
}

pub(crate) fn unflip_int(bytes: [u8; 8]) -> i64 {
    let flipped = u64::from_be_bytes(bytes);
    (flipped ^ (1u64 << 63)) as i64
}

/// Standard order-preserving float encoding: flip the sign bit for
/// non-negative values, flip all bits for negative values (and NaN, which
/// sorts last either way since it is already the largest bit pattern).
fn pack_f64_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if value.is_sign_negative() { !bits } else { bits ^ (1u64 << 63) }
}

pub(crate) fn unpack_f64_bits(bits: u64) -> f64 {
    let is_negative = bits & (1u64 << 63) == 0;
    let orig = if is_negative { !bits } else { bits ^ (1u64 << 63) };
    f64::from_bits(orig)
}

fn pack_f32_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if value.is_sign_negative() { !bits } else { bits ^ (1u32 << 31) }
}

pub(crate) fn unpack_f32_bits(bits: u32) -> f32 {
    let is_negative = bits & (1u32 << 31) == 0;
    let orig = if is_negative { !bits } else { bits ^ (1u32 << 31) };
    f32::from_bits(orig)
}

fn pack_element(elem: &Element, out: &mut Vec<u8>) {
    match elem {
        Element::Bytes(b) => {
            out.push(TAG_BYTES);
            escape_into(b, out);
        }
        Element::String(s) => {
            out.push(TAG_STRING);
            escape_into(s.as_bytes(), out);
        }
        Element::Tuple(children) => {
            out.push(TAG_TUPLE);
            let mut inner = Vec::new();
            pack_into(children, &mut inner);
            escape_into(&inner, out);
        }
        Element::Int(i) => {
            out.push(TAG_INT);
            pack_int(*i, out);
        }
        Element::Bool(false) => out.push(TAG_BOOL_FALSE),
        Element::Bool(true) => out.push(TAG_BOOL_TRUE),
        Element::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&pack_f32_bits(*f).to_be_bytes());
        }
        Element::Double(d) => {
            out.push(TAG_DOUBLE);
            out.extend_from_slice(&pack_f64_bits(*d).to_be_bytes());
        }
        Element::Timestamp(nanos) => {
            out.push(TAG_TIMESTAMP);
            pack_int(*nanos, out);
        }
        Element::Versionstamp(vs) => {
            out.push(TAG_VERSIONSTAMP);
            out.extend_from_slice(vs.as_bytes());
        }
    }
}

pub(crate) fn pack_into(tuple: &[Element], out: &mut Vec<u8>) {
    for elem in tuple {
        pack_element(elem, out);
    }
}

/// Packs a tuple to its order-preserving byte representation.
pub fn pack(tuple: &Tuple) -> Vec<u8> {
    let mut out = Vec::new();
    pack_into(tuple, &mut out);
    out
}
