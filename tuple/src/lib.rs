//! Order-preserving tuple codec and subspace keyspace.
//!
//! This is the foundational dependency of the record layer: every other
//! component builds keys by packing tuples into bytes via this crate, and
//! relies on the guarantee that `a < b` in Rust's natural per-type order iff
//! `pack(a) < pack(b)` lexicographically.

mod element;
mod error;
mod pack;
mod subspace;
mod unpack;
mod versionstamp;

pub use element::{Element, Tuple};
pub use error::TupleError;
pub use pack::pack;
pub use subspace::Subspace;
pub use unpack::{unpack, unpack_prefix};
pub use versionstamp::Versionstamp;

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(t: Tuple) {
        let packed = pack(&t);
        let back = unpack(&packed).expect("unpack");
        assert_eq!(t, back);
    }

    #[test]
    fn roundtrip_scalars() {
        roundtrip(vec![Element::Int(42)]);
        roundtrip(vec![Element::Int(-42)]);
        roundtrip(vec![Element::Int(i64::MIN)]);
        roundtrip(vec![Element::Int(i64::MAX)]);
        roundtrip(vec![Element::String("hello".into())]);
        roundtrip(vec![Element::String("".into())]);
        roundtrip(vec![Element::Bytes(vec![0x00, 0xFF, 0x01])]);
        roundtrip(vec![Element::Bool(true)]);
        roundtrip(vec![Element::Bool(false)]);
        roundtrip(vec![Element::Double(3.5)]);
        roundtrip(vec![Element::Double(-3.5)]);
        roundtrip(vec![Element::Float(1.25)]);
        roundtrip(vec![Element::Timestamp(-1)]);
        roundtrip(vec![Element::Versionstamp(Versionstamp::from_parts(7, 2))]);
    }

    #[test]
    fn roundtrip_nested_and_composite() {
        roundtrip(vec![
            Element::String("a".into()),
            Element::Tuple(vec![Element::Int(1), Element::Int(2)]),
            Element::Int(9),
        ]);
    }

    #[test]
    fn integer_order_preserved_across_sign() {
        let values: [i64; 7] = [i64::MIN, -1_000_000_000, -1, 0, 1, 1_000_000_000, i64::MAX];
        let mut packed: Vec<Vec<u8>> = values.iter().map(|v| pack(&vec![Element::Int(*v)])).collect();
        let sorted_original = packed.clone();
        packed.sort();
        assert_eq!(packed, sorted_original, "packed bytes must already be in ascending order");
    }

    #[test]
    fn double_order_preserved_across_sign() {
        let values = [f64::NEG_INFINITY, -100.0, -0.001, 0.0, 0.001, 100.0, f64::INFINITY];
        let mut packed: Vec<Vec<u8>> = values.iter().map(|v| pack(&vec![Element::Double(*v)])).collect();
        let sorted_original = packed.clone();
        packed.sort();
        assert_eq!(packed, sorted_original);
    }

    #[test]
    fn string_order_preserved() {
        let values = ["", "a", "aa", "ab", "b", "\u{1F600}", "z"];
        let mut packed: Vec<Vec<u8>> = values.iter().map(|v| pack(&vec![Element::String((*v).into())])).collect();
        let sorted_original = packed.clone();
        packed.sort();
        assert_eq!(packed, sorted_original);
    }

    #[test]
    fn bytes_with_null_and_ff_roundtrip() {
        roundtrip(vec![Element::Bytes(vec![0x00, 0x00, 0xFF, 0xFF, 0x00])]);
    }

    #[test]
    fn very_long_string_roundtrips() {
        let long = "x".repeat(10_000);
        roundtrip(vec![Element::String(long)]);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut packed = pack(&vec![Element::Int(1)]);
        packed.push(0xAB);
        assert!(unpack(&packed).is_err());
    }

    #[test]
    fn subspace_child_ranges() {
        let root = Subspace::new(b"root".to_vec());
        let child = root.child("users");
        let (begin, end) = child.range();
        assert!(begin.starts_with(b"root"));
        assert!(end > begin);
    }

    #[test]
    fn subspace_pack_unpack_roundtrip() {
        let root = Subspace::new(b"P".to_vec());
        let sub = root.child("I").child("idx");
        let key = sub.pack(&vec![Element::String("a@x".into()), Element::Int(1)]);
        let suffix = sub.unpack_suffix(&key);
        let tuple = unpack(suffix).unwrap();
        assert_eq!(tuple, vec![Element::String("a@x".into()), Element::Int(1)]);
    }

    #[test]
    fn empty_range_scan_bounds_are_well_formed() {
        let sub = Subspace::new(Vec::new());
        let (begin, end) = sub.range();
        assert!(begin <= end);
    }
}
