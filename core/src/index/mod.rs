//! Index maintainers (spec.md §3.1 component 6, §4.4–§4.9): for a given
//! diff `(old?, new?)`, compute and apply the set of index mutations.
//!
//! Maintainers operate purely on already-extracted tuples and raw
//! primary-key tuples — the generic work of evaluating each index's
//! `KeyExpression` against a typed record lives in `IndexManager`
//! (`crate::index_manager`), which is the only place that needs to know
//! about `RecordAccess`. That keeps every maintainer here a plain,
//! non-generic struct, matching spec.md §9's preference for "a tagged
//! variant... avoid deep inheritance... each variant is a small plain
//! struct".

mod count_sum;
mod covering;
mod minmax;
mod permuted;
mod rank;
mod value;
mod version;
mod vector;

pub use count_sum::{CountMaintainer, SumMaintainer};
pub use covering::CoveringMaintainer;
pub use minmax::{MaxMaintainer, MinMaintainer};
pub use permuted::PermutedMaintainer;
pub use rank::RankMaintainer;
pub use value::ValueMaintainer;
pub use version::VersionMaintainer;
pub use vector::VectorMaintainer;

use async_trait::async_trait;
use recordlayer_tuple::Tuple;

use crate::error::Result;
use crate::kv::Transaction;

/// The pre-computed diff an `IndexManager` hands to a maintainer on every
/// write. `old_tuples`/`new_tuples` are the index's `root_expr` evaluated
/// against the old/new record (spec.md §4.3); both lists share the same
/// arity. `old_covering`/`new_covering` are populated only for covering
/// indexes.
pub struct IndexDiff<'a> {
    pub old_tuples: &'a [Tuple],
    pub new_tuples: &'a [Tuple],
    pub old_pk: Option<&'a Tuple>,
    pub new_pk: Option<&'a Tuple>,
    pub old_covering: Option<&'a Tuple>,
    pub new_covering: Option<&'a Tuple>,
}

#[async_trait]
pub trait IndexMaintainer: Send + Sync {
    /// Applies the mutations implied by `diff` to `txn`.
    async fn update(&self, diff: &IndexDiff<'_>, txn: &mut dyn Transaction) -> Result<()>;
}

/// Splits `old` vs `new` into (removed, added) by tuple equality — the
/// `Kold \ Knew` / `Knew \ Kold` set difference spec.md §4.4 describes.
/// Treated as sets rather than multisets: a record whose multi-valued
/// field repeats the same tuple twice is assumed not to occur in practice.
pub(crate) fn list_diff(old: &[Tuple], new: &[Tuple]) -> (Vec<Tuple>, Vec<Tuple>) {
    let removed = old.iter().filter(|o| !new.contains(o)).cloned().collect();
    let added = new.iter().filter(|n| !old.contains(n)).cloned().collect();
    (removed, added)
}

/// Decodes an 8-byte little-endian atomic counter, defaulting missing keys
/// to zero (spec.md §6.2: "Count values are 8-byte little-endian signed
/// integers").
pub(crate) fn decode_counter(bytes: Option<Vec<u8>>) -> i64 {
    bytes.map(|b| i64::from_le_bytes(b.as_slice().try_into().unwrap_or([0; 8]))).unwrap_or(0)
}

/// Appends `pk` to the end of `tuple`, producing the composite key tuple
/// used for Value/Min/Max/Rank-leaf entries (the primary key is a tiebreak
/// so multiple records sharing an indexed value each get a distinct key).
pub(crate) fn with_pk(tuple: &Tuple, pk: &Tuple) -> Tuple {
    let mut out = tuple.clone();
    out.extend(pk.iter().cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_tuple::Element;

    #[test]
    fn list_diff_computes_set_difference() {
        let old = vec![vec![Element::Int(1)], vec![Element::Int(2)]];
        let new = vec![vec![Element::Int(2)], vec![Element::Int(3)]];
        let (removed, added) = list_diff(&old, &new);
        assert_eq!(removed, vec![vec![Element::Int(1)]]);
        assert_eq!(added, vec![vec![Element::Int(3)]]);
    }
}
