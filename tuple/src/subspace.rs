use crate::element::{Element, Tuple};
use crate::pack::pack_into;

/// A keyspace prefix (spec.md §4.2). Child subspaces are produced by
/// appending a tuple-encoded element to the prefix; the prefix itself need
/// not be tuple-encoded (it may be an externally assigned byte string, e.g.
/// a directory-layer UUID), so `Subspace` stores raw bytes rather than a
/// `Tuple`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self { Subspace { prefix: prefix.into() } }

    pub fn prefix(&self) -> &[u8] { &self.prefix }

    /// Appends a single packed element, returning the child subspace.
    pub fn child(&self, element: impl Into<Element>) -> Subspace {
        let mut prefix = self.prefix.clone();
        pack_into(&[element.into()], &mut prefix);
        Subspace { prefix }
    }

    /// Appends every element of `tuple` as one unit, returning the child
    /// subspace — equivalent to calling `child` once per element but
    /// avoids intermediate allocations.
    pub fn child_tuple(&self, tuple: &Tuple) -> Subspace {
        let mut prefix = self.prefix.clone();
        pack_into(tuple, &mut prefix);
        Subspace { prefix }
    }

    /// Packs `tuple` relative to this subspace: `prefix + pack(tuple)`.
    pub fn pack(&self, tuple: &Tuple) -> Vec<u8> {
        let mut out = self.prefix.clone();
        pack_into(tuple, &mut out);
        out
    }

    /// The `[begin, end)` scan range covering every key in this subspace
    /// and all of its children.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let begin = self.prefix.clone();
        let mut end = self.prefix.clone();
        end.push(0xFF);
        (begin, end)
    }

    /// The `[begin, end)` scan range for keys whose tuple-encoded suffix
    /// starts with `tuple` — i.e. all entries in the `tuple`-prefixed
    /// sub-range of this subspace.
    pub fn range_for(&self, tuple: &Tuple) -> (Vec<u8>, Vec<u8>) { self.child_tuple(tuple).range() }

    /// Strips this subspace's prefix from `key`, returning the remaining
    /// suffix bytes. Panics if `key` does not start with the prefix — keys
    /// returned by a range scan of this subspace always do.
    pub fn unpack_suffix<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        key.strip_prefix(self.prefix.as_slice()).expect("key does not belong to this subspace")
    }
}
