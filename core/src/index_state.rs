//! Index state manager (spec.md §3.1, component 8): persists and
//! atomically transitions each index's lifecycle state.

use recordlayer_tuple::Subspace;

use crate::error::Result;
use crate::kv::Transaction;

/// An index's lifecycle state (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Disabled,
    WriteOnly,
    Readable,
}

impl IndexState {
    fn to_byte(self) -> u8 {
        match self {
            IndexState::Disabled => 0,
            IndexState::WriteOnly => 1,
            IndexState::Readable => 2,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(IndexState::Disabled),
            1 => Some(IndexState::WriteOnly),
            2 => Some(IndexState::Readable),
            _ => None,
        }
    }

    pub fn is_at_least_write_only(self) -> bool { !matches!(self, IndexState::Disabled) }
}

/// Reads and writes index state under `P/S/<index_name>` (spec.md §6.2).
/// Every read and write goes through a caller-supplied transaction, so
/// state observed during a save is consistent with that save's own commit
/// (spec.md §5: "Index state reads are per-save (once) and cached only
/// within one transaction; transitions are themselves transactional").
pub struct IndexStateManager {
    subspace: Subspace,
}

impl IndexStateManager {
    pub fn new(store_root: &Subspace) -> Self { IndexStateManager { subspace: store_root.child("S") } }

    pub async fn get(&self, txn: &dyn Transaction, index_name: &str) -> Result<IndexState> {
        let key = self.subspace.child(index_name).prefix().to_vec();
        match txn.get(&key).await? {
            Some(bytes) => Ok(bytes.first().copied().and_then(IndexState::from_byte).unwrap_or(IndexState::Disabled)),
            None => Ok(IndexState::Disabled),
        }
    }

    pub fn set(&self, txn: &mut dyn Transaction, index_name: &str, state: IndexState) {
        let key = self.subspace.child(index_name).prefix().to_vec();
        txn.set(&key, &[state.to_byte()]);
    }

    pub fn clear(&self, txn: &mut dyn Transaction, index_name: &str) {
        let key = self.subspace.child(index_name).prefix().to_vec();
        txn.clear(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip() {
        for s in [IndexState::Disabled, IndexState::WriteOnly, IndexState::Readable] {
            assert_eq!(IndexState::from_byte(s.to_byte()), Some(s));
        }
    }
}
