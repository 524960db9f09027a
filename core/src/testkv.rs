//! An in-memory `Database`/`Transaction` implementation used by this
//! crate's own unit tests and by the scenario tests under `tests/`
//! (spec.md §8.2). Not a production backend — see
//! `recordlayer-storage-sled` for one. Gated behind `test-util` so
//! downstream integration tests can use it without pulling it into release
//! builds (mirrors `ankurah-core`'s `#[cfg(feature = "wasm")]`-gated
//! optional modules).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recordlayer_tuple::Versionstamp;

use crate::error::Result;
use crate::kv::{Database, KvPair, RangeOptions, Transaction};

#[derive(Default)]
struct Store {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

enum Mutation {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(Vec<u8>, Vec<u8>),
    AtomicAdd(Vec<u8>, i64),
    SetVersionstamped(Vec<u8>, Vec<u8>),
}

pub struct MemoryDatabase {
    store: Arc<Mutex<Store>>,
    db_version: Arc<AtomicU64>,
}

impl MemoryDatabase {
    pub fn new() -> Self { MemoryDatabase { store: Arc::new(Mutex::new(Store::default())), db_version: Arc::new(AtomicU64::new(1)) } }
}

impl Default for MemoryDatabase {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction { store: self.store.clone(), db_version: self.db_version.clone(), mutations: Vec::new() }))
    }
}

pub struct MemoryTransaction {
    store: Arc<Mutex<Store>>,
    db_version: Arc<AtomicU64>,
    mutations: Vec<Mutation>,
}

impl MemoryTransaction {
    /// Applies `set`/`clear` mutations buffered so far, in order, so a
    /// `get` within the same transaction observes its own writes.
    fn local_overlay(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        let mut result = None;
        for m in &self.mutations {
            match m {
                Mutation::Set(k, v) if k == key => result = Some(Some(v.clone())),
                Mutation::Clear(k) if k == key => result = Some(None),
                Mutation::ClearRange(b, e) if key >= b.as_slice() && key < e.as_slice() => result = Some(None),
                Mutation::AtomicAdd(k, _) if k == key => { /* resolved lazily in get() */ }
                _ => {}
            }
        }
        result
    }

    fn pending_delta(&self, key: &[u8]) -> i64 {
        self.mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::AtomicAdd(k, d) if k == key => Some(*d),
                _ => None,
            })
            .sum()
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let base = match self.local_overlay(key) {
            Some(overlaid) => overlaid,
            None => self.store.lock().unwrap().map.get(key).cloned(),
        };
        let delta = self.pending_delta(key);
        if delta == 0 {
            return Ok(base);
        }
        let current = base.map(|b| i64::from_le_bytes(b.try_into().unwrap_or([0; 8]))).unwrap_or(0);
        Ok(Some((current + delta).to_le_bytes().to_vec()))
    }

    async fn get_range(&self, begin: &[u8], end: &[u8], opts: RangeOptions) -> Result<Vec<KvPair>> {
        let snapshot: Vec<KvPair> = {
            let store = self.store.lock().unwrap();
            store.map.range(begin.to_vec()..end.to_vec()).map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        // Overlay buffered mutations on top of the committed snapshot.
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = snapshot.into_iter().collect();
        for m in &self.mutations {
            match m {
                Mutation::Set(k, v) if k.as_slice() >= begin && k.as_slice() < end => {
                    merged.insert(k.clone(), v.clone());
                }
                Mutation::Clear(k) => {
                    merged.remove(k);
                }
                Mutation::ClearRange(b, e) => {
                    merged.retain(|k, _| !(k >= b && k < e));
                }
                Mutation::AtomicAdd(k, d) if k.as_slice() >= begin && k.as_slice() < end => {
                    let cur = merged.get(k).map(|b| i64::from_le_bytes(b.as_slice().try_into().unwrap_or([0; 8]))).unwrap_or(0);
                    merged.insert(k.clone(), (cur + d).to_le_bytes().to_vec());
                }
                _ => {}
            }
        }
        let mut rows: Vec<KvPair> = merged.into_iter().collect();
        if opts.reverse {
            rows.reverse();
        }
        if let Some(limit) = opts.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) { self.mutations.push(Mutation::Set(key.to_vec(), value.to_vec())); }

    fn clear(&mut self, key: &[u8]) { self.mutations.push(Mutation::Clear(key.to_vec())); }

    fn clear_range(&mut self, begin: &[u8], end: &[u8]) { self.mutations.push(Mutation::ClearRange(begin.to_vec(), end.to_vec())); }

    fn atomic_add(&mut self, key: &[u8], delta: i64) { self.mutations.push(Mutation::AtomicAdd(key.to_vec(), delta)); }

    fn set_versionstamped_key(&mut self, key_template: &[u8], value: &[u8]) {
        self.mutations.push(Mutation::SetVersionstamped(key_template.to_vec(), value.to_vec()));
    }

    async fn commit(self: Box<Self>) -> Result<Option<Versionstamp>> {
        let version = self.db_version.fetch_add(1, Ordering::SeqCst);
        let mut batch_order: u16 = 0;
        let mut assigned_versionstamp = None;
        let mut store = self.store.lock().unwrap();
        for m in self.mutations {
            match m {
                Mutation::Set(k, v) => {
                    store.map.insert(k, v);
                }
                Mutation::Clear(k) => {
                    store.map.remove(&k);
                }
                Mutation::ClearRange(b, e) => {
                    let keys: Vec<Vec<u8>> = store.map.range(b..e).map(|(k, _)| k.clone()).collect();
                    for k in keys {
                        store.map.remove(&k);
                    }
                }
                Mutation::AtomicAdd(k, d) => {
                    let cur = store.map.get(&k).map(|b| i64::from_le_bytes(b.as_slice().try_into().unwrap_or([0; 8]))).unwrap_or(0);
                    store.map.insert(k, (cur + d).to_le_bytes().to_vec());
                }
                Mutation::SetVersionstamped(template, value) => {
                    let vs = Versionstamp::from_parts(version, batch_order);
                    batch_order += 1;
                    let key = substitute_versionstamp(&template, &vs);
                    store.map.insert(key, value);
                    assigned_versionstamp = Some(vs);
                }
            }
        }
        Ok(assigned_versionstamp)
    }

    async fn cancel(self: Box<Self>) {}
}

/// Replaces the 10-byte incomplete-versionstamp placeholder embedded in
/// `template` with the real assigned versionstamp.
fn substitute_versionstamp(template: &[u8], vs: &Versionstamp) -> Vec<u8> {
    let placeholder = Versionstamp::INCOMPLETE.0;
    if let Some(pos) = template.windows(10).position(|w| w == placeholder) {
        let mut out = template.to_vec();
        out[pos..pos + 10].copy_from_slice(vs.as_bytes());
        out
    } else {
        template.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_commit_roundtrip() {
        let db = MemoryDatabase::new();
        let mut txn = db.begin().await.unwrap();
        txn.set(b"k", b"v");
        assert_eq!(txn.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        assert_eq!(txn2.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn atomic_add_accumulates() {
        let db = MemoryDatabase::new();
        let mut txn = db.begin().await.unwrap();
        txn.atomic_add(b"counter", 5);
        txn.atomic_add(b"counter", -2);
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let v = txn2.get(b"counter").await.unwrap().unwrap();
        assert_eq!(i64::from_le_bytes(v.try_into().unwrap()), 3);
    }

    #[tokio::test]
    async fn versionstamp_substitution() {
        let db = MemoryDatabase::new();
        let mut txn = db.begin().await.unwrap();
        let mut template = b"prefix".to_vec();
        template.extend_from_slice(&Versionstamp::INCOMPLETE.0);
        txn.set_versionstamped_key(&template, b"value");
        let vs = txn.commit().await.unwrap().unwrap();
        assert!(!vs.is_incomplete());
    }
}
