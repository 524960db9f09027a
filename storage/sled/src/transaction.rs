use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use recordlayer_core::{KvPair, RangeOptions, Result, Transaction};
use recordlayer_tuple::Versionstamp;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Tree;

use crate::error::{join_error, sled_error};

enum Mutation {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(Vec<u8>, Vec<u8>),
    AtomicAdd(Vec<u8>, i64),
    SetVersionstamped(Vec<u8>, Vec<u8>),
}

/// Buffers every mutation locally so `get`/`get_range` within the same
/// transaction observe prior writes, then replays the buffer against
/// `sled::Tree::transaction` at commit time for atomicity (mirrors
/// `recordlayer_core::testkv::MemoryTransaction`, swapping the in-memory
/// `BTreeMap` for a real `sled::Tree`).
pub struct SledTransaction {
    tree: Tree,
    db_version: Arc<AtomicU64>,
    mutations: Vec<Mutation>,
}

impl SledTransaction {
    pub(crate) fn new(tree: Tree, db_version: Arc<AtomicU64>) -> Self { SledTransaction { tree, db_version, mutations: Vec::new() } }

    fn local_overlay(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        let mut result = None;
        for m in &self.mutations {
            match m {
                Mutation::Set(k, v) if k.as_slice() == key => result = Some(Some(v.clone())),
                Mutation::Clear(k) if k.as_slice() == key => result = Some(None),
                Mutation::ClearRange(b, e) if key >= b.as_slice() && key < e.as_slice() => result = Some(None),
                _ => {}
            }
        }
        result
    }

    fn pending_delta(&self, key: &[u8]) -> i64 {
        self.mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::AtomicAdd(k, d) if k.as_slice() == key => Some(*d),
                _ => None,
            })
            .sum()
    }
}

#[async_trait]
impl Transaction for SledTransaction {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let base = match self.local_overlay(key) {
            Some(overlaid) => overlaid,
            None => {
                let tree = self.tree.clone();
                let key = key.to_vec();
                tokio::task::spawn_blocking(move || tree.get(key)).await.map_err(join_error)?.map_err(sled_error)?.map(|v| v.to_vec())
            }
        };
        let delta = self.pending_delta(key);
        if delta == 0 {
            return Ok(base);
        }
        let current = base.map(|b| i64::from_le_bytes(b.try_into().unwrap_or([0; 8]))).unwrap_or(0);
        Ok(Some((current + delta).to_le_bytes().to_vec()))
    }

    async fn get_range(&self, begin: &[u8], end: &[u8], opts: RangeOptions) -> Result<Vec<KvPair>> {
        let tree = self.tree.clone();
        let (b, e) = (begin.to_vec(), end.to_vec());
        let snapshot: Vec<KvPair> = tokio::task::spawn_blocking(move || -> std::result::Result<Vec<KvPair>, sled::Error> {
            tree.range(b..e).map(|r| r.map(|(k, v)| (k.to_vec(), v.to_vec()))).collect()
        })
        .await
        .map_err(join_error)?
        .map_err(sled_error)?;

        let mut merged: std::collections::BTreeMap<Vec<u8>, Vec<u8>> = snapshot.into_iter().collect();
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
        if self.mutations.is_empty() {
            return Ok(None);
        }

        // `ClearRange` is range-based but sled's transactional tree only
        // takes point operations, so the matching keys are resolved from a
        // snapshot read just before the transaction runs.
        let tree = self.tree.clone();
        let mut range_clears: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for m in &self.mutations {
            if let Mutation::ClearRange(b, e) = m {
                range_clears.push((b.clone(), e.clone()));
            }
        }
        let resolved_tree = tree.clone();
        let resolved: Vec<Vec<Vec<u8>>> = tokio::task::spawn_blocking(move || -> std::result::Result<Vec<Vec<Vec<u8>>>, sled::Error> {
            range_clears
                .into_iter()
                .map(|(b, e)| resolved_tree.range(b..e).map(|r| r.map(|(k, _)| k.to_vec())).collect::<std::result::Result<Vec<_>, _>>())
                .collect()
        })
        .await
        .map_err(join_error)?
        .map_err(sled_error)?;
        let mut range_iter = resolved.into_iter();

        let version = self.db_version.fetch_add(1, Ordering::SeqCst);
        let mut batch_order: u16 = 0;
        let mut assigned_versionstamp = None;
        let mut plan: Vec<PlannedOp> = Vec::new();
        for m in self.mutations {
            match m {
                Mutation::Set(k, v) => plan.push(PlannedOp::Insert(k, v)),
                Mutation::Clear(k) => plan.push(PlannedOp::Remove(k)),
                Mutation::ClearRange(..) => {
                    for k in range_iter.next().unwrap_or_default() {
                        plan.push(PlannedOp::Remove(k));
                    }
                }
                Mutation::AtomicAdd(k, d) => plan.push(PlannedOp::Add(k, d)),
                Mutation::SetVersionstamped(template, value) => {
                    let vs = Versionstamp::from_parts(version, batch_order);
                    batch_order += 1;
                    let key = substitute_versionstamp(&template, &vs);
                    plan.push(PlannedOp::Insert(key, value));
                    assigned_versionstamp = Some(vs);
                }
            }
        }

        let result: std::result::Result<(), TransactionError<sled::Error>> = tree.transaction(move |tx_tree| {
            for op in &plan {
                match op {
                    PlannedOp::Insert(k, v) => {
                        tx_tree.insert(k.as_slice(), v.as_slice())?;
                    }
                    PlannedOp::Remove(k) => {
                        tx_tree.remove(k.as_slice())?;
                    }
                    PlannedOp::Add(k, d) => {
                        let cur = tx_tree.get(k.as_slice())?.map(|b| i64::from_le_bytes(b.as_ref().try_into().unwrap_or([0; 8]))).unwrap_or(0);
                        tx_tree.insert(k.as_slice(), (cur + d).to_le_bytes().as_slice())?;
                    }
                }
            }
            Ok::<(), ConflictableTransactionError<sled::Error>>(())
        });
        result.map_err(|e| match e {
            TransactionError::Abort(err) => sled_error(err),
            TransactionError::Storage(err) => sled_error(err),
        })?;
        Ok(assigned_versionstamp)
    }

    async fn cancel(self: Box<Self>) {}
}

enum PlannedOp {
    Insert(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
    Add(Vec<u8>, i64),
}

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
