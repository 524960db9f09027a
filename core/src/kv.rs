//! The abstract ordered key-value store contract (spec.md §6.1). This is a
//! pluggable collaborator, not part of the core's hard engineering surface:
//! every other module only ever talks to `dyn Database` / `dyn Transaction`,
//! never to a concrete backend. `recordlayer-storage-sled` is one concrete
//! implementation; `testkv` (this crate, behind `test-util`) is another,
//! used for unit and scenario tests.

use async_trait::async_trait;
use recordlayer_tuple::Versionstamp;

use crate::error::Result;

/// Options for a range scan (spec.md §6.1 `getRange`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeOptions {
    /// Snapshot reads skip conflict tracking — used by the rank index's
    /// top-down descent (spec.md §5) and by scrubber/builder sweeps that
    /// must not serialize against concurrent writers.
    pub snapshot: bool,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl RangeOptions {
    pub fn new() -> Self { Self::default() }
    pub fn snapshot(mut self, v: bool) -> Self {
        self.snapshot = v;
        self
    }
    pub fn reverse(mut self, v: bool) -> Self {
        self.reverse = v;
        self
    }
    pub fn limit(mut self, v: usize) -> Self {
        self.limit = Some(v);
        self
    }
}

/// A single entry returned from a range scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// An open, mutable transaction against a `Database`. All mutation methods
/// buffer the mutation locally; nothing is visible to other transactions
/// until `commit` succeeds (spec.md §5: "the commit provides atomicity").
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    async fn get_range(&self, begin: &[u8], end: &[u8], opts: RangeOptions) -> Result<Vec<KvPair>>;

    fn set(&mut self, key: &[u8], value: &[u8]);

    fn clear(&mut self, key: &[u8]);

    fn clear_range(&mut self, begin: &[u8], end: &[u8]);

    /// Adds `delta` to the little-endian 8-byte signed integer at `key`,
    /// treating a missing key as zero. Used exclusively for Count/Sum/Rank
    /// counters so concurrent writers never conflict on the same key
    /// (spec.md §5).
    fn atomic_add(&mut self, key: &[u8], delta: i64);

    /// Sets the value at `key` to the placeholder `value` with the last
    /// incomplete versionstamp (10 bytes of `0xFF`) substituted for the
    /// commit versionstamp (spec.md §4.7, §6.1).
    fn set_versionstamped_key(&mut self, key_template: &[u8], value: &[u8]);

    /// Commits the transaction. On success, returns the versionstamp
    /// assigned to this commit if any versionstamped mutation was issued.
    async fn commit(self: Box<Self>) -> Result<Option<Versionstamp>>;

    async fn cancel(self: Box<Self>);
}

/// A handle to the underlying ordered KV store. Implementors provide
/// `begin()`; everything else is expressed against the returned
/// `Transaction`.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}
