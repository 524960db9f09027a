use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use async_trait::async_trait;
use recordlayer_core::{Database, Result, Transaction};
use sled::{Config, Db, Tree};

use crate::error::sled_error;
use crate::transaction::SledTransaction;

/// A `recordlayer_core::Database` backed by a single `sled::Tree`. Every
/// record, index entry, and bookkeeping key (range sets, index state) lives
/// under one flat keyspace — the `Subspace` prefixes already partition it,
/// the way `recordlayer_core::testkv::MemoryDatabase` partitions its
/// `BTreeMap`.
pub struct SledDatabase {
    tree: Tree,
    db_version: Arc<AtomicU64>,
}

impl SledDatabase {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|e| sled_error(sled::Error::Io(e)))?;
        let db = sled::open(path.join("sled")).map_err(sled_error)?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self> {
        let tree = db.open_tree("recordlayer").map_err(sled_error)?;
        Ok(SledDatabase { tree, db_version: Arc::new(AtomicU64::new(1)) })
    }

    /// An ephemeral database for tests — never flushed to disk.
    pub fn temporary() -> Result<Self> {
        let db = Config::new().temporary(true).flush_every_ms(None).open().map_err(sled_error)?;
        Self::from_db(db)
    }

    pub fn flush(&self) -> Result<()> {
        self.tree.flush().map_err(sled_error)?;
        Ok(())
    }
}

#[async_trait]
impl Database for SledDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>> { Ok(Box::new(SledTransaction::new(self.tree.clone(), self.db_version.clone()))) }
}
