//! Ordered key-value persistence (spec §4.B).
//!
//! One RocksDB instance, one column family per key-space prefix from §4.A
//! (`s`, `o`, `i`, plus a `meta` family for the schema version). This is the
//! idiomatic realization of "prefixes within one ordered store" for this
//! engine: column families already give prefix-scoped range scans and
//! iteration order for free, the same way the host node's other indexers use
//! them.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rocksdb::{ColumnFamilyRef, IteratorMode, Options, WriteBatch, DB};

use crate::error::{Error, Result};

pub const CF_SCRIPTS: &str = "scripts";
pub const CF_OUTPOINTS: &str = "outpoints";
pub const CF_REQUESTS: &str = "requests";
pub const CF_META: &str = "meta";

pub const SCHEMA_VERSION_KEY: &[u8] = b"V";
pub const SCHEMA_VERSION: u32 = 1;

const ALL_COLUMN_FAMILIES: [&str; 4] = [CF_SCRIPTS, CF_OUTPOINTS, CF_REQUESTS, CF_META];

/// The persistence layer. Cheaply `Clone`-able; all clones share one
/// underlying `DB` handle.
#[derive(Clone)]
pub struct Store {
    db: Arc<DB>,
    batch_active: Arc<AtomicBool>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, ALL_COLUMN_FAMILIES)?;

        let store = Store {
            db: Arc::new(db),
            batch_active: Arc::new(AtomicBool::new(false)),
        };
        store.ensure_schema_version()?;
        Ok(store)
    }

    fn ensure_schema_version(&self) -> Result<()> {
        let meta = self.cf(CF_META);
        if self.db.get_cf(&meta, SCHEMA_VERSION_KEY)?.is_none() {
            self.db
                .put_cf(&meta, SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<u32> {
        let meta = self.cf(CF_META);
        match self.db.get_cf(&meta, SCHEMA_VERSION_KEY)? {
            Some(bytes) if bytes.len() == 4 => {
                Ok(u32::from_le_bytes(bytes.as_slice().try_into().unwrap()))
            }
            Some(_) => Err(Error::Codec("schema version record malformed".into())),
            None => Err(Error::NotFound),
        }
    }

    pub fn destroy(path: impl AsRef<Path>) -> Result<()> {
        DB::destroy(&Options::default(), path).map_err(Error::from)
    }

    fn cf(&self, name: &str) -> ColumnFamilyRef<'_> {
        self.db
            .cf_handle(name)
            .unwrap_or_else(|| panic!("missing column family {name}"))
    }

    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(&self.cf(cf_name), key)?)
    }

    pub fn has(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        Ok(self.get(cf_name, key)?.is_some())
    }

    /// Single-key put outside of a batch, used by paths that don't need
    /// cross-family atomicity (tests, schema bootstrap).
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put_cf(&self.cf(cf_name), key, value)?;
        Ok(())
    }

    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        self.db.delete_cf(&self.cf(cf_name), key)?;
        Ok(())
    }

    /// Iterate a column family from the start in key order.
    pub fn iter(&self, cf_name: &str) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + '_ {
        self.db
            .iterator_cf(&self.cf(cf_name), IteratorMode::Start)
            .map(|res| res.map_err(Error::from))
    }

    /// Iterate a column family starting at (and including) `from`.
    pub fn iter_from<'a>(
        &'a self,
        cf_name: &str,
        from: &'a [u8],
    ) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + 'a {
        self.db
            .iterator_cf(
                &self.cf(cf_name),
                IteratorMode::From(from, rocksdb::Direction::Forward),
            )
            .map(|res| res.map_err(Error::from))
    }

    /// Iterate a column family in reverse, starting at (and including) `from`.
    pub fn iter_rev_from<'a>(
        &'a self,
        cf_name: &str,
        from: &'a [u8],
    ) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + 'a {
        self.db
            .iterator_cf(
                &self.cf(cf_name),
                IteratorMode::From(from, rocksdb::Direction::Reverse),
            )
            .map(|res| res.map_err(Error::from))
    }

    pub fn is_empty(&self, cf_name: &str) -> bool {
        self.iter(cf_name).next().is_none()
    }

    /// Open a batch. Only one batch may be active per `Store` at a time;
    /// this mirrors the single-writer discipline of §5 at the storage layer
    /// itself, independent of whatever higher-level write-lock the caller
    /// also holds.
    pub fn start(&self) -> Result<WriteGuard<'_>> {
        if self
            .batch_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Storage("a batch is already active".into()));
        }
        Ok(WriteGuard {
            store: self,
            batch: Some(WriteBatch::default()),
        })
    }

    /// Wipe every key under the `scripts`, `outpoints`, and `requests`
    /// column families in one batch (spec §4.F `wipe`). The caller remains
    /// responsible for rebuilding the Filter afterwards.
    pub fn wipe(&self) -> Result<()> {
        let mut guard = self.start()?;
        for cf_name in [CF_SCRIPTS, CF_OUTPOINTS, CF_REQUESTS] {
            let keys: Vec<Box<[u8]>> = self
                .iter(cf_name)
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            for key in keys {
                guard.delete(cf_name, &key);
            }
        }
        guard.commit()
    }
}

/// An open batch. `put`/`delete` buffer writes; `commit` flushes them
/// atomically; dropping without committing aborts (logs a warning — this is
/// always a programmer error, never a runtime condition).
pub struct WriteGuard<'a> {
    store: &'a Store,
    batch: Option<WriteBatch>,
}

impl WriteGuard<'_> {
    pub fn put(&mut self, cf_name: &str, key: &[u8], value: &[u8]) {
        let cf = self.store.cf(cf_name);
        self.batch.as_mut().unwrap().put_cf(&cf, key, value);
    }

    pub fn delete(&mut self, cf_name: &str, key: &[u8]) {
        let cf = self.store.cf(cf_name);
        self.batch.as_mut().unwrap().delete_cf(&cf, key);
    }

    pub fn commit(mut self) -> Result<()> {
        let batch = self.batch.take().expect("batch taken twice");
        self.store.db.write(batch)?;
        self.store.batch_active.store(false, Ordering::Release);
        Ok(())
    }

    /// Explicit discard. Equivalent to dropping the guard, spelled out for
    /// call sites that want to make the abort visible.
    pub fn abort(mut self) {
        self.batch.take();
        self.store.batch_active.store(false, Ordering::Release);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.batch.take().is_some() {
            tracing::warn!("write batch dropped without commit or explicit abort");
            self.store.batch_active.store(false, Ordering::Release);
        }
    }
}
