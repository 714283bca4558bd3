//! Wires the Store, Filter, and Event Fan-out into the shared state that the
//! Request Manager, Match Engine, and Rescan Driver all operate on (spec
//! §5's "Shared resources").

use std::path::Path;

use tokio::sync::{Mutex, RwLock};

use crate::error::Result;
use crate::events::EventHub;
use crate::filter::{Filter, FilterParams};
use crate::store::Store;

/// Shared engine state. Cheaply `Clone`-able (every field is already
/// internally shared); pass around as a value, not behind an extra `Arc`.
#[derive(Clone)]
pub struct Relay {
    pub store: Store,
    filter: std::sync::Arc<RwLock<Filter>>,
    /// Serializes the multi-step write paths named in spec §5: `addRequest`,
    /// `deleteRequest`, `wipe`, and the engine's per-block `nextout` write.
    /// Reads never take this lock.
    write_lock: std::sync::Arc<Mutex<()>>,
    pub events: std::sync::Arc<EventHub>,
}

/// Guard returned by `Relay::acquire_write`. Holds the process-wide write
/// lock and gives access to the Filter for the duration of a write.
pub struct WriteHandle<'a> {
    _permit: tokio::sync::MutexGuard<'a, ()>,
    filter: &'a RwLock<Filter>,
}

impl WriteHandle<'_> {
    pub async fn filter_add(&self, item: &[u8]) {
        self.filter.write().await.add(item);
    }

    pub async fn filter_replace(&self, filter: Filter) {
        *self.filter.write().await = filter;
    }
}

impl Relay {
    pub fn open(path: impl AsRef<Path>, filter_params: FilterParams) -> Result<Self> {
        let store = Store::open(path)?;
        let filter = Filter::rebuild(&store, filter_params)?;
        Ok(Relay {
            store,
            filter: std::sync::Arc::new(RwLock::new(filter)),
            write_lock: std::sync::Arc::new(Mutex::new(())),
            events: std::sync::Arc::new(EventHub::new(1024)),
        })
    }

    pub async fn filter_test(&self, item: &[u8]) -> bool {
        self.filter.read().await.test(item)
    }

    pub async fn acquire_write(&self) -> WriteHandle<'_> {
        WriteHandle {
            _permit: self.write_lock.lock().await,
            filter: &self.filter,
        }
    }

    /// Rebuild the Filter from whatever is currently on disk. Callers must
    /// invoke this after `wipe()` before resuming ingest (spec §4.F).
    pub async fn rebuild_filter(&self, params: FilterParams) -> Result<()> {
        let rebuilt = Filter::rebuild(&self.store, params)?;
        let handle = self.acquire_write().await;
        handle.filter_replace(rebuilt).await;
        Ok(())
    }
}
