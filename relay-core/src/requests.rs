//! Write path (spec §4.F): persisting a Request atomically with its derived
//! index entries, updating the Filter only after a successful commit, and
//! the tombstone/wipe operations.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{OutpointRecord, Request, RequestId, ScriptRecord};
use crate::error::Result;
use crate::filter::FilterParams;
use crate::index::{OutpointIndex, RequestIndex, ScriptIndex};
use crate::relay::Relay;

/// Seconds since the epoch, clamped to `u32`. The clock used to stamp a
/// Request's `timestamp` at persistence time so it can't be forged by a
/// caller (spec §4.F).
fn now_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// The outcome of `add_request`: the persisted Request plus whichever
/// derived records were touched, matching the HTTP boundary's response
/// shape (spec §6 `PUT /relay/request`).
pub struct AddOutcome {
    pub request: Request,
    pub outpoint: Option<OutpointRecord>,
    pub script: Option<ScriptRecord>,
}

pub struct RequestManager {
    relay: Relay,
}

impl RequestManager {
    pub fn new(relay: Relay) -> Self {
        RequestManager { relay }
    }

    /// Atomically persists `req` plus its derived index entries, then adds
    /// the new keys to the Filter (spec §4.F steps 1-7). `req.timestamp` is
    /// overwritten with the current time here; callers cannot forge it.
    pub async fn add_request(&self, mut req: Request) -> Result<AddOutcome> {
        req.timestamp = now_timestamp();
        req.validate()?;

        let handle = self.relay.acquire_write().await;
        let store = self.relay.store.clone();
        let mut guard = store.start()?;

        RequestIndex::stage_put(&mut guard, &req);

        let outpoint = match req.spends {
            Some(prevout) => Some(OutpointIndex::stage_put(
                &store,
                &mut guard,
                OutpointRecord::new(prevout, vec![req.id]),
            )?),
            None => None,
        };

        let script = match &req.pays {
            Some(script) => Some(ScriptIndex::stage_put(
                &store,
                &mut guard,
                ScriptRecord::new(script.clone(), vec![req.id]),
            )?),
            None => None,
        };

        guard.commit()?;

        if let Some(rec) = &outpoint {
            handle.filter_add(&rec.prevout.key_bytes()).await;
        }
        if let Some(rec) = &script {
            handle.filter_add(rec.script.as_bytes()).await;
        }

        Ok(AddOutcome {
            request: req,
            outpoint,
            script,
        })
    }

    /// Removes only the `i/…` row (spec §9 Open Question 1: reverse-index
    /// cleanup is not implemented in this version).
    pub async fn delete_request(&self, id: RequestId) -> Result<()> {
        let _handle = self.relay.acquire_write().await;
        RequestIndex::delete(&self.relay.store, id)
    }

    /// Clears every Request/OutpointRecord/ScriptRecord in one batch and
    /// rebuilds the Filter from the now-empty store (spec §4.F `wipe`).
    pub async fn wipe(&self, filter_params: FilterParams) -> Result<()> {
        {
            let _handle = self.relay.acquire_write().await;
            self.relay.store.wipe()?;
        }
        self.relay.rebuild_filter(filter_params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{ScriptBuf, Txid};

    async fn with_relay<T, Fut>(op: impl FnOnce(Relay) -> Fut) -> T
    where
        Fut: std::future::Future<Output = T>,
    {
        let dir = tempfile::tempdir().unwrap();
        let relay = Relay::open(dir.path(), FilterParams::default()).unwrap();
        let out = op(relay).await;
        crate::store::Store::destroy(dir.path()).unwrap();
        out
    }

    fn req_with_script(id: u8, script: ScriptBuf) -> Request {
        Request {
            id: RequestId([id; 32]),
            address: [0; 20],
            value: 0,
            spends: None,
            pays: Some(script),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn add_request_persists_and_indexes_atomically() {
        with_relay(|relay| async move {
            let manager = RequestManager::new(relay.clone());
            let script = ScriptBuf::from_bytes(vec![0x51]);
            let outcome = manager
                .add_request(req_with_script(1, script.clone()))
                .await
                .unwrap();

            assert!(outcome.outpoint.is_none());
            assert_eq!(outcome.script.unwrap().requests, vec![RequestId([1; 32])]);
            assert!(RequestIndex::get(&relay.store, RequestId([1; 32]))
                .unwrap()
                .is_some());
            assert!(relay.filter_test(script.as_bytes()).await);
        })
        .await;
    }

    #[tokio::test]
    async fn add_request_rejects_empty_reference() {
        with_relay(|relay| async move {
            let manager = RequestManager::new(relay.clone());
            let req = Request {
                id: RequestId([1; 32]),
                address: [0; 20],
                value: 0,
                spends: None,
                pays: None,
                timestamp: 0,
            };
            assert!(manager.add_request(req).await.is_err());
        })
        .await;
    }

    #[tokio::test]
    async fn union_semantics_across_two_requests_on_same_outpoint() {
        with_relay(|relay| async move {
            let manager = RequestManager::new(relay.clone());
            let prevout = crate::codec::Outpoint {
                txid: Txid::from_byte_array([7; 32]),
                index: 0,
            };
            manager
                .add_request(Request {
                    id: RequestId([1; 32]),
                    address: [0; 20],
                    value: 0,
                    spends: Some(prevout),
                    pays: None,
                    timestamp: 0,
                })
                .await
                .unwrap();
            manager
                .add_request(Request {
                    id: RequestId([2; 32]),
                    address: [0; 20],
                    value: 0,
                    spends: Some(prevout),
                    pays: None,
                    timestamp: 0,
                })
                .await
                .unwrap();

            let rec = OutpointIndex::get(&relay.store, prevout).unwrap().unwrap();
            assert_eq!(rec.requests, vec![RequestId([1; 32]), RequestId([2; 32])]);
        })
        .await;
    }

    #[tokio::test]
    async fn delete_request_leaves_reverse_index_untouched() {
        with_relay(|relay| async move {
            let manager = RequestManager::new(relay.clone());
            let script = ScriptBuf::from_bytes(vec![0x51]);
            manager
                .add_request(req_with_script(1, script.clone()))
                .await
                .unwrap();

            manager.delete_request(RequestId([1; 32])).await.unwrap();

            assert!(RequestIndex::get(&relay.store, RequestId([1; 32]))
                .unwrap()
                .is_none());
            let hash = crate::codec::script_hash(script.as_bytes());
            assert!(ScriptIndex::get(&relay.store, &hash).unwrap().is_some());
        })
        .await;
    }

    #[tokio::test]
    async fn wipe_clears_everything_and_rebuilds_an_empty_filter() {
        with_relay(|relay| async move {
            let manager = RequestManager::new(relay.clone());
            let script = ScriptBuf::from_bytes(vec![0x51]);
            manager
                .add_request(req_with_script(1, script.clone()))
                .await
                .unwrap();

            manager.wipe(FilterParams::default()).await.unwrap();

            assert!(RequestIndex::get(&relay.store, RequestId([1; 32]))
                .unwrap()
                .is_none());
            assert!(!relay.filter_test(script.as_bytes()).await);
        })
        .await;
    }
}
