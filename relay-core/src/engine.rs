//! Per-block scan (spec §4.E): the hot path between the chain collaborator
//! and the Indices/Filter. `BlockIndexer` is the trait a host node registers
//! against its connect/disconnect event stream.

use async_trait::async_trait;
use bitcoin::Block;

use crate::chain::BlockMeta;
use crate::codec::{Outpoint, RequestId};
use crate::error::Result;
use crate::events::{RelayEvent, RequestsSatisfied};
use crate::index::{OutpointIndex, ScriptIndex};
use crate::relay::Relay;

/// Registered with the host chain's connect/disconnect stream (spec §9's
/// "prototype-based inheritance of a host-node indexer base" redesigned as a
/// small trait).
#[async_trait]
pub trait BlockIndexer: Send + Sync {
    async fn on_connect(&self, meta: BlockMeta, block: &Block) -> Result<()>;
    async fn on_disconnect(&self, meta: BlockMeta, block: &Block) -> Result<()>;
}

/// A caller-supplied override of the membership test normally backed by the
/// Bloom filter (spec §5: "optional per-invocation override of the
/// membership predicate used in E"). Lets a rescan target only the
/// outpoint/script bytes belonging to one Request instead of matching
/// against everything already indexed.
pub type MembershipPredicate<'a> = dyn Fn(&[u8]) -> bool + Send + Sync + 'a;

/// The match engine. Holds no state of its own beyond a handle to the shared
/// `Relay`; every invocation reads and writes the Store/Filter directly.
pub struct Engine {
    relay: Relay,
}

impl Engine {
    pub fn new(relay: Relay) -> Self {
        Engine { relay }
    }

    /// Scans `block` against the shared Bloom filter, staging `nextout`
    /// writes and collecting satisfied Request IDs per transaction, then
    /// publishes one event per non-empty transaction (spec §4.E steps 1-2).
    async fn connect(&self, meta: BlockMeta, block: &Block) -> Result<()> {
        self.scan(meta, block, None).await
    }

    /// As `connect`, but membership is decided by `predicate` instead of the
    /// shared Bloom filter, scoping the scan to one Request's own
    /// outpoint/script rather than everything currently indexed.
    pub async fn connect_scoped(
        &self,
        meta: BlockMeta,
        block: &Block,
        predicate: &MembershipPredicate<'_>,
    ) -> Result<()> {
        self.scan(meta, block, Some(predicate)).await
    }

    async fn scan(
        &self,
        meta: BlockMeta,
        block: &Block,
        predicate: Option<&MembershipPredicate<'_>>,
    ) -> Result<()> {
        let store = self.relay.store.clone();
        let write = self.relay.acquire_write().await;
        let mut guard = store.start()?;

        for tx in &block.txdata {
            let mut satisfied: Vec<RequestId> = Vec::new();

            for (index, input) in tx.input.iter().enumerate() {
                let prevout = Outpoint {
                    txid: input.previous_output.txid,
                    index: input.previous_output.vout,
                };
                let is_candidate = match predicate {
                    Some(test) => test(&prevout.key_bytes()),
                    None => self.relay.filter_test(&prevout.key_bytes()).await,
                };
                if !is_candidate {
                    continue;
                }
                let rec = match OutpointIndex::get(&store, prevout) {
                    Ok(Some(rec)) => rec,
                    Ok(None) => {
                        tracing::debug!(?prevout, "filter hit with no outpoint record, false positive");
                        continue;
                    }
                    Err(err) => {
                        tracing::warn!(?prevout, %err, "failed reading outpoint record, skipping");
                        continue;
                    }
                };
                if rec.requests.is_empty() {
                    let err = crate::error::Error::Invariant(format!(
                        "outpoint record with empty request set: {prevout:?}"
                    ));
                    tracing::warn!(%err);
                    continue;
                }
                for id in &rec.requests {
                    if !satisfied.contains(id) {
                        satisfied.push(*id);
                    }
                }

                let spending = Outpoint {
                    txid: tx.compute_txid(),
                    index: index as u32,
                };
                OutpointIndex::stage_stamp_nextout(&store, &mut guard, prevout, spending)?;
            }

            for output in &tx.output {
                let script = output.script_pubkey.as_bytes();
                let is_candidate = match predicate {
                    Some(test) => test(script),
                    None => self.relay.filter_test(script).await,
                };
                if !is_candidate {
                    continue;
                }
                let hash = crate::codec::script_hash(script);
                let rec = match ScriptIndex::get(&store, &hash) {
                    Ok(Some(rec)) => rec,
                    Ok(None) => {
                        tracing::debug!(hash = %hex::encode(hash), "filter hit with no script record, false positive");
                        continue;
                    }
                    Err(err) => {
                        tracing::warn!(hash = %hex::encode(hash), %err, "failed reading script record, skipping");
                        continue;
                    }
                };
                if rec.requests.is_empty() {
                    let err = crate::error::Error::Invariant(format!(
                        "script record with empty request set: {}",
                        hex::encode(hash)
                    ));
                    tracing::warn!(%err);
                    continue;
                }
                for id in &rec.requests {
                    if !satisfied.contains(id) {
                        satisfied.push(*id);
                    }
                }
            }

            if !satisfied.is_empty() {
                satisfied.sort_by(|a, b| a.0.cmp(&b.0));
                let txid = tx.compute_txid();
                tracing::info!(%txid, height = meta.height, n = satisfied.len(), "requests satisfied");
                self.relay
                    .events
                    .publish(RelayEvent::RequestsSatisfied(RequestsSatisfied {
                        txid,
                        height: meta.height,
                        satisfied,
                    }));
            }
        }

        guard.commit()?;
        drop(write);
        Ok(())
    }

    /// Unwinds `nextout` edges stamped by a now-disconnected block, in
    /// reverse transaction order. No notification is emitted for the undo
    /// itself (spec §9 Open Question 2).
    async fn disconnect(&self, _meta: BlockMeta, block: &Block) -> Result<()> {
        let store = self.relay.store.clone();
        let _write = self.relay.acquire_write().await;
        let mut guard = store.start()?;

        for tx in block.txdata.iter().rev() {
            for input in &tx.input {
                let prevout = Outpoint {
                    txid: input.previous_output.txid,
                    index: input.previous_output.vout,
                };
                OutpointIndex::stage_clear_nextout(&store, &mut guard, prevout)?;
            }
        }

        guard.commit()
    }
}

#[async_trait]
impl BlockIndexer for Engine {
    async fn on_connect(&self, meta: BlockMeta, block: &Block) -> Result<()> {
        self.connect(meta, block).await
    }

    async fn on_disconnect(&self, meta: BlockMeta, block: &Block) -> Result<()> {
        self.disconnect(meta, block).await
    }
}
