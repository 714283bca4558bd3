//! Replays historic blocks through the Match Engine using only the chain
//! view (spec §4.G). Used both by the `rescan` HTTP endpoint and by
//! `PUT /relay/request`'s optional rescan-from-height parameter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chain::{require_block, BlockMeta, ChainSource};
use crate::engine::{BlockIndexer, Engine, MembershipPredicate};
use crate::error::Result;

/// Cooperative cancellation handle; checked at block boundaries only, never
/// mid-block (spec §5 "cancellable at block boundaries").
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct RescanDriver<'a> {
    chain: &'a dyn ChainSource,
    engine: &'a Engine,
}

impl<'a> RescanDriver<'a> {
    pub fn new(chain: &'a dyn ChainSource, engine: &'a Engine) -> Self {
        RescanDriver { chain, engine }
    }

    /// Drives the engine over `from_height ..= tip.height`. Returns the
    /// height one past the last block processed (the tip height + 1), or
    /// `from_height` unchanged if the chain has no tip yet.
    ///
    /// `scope`, when given, narrows matching to whatever it returns true
    /// for instead of the shared Bloom filter, so a rescan triggered for one
    /// new Request doesn't notify on every other Request's past matches.
    pub async fn run(
        &self,
        from_height: u32,
        cancel: &CancelToken,
        scope: Option<&MembershipPredicate<'_>>,
    ) -> Result<u32> {
        let tip = match self.chain.tip()? {
            Some(tip) => tip,
            None => return Ok(from_height),
        };

        let mut height = from_height;
        while height <= tip.height {
            if cancel.is_cancelled() {
                break;
            }
            let block = require_block(self.chain, height)?;
            let meta = BlockMeta {
                height,
                hash: block.block_hash(),
            };
            match scope {
                Some(predicate) => self.engine.connect_scoped(meta, &block, predicate).await?,
                None => self.engine.on_connect(meta, &block).await?,
            }
            height += 1;
        }
        Ok(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use crate::codec::{Outpoint, RequestId};
    use crate::codec::Request;
    use crate::events::RelayEvent;
    use crate::filter::FilterParams;
    use crate::relay::Relay;
    use crate::requests::RequestManager;
    use bitcoin::absolute::LockTime;
    use bitcoin::block::{Header, Version as BVersion};
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{
        BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxMerkleNode,
        TxOut, Txid, Witness,
    };

    fn empty_block(prev: BlockHash) -> bitcoin::Block {
        bitcoin::Block {
            header: Header {
                version: BVersion::ONE,
                prev_blockhash: prev,
                merkle_root: TxMerkleNode::all_zeros(),
                time: 0,
                bits: CompactTarget::from_consensus(0),
                nonce: 0,
            },
            txdata: vec![],
        }
    }

    fn spending_block(prev: BlockHash, prevout: OutPoint) -> bitcoin::Block {
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: prevout,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: bitcoin::Amount::from_sat(0),
                script_pubkey: ScriptBuf::new(),
            }],
        };
        bitcoin::Block {
            header: Header {
                version: BVersion::ONE,
                prev_blockhash: prev,
                merkle_root: TxMerkleNode::all_zeros(),
                time: 0,
                bits: CompactTarget::from_consensus(0),
                nonce: 0,
            },
            txdata: vec![tx],
        }
    }

    #[tokio::test]
    async fn replaying_the_same_history_twice_is_parity() {
        let dir = tempfile::tempdir().unwrap();
        let relay = Relay::open(dir.path(), FilterParams::default()).unwrap();
        let manager = RequestManager::new(relay.clone());

        let spent_txid = Txid::from_byte_array([0x11; 32]);
        let prevout = Outpoint {
            txid: spent_txid,
            index: 0,
        };
        manager
            .add_request(Request {
                id: RequestId([5; 32]),
                address: [0; 20],
                value: 0,
                spends: Some(prevout),
                pays: None,
                timestamp: 0,
            })
            .await
            .unwrap();

        let chain = MemoryChain::new();
        let genesis = empty_block(BlockHash::all_zeros());
        chain.append_block(genesis.clone());
        chain.append_block(spending_block(genesis.block_hash(), OutPoint {
            txid: spent_txid,
            vout: 0,
        }));

        let engine = Engine::new(relay.clone());
        let mut sub = relay.events.subscribe();

        let driver = RescanDriver::new(&chain, &engine);
        driver.run(0, &CancelToken::new(), None).await.unwrap();

        let first = sub.recv().await.unwrap();

        driver.run(0, &CancelToken::new(), None).await.unwrap();
        let second = sub.recv().await.unwrap();

        match (first, second) {
            (RelayEvent::RequestsSatisfied(a), RelayEvent::RequestsSatisfied(b)) => {
                assert_eq!(a.satisfied, b.satisfied);
            }
        }

        crate::store::Store::destroy(dir.path()).unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_next_block_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let relay = Relay::open(dir.path(), FilterParams::default()).unwrap();
        let chain = MemoryChain::new();
        let genesis = empty_block(BlockHash::all_zeros());
        chain.append_block(genesis.clone());
        chain.append_block(empty_block(genesis.block_hash()));

        let engine = Engine::new(relay.clone());
        let driver = RescanDriver::new(&chain, &engine);
        let cancel = CancelToken::new();
        cancel.cancel();

        let next = driver.run(0, &cancel, None).await.unwrap();
        assert_eq!(next, 0);

        crate::store::Store::destroy(dir.path()).unwrap();
    }
}
