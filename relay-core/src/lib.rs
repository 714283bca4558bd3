//! Subscription and match engine for Bitcoin outpoint/script notifications.
//!
//! This crate owns the hard part: a persistent multi-index from outpoints
//! and scripts to subscriber Request IDs, a Bloom-filtered hot path over
//! every connected block, and the atomicity between mutating the index and
//! scanning against it. Everything else (HTTP, CLI, a real chain client)
//! lives in sibling crates.

pub mod chain;
pub mod codec;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod index;
pub mod relay;
pub mod rescan;
pub mod requests;
pub mod store;

pub use chain::{BlockMeta, ChainSource, ChainTip, MemoryChain};
pub use codec::{script_hash, Outpoint, OutpointRecord, Request, RequestId, ScriptRecord};
pub use engine::{BlockIndexer, Engine, MembershipPredicate};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventHub, RelayEvent, RequestsSatisfied, Subscription};
pub use filter::{Filter, FilterParams};
pub use index::{OutpointIndex, RequestIndex, ScriptIndex};
pub use relay::Relay;
pub use rescan::{CancelToken, RescanDriver};
pub use requests::{AddOutcome, RequestManager};
pub use store::Store;

/// Synthetic block/chain builders shared by this crate's tests and by
/// `relay-server`'s integration tests.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil {
    use bitcoin::absolute::LockTime;
    use bitcoin::block::{Header, Version as BVersion};
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{
        Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
        TxMerkleNode, TxOut, Witness,
    };

    pub fn empty_block(prev: BlockHash) -> Block {
        Block {
            header: header(prev),
            txdata: vec![],
        }
    }

    pub fn header(prev: BlockHash) -> Header {
        Header {
            version: BVersion::ONE,
            prev_blockhash: prev,
            merkle_root: TxMerkleNode::all_zeros(),
            time: 0,
            bits: CompactTarget::from_consensus(0),
            nonce: 0,
        }
    }

    pub fn block_with(prev: BlockHash, txs: Vec<Transaction>) -> Block {
        Block {
            header: header(prev),
            txdata: txs,
        }
    }

    pub fn paying_tx(script: ScriptBuf) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: bitcoin::Amount::from_sat(0),
                script_pubkey: script,
            }],
        }
    }

    pub fn spending_tx(prevout: OutPoint) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: prevout,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![],
        }
    }
}
