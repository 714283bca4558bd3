//! The chain collaborator boundary (spec §6): everything the match engine
//! and rescan driver need from the host Bitcoin node, and nothing else.
//! Block storage, the mempool, fork-choice, and p2p are the node's business,
//! not this crate's (spec §1 Non-goals).

use std::sync::Mutex;

use bitcoin::{Block, BlockHash};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u32,
    pub hash: BlockHash,
}

/// Per-block metadata the engine is handed alongside the block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMeta {
    pub height: u32,
    pub hash: BlockHash,
}

/// Opaque per-block view handed back by `get_block_view`. The node's UTXO
/// view carries more than this engine needs to match outpoints/scripts
/// against subscriptions (§4.E only ever inspects the block itself); the
/// type exists so the trait matches the external interface in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainView;

/// What the engine and rescan driver require of the host node (spec §6).
pub trait ChainSource: Send + Sync {
    fn tip(&self) -> Result<Option<ChainTip>>;
    fn get_block(&self, height: u32) -> Result<Option<Block>>;
    fn get_entry(&self, hash: BlockHash) -> Result<Option<ChainTip>>;
    fn get_block_view(&self, block: &Block) -> Result<ChainView>;
}

/// An in-memory chain used by the test suite and `testutil`. Not a real
/// `bitcoind` client: it has no p2p, no validation, no fork-choice. Blocks
/// are appended in order and addressed by height.
#[derive(Default)]
pub struct MemoryChain {
    blocks: Mutex<Vec<Block>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_block(&self, block: Block) -> u32 {
        let mut blocks = self.blocks.lock().unwrap();
        blocks.push(block);
        (blocks.len() - 1) as u32
    }

    pub fn block_at(&self, height: u32) -> Option<Block> {
        self.blocks.lock().unwrap().get(height as usize).cloned()
    }

    pub fn len(&self) -> u32 {
        self.blocks.lock().unwrap().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard blocks at or above `height`, simulating a reorg for tests.
    pub fn truncate(&self, height: u32) {
        self.blocks.lock().unwrap().truncate(height as usize);
    }
}

impl ChainSource for MemoryChain {
    fn tip(&self) -> Result<Option<ChainTip>> {
        let blocks = self.blocks.lock().unwrap();
        Ok(blocks.last().map(|block| ChainTip {
            height: (blocks.len() - 1) as u32,
            hash: block.block_hash(),
        }))
    }

    fn get_block(&self, height: u32) -> Result<Option<Block>> {
        Ok(self.block_at(height))
    }

    fn get_entry(&self, hash: BlockHash) -> Result<Option<ChainTip>> {
        let blocks = self.blocks.lock().unwrap();
        Ok(blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.block_hash() == hash)
            .map(|(height, block)| ChainTip {
                height: height as u32,
                hash: block.block_hash(),
            }))
    }

    fn get_block_view(&self, _block: &Block) -> Result<ChainView> {
        Ok(ChainView)
    }
}

pub(crate) fn require_block(chain: &dyn ChainSource, height: u32) -> Result<Block> {
    chain
        .get_block(height)?
        .ok_or_else(|| Error::NotFound)
}
