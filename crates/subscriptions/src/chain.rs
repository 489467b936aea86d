//! Chain collaborator consumed by the readers, plus an in-memory implementation.
//!
//! Readers only need the current best block, canonical lookups by number, blocks and
//! receipts by id (including blocks that are no longer canonical, for fork rewind), and a
//! repeatable wake-up fired once per new best block.

use crate::block::{Block, Header, Receipt};
use alloy::primitives::B256;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain store: {0}")]
    Store(String),
    #[error("parent block {0} not found")]
    UnknownParent(B256),
}

/// Read access to the canonical chain.
pub trait Chain: Send + Sync + 'static {
    /// Current best (head) block header.
    fn best_block(&self) -> Header;

    /// Id of the canonical block at `number`, `None` above the head.
    fn canonical_id(&self, number: u32) -> Result<Option<B256>, ChainError>;

    /// Block by id, canonical or not.
    fn block(&self, id: &B256) -> Result<Option<Block>, ChainError>;

    /// Receipts of a block, one per transaction.
    fn receipts(&self, id: &B256) -> Result<Vec<Receipt>, ChainError>;

    /// Wake-up signal carrying the id of each new best block.
    fn new_heads(&self) -> watch::Receiver<B256>;
}

struct Stored {
    block: Block,
    receipts: Vec<Receipt>,
}

struct MemInner {
    blocks: HashMap<B256, Stored>,
    /// Canonical ids indexed by block number.
    canonical: Vec<B256>,
    /// Header of `canonical.last()`.
    best: Header,
}

/// In-memory chain store.
pub struct MemChain {
    inner: RwLock<MemInner>,
    heads: watch::Sender<B256>,
}

impl MemChain {
    pub fn new(genesis: Block) -> Self {
        let id = genesis.header().id;
        let best = genesis.header().clone();
        let mut blocks = HashMap::new();
        blocks.insert(
            id,
            Stored {
                block: genesis,
                receipts: Vec::new(),
            },
        );
        let (heads, _) = watch::channel(id);
        Self {
            inner: RwLock::new(MemInner {
                blocks,
                canonical: vec![id],
                best,
            }),
            heads,
        }
    }

    /// Store `block`. With `make_best` the block becomes the head: the canonical index is
    /// re-pointed back to the fork point and the new-head signal fires.
    pub fn insert(
        &self,
        block: Block,
        receipts: Vec<Receipt>,
        make_best: bool,
    ) -> Result<(), ChainError> {
        let header = block.header().clone();
        let id = header.id;
        {
            let mut inner = self
                .inner
                .write()
                .map_err(|e| ChainError::Store(e.to_string()))?;
            if !inner.blocks.contains_key(&header.parent_id) {
                return Err(ChainError::UnknownParent(header.parent_id));
            }
            inner.blocks.insert(id, Stored { block, receipts });
            if !make_best {
                return Ok(());
            }
            inner.set_best(header);
        }
        tracing::debug!(%id, "new best block");
        self.heads.send_replace(id);
        Ok(())
    }

    /// Build a child of the current head from `transactions` and make it best.
    pub fn append(
        &self,
        transactions: Vec<crate::block::Transaction>,
        receipts: Vec<Receipt>,
    ) -> Result<Header, ChainError> {
        let best = self.best_block();
        let block = Block::child(&best, best.timestamp + 10, best.beneficiary, transactions);
        let header = block.header().clone();
        self.insert(block, receipts, true)?;
        Ok(header)
    }
}

impl MemInner {
    fn set_best(&mut self, header: Header) {
        let id = header.id;
        let mut fork = Vec::new();
        let mut cursor = id;
        while let Some(stored) = self.blocks.get(&cursor) {
            let number = stored.block.header().number as usize;
            if self.canonical.get(number) == Some(&cursor) {
                break;
            }
            fork.push((number, cursor));
            if number == 0 {
                break;
            }
            cursor = stored.block.header().parent_id;
        }
        if let Some(&(lowest, _)) = fork.last() {
            self.canonical.truncate(lowest);
        } else {
            self.canonical.truncate(header.number as usize + 1);
        }
        for (_, fork_id) in fork.into_iter().rev() {
            self.canonical.push(fork_id);
        }
        self.best = header;
    }
}

impl Chain for MemChain {
    fn best_block(&self) -> Header {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.best.clone()
    }

    fn canonical_id(&self, number: u32) -> Result<Option<B256>, ChainError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| ChainError::Store(e.to_string()))?;
        Ok(inner.canonical.get(number as usize).copied())
    }

    fn block(&self, id: &B256) -> Result<Option<Block>, ChainError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| ChainError::Store(e.to_string()))?;
        Ok(inner.blocks.get(id).map(|stored| stored.block.clone()))
    }

    fn receipts(&self, id: &B256) -> Result<Vec<Receipt>, ChainError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| ChainError::Store(e.to_string()))?;
        Ok(inner
            .blocks
            .get(id)
            .map(|stored| stored.receipts.clone())
            .unwrap_or_default())
    }

    fn new_heads(&self) -> watch::Receiver<B256> {
        self.heads.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn append_extends_canonical() {
        let chain = MemChain::new(Block::genesis(0));
        let h1 = chain.append(Vec::new(), Vec::new()).unwrap();
        let h2 = chain.append(Vec::new(), Vec::new()).unwrap();
        assert_eq!(chain.best_block().id, h2.id);
        assert_eq!(chain.canonical_id(1).unwrap(), Some(h1.id));
        assert_eq!(chain.canonical_id(2).unwrap(), Some(h2.id));
        assert_eq!(chain.canonical_id(3).unwrap(), None);
    }

    #[test]
    fn fork_repoints_canonical() {
        let chain = MemChain::new(Block::genesis(0));
        let h1 = chain.append(Vec::new(), Vec::new()).unwrap();
        let h2 = chain.append(Vec::new(), Vec::new()).unwrap();

        let side = Block::child(&h1, 99, Address::repeat_byte(7), Vec::new());
        let side_id = side.header().id;
        chain.insert(side, Vec::new(), true).unwrap();

        assert_eq!(chain.best_block().id, side_id);
        assert_eq!(chain.canonical_id(2).unwrap(), Some(side_id));
        // The orphaned block stays readable by id.
        assert!(chain.block(&h2.id).unwrap().is_some());
    }

    #[test]
    fn shorter_fork_truncates_canonical() {
        let chain = MemChain::new(Block::genesis(0));
        let h1 = chain.append(Vec::new(), Vec::new()).unwrap();
        chain.append(Vec::new(), Vec::new()).unwrap();
        chain.append(Vec::new(), Vec::new()).unwrap();

        let side = Block::child(&h1, 99, Address::repeat_byte(7), Vec::new());
        let side_id = side.header().id;
        chain.insert(side, Vec::new(), true).unwrap();
        assert_eq!(chain.best_block().id, side_id);
        assert_eq!(chain.canonical_id(3).unwrap(), None);
    }

    #[test]
    fn best_block_is_the_stored_head() {
        let genesis = Block::genesis(42);
        let chain = MemChain::new(genesis.clone());
        assert_eq!(&chain.best_block(), genesis.header());

        let h1 = chain.append(Vec::new(), Vec::new()).unwrap();
        let side = Block::child(genesis.header(), 50, Address::repeat_byte(7), Vec::new());
        chain.insert(side.clone(), Vec::new(), false).unwrap();
        assert_eq!(chain.best_block(), h1);

        chain.insert(side.clone(), Vec::new(), true).unwrap();
        assert_eq!(&chain.best_block(), side.header());
        assert_eq!(chain.canonical_id(1).unwrap(), Some(side.header().id));
    }

    #[test]
    fn insert_fires_new_head() {
        let chain = MemChain::new(Block::genesis(0));
        let mut heads = chain.new_heads();
        assert!(!heads.has_changed().unwrap());
        let h1 = chain.append(Vec::new(), Vec::new()).unwrap();
        assert!(heads.has_changed().unwrap());
        assert_eq!(*heads.borrow_and_update(), h1.id);
    }

    #[test]
    fn unknown_parent_rejected() {
        let chain = MemChain::new(Block::genesis(0));
        let orphan = Block::child(Block::genesis(5).header(), 1, Address::ZERO, Vec::new());
        assert!(matches!(
            chain.insert(orphan, Vec::new(), true),
            Err(ChainError::UnknownParent(_))
        ));
    }
}
