//! Resume cursor over the canonical chain, shared by every reader kind.
//!
//! The position is the id of the last block whose records were delivered. Each step
//! yields the blocks after it, at most `limit` at a time. When the position has left
//! the canonical chain the step walks back to the fork point instead, yielding the
//! orphaned blocks flagged as removed.

use crate::block::{block_number, Block, Receipt};
use crate::chain::Chain;
use crate::error::ReadError;
use crate::message::Message;
use alloy::primitives::B256;
use std::sync::Arc;

/// A block visited by a cursor step.
#[derive(Debug, Clone)]
pub struct Visited {
    pub block: Block,
    /// The block was delivered earlier and is no longer canonical.
    pub removed: bool,
}

#[derive(Debug)]
pub(crate) struct Step {
    pub blocks: Vec<Visited>,
    pub position: B256,
    pub has_more: bool,
}

pub struct ChainCursor {
    chain: Arc<dyn Chain>,
    position: B256,
    limit: u32,
}

impl ChainCursor {
    pub fn new(chain: Arc<dyn Chain>, position: B256, limit: usize) -> Self {
        Self {
            chain,
            position,
            limit: u32::try_from(limit).unwrap_or(u32::MAX).max(1),
        }
    }

    pub fn position(&self) -> B256 {
        self.position
    }

    /// Visit the next batch and project each block into messages. The position only
    /// advances when every projection succeeds.
    pub fn read_batch<F>(&mut self, mut project: F) -> Result<(Vec<Message>, bool), ReadError>
    where
        F: FnMut(&dyn Chain, &Visited) -> Result<Vec<Message>, ReadError>,
    {
        let step = self.step()?;
        let mut messages = Vec::new();
        for visited in &step.blocks {
            messages.extend(project(self.chain.as_ref(), visited)?);
        }
        self.position = step.position;
        Ok((messages, step.has_more))
    }

    pub(crate) fn step(&self) -> Result<Step, ReadError> {
        let number = block_number(&self.position);
        match self.chain.canonical_id(number)? {
            Some(id) if id == self.position => self.forward(number),
            _ => self.rewind(),
        }
    }

    fn forward(&self, from: u32) -> Result<Step, ReadError> {
        let best = self.chain.best_block().number;
        let to = best.min(from.saturating_add(self.limit));
        let mut blocks = Vec::new();
        let mut parent = self.position;
        let mut has_more = to < best;
        for number in from.saturating_add(1)..=to {
            let Some(id) = self.chain.canonical_id(number)? else {
                // Head moved to a shorter fork since `best` was read.
                if self.chain.best_block().number < number {
                    has_more = true;
                    break;
                }
                return Err(ReadError::MissingCanonical(number));
            };
            let block = self.chain.block(&id)?.ok_or(ReadError::MissingBlock(id))?;
            if block.header().parent_id != parent {
                // Reorganized mid-read; the next step rewinds from `parent`.
                has_more = true;
                break;
            }
            parent = id;
            blocks.push(Visited {
                block,
                removed: false,
            });
        }
        Ok(Step {
            blocks,
            position: parent,
            has_more,
        })
    }

    fn rewind(&self) -> Result<Step, ReadError> {
        let mut blocks = Vec::new();
        let mut id = self.position;
        while blocks.len() < self.limit as usize {
            let block = match self.chain.block(&id)? {
                Some(block) => block,
                None if blocks.is_empty() => return Err(ReadError::UnknownPosition(id)),
                None => return Err(ReadError::MissingBlock(id)),
            };
            let number = block.header().number;
            if self.chain.canonical_id(number)? == Some(id) {
                break;
            }
            if number == 0 {
                return Err(ReadError::NoCommonAncestor(self.position));
            }
            id = block.header().parent_id;
            blocks.push(Visited {
                block,
                removed: true,
            });
        }
        tracing::debug!(from = %self.position, to = %id, removed = blocks.len(), "rewinding orphaned blocks");
        Ok(Step {
            blocks,
            position: id,
            has_more: true,
        })
    }
}

/// Receipts of a visited block, checked against its transactions.
pub(crate) fn receipts(chain: &dyn Chain, block: &Block) -> Result<Vec<Receipt>, ReadError> {
    let id = block.header().id;
    let receipts = chain.receipts(&id)?;
    if receipts.len() != block.transactions().len() {
        return Err(ReadError::ReceiptsMismatch {
            id,
            txs: block.transactions().len(),
            receipts: receipts.len(),
        });
    }
    Ok(receipts)
}
