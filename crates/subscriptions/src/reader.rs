//! Readers: resumable, incremental producers of messages for one subject.
//!
//! A [`Reader`] is created per connection and owned by its delivery loop. Each
//! [`Reader::read`] resumes at the stored position and returns the messages of the next
//! batch of blocks plus whether more blocks remain before the head. Errors are terminal:
//! a failed read leaves the position where it was and the caller is expected to stop.

use crate::block::Block;
use crate::chain::Chain;
use crate::cursor::{receipts, ChainCursor, Visited};
use crate::error::ReadError;
use crate::filter::{EventFilter, TransferFilter};
use crate::message::{BlockMessage, EventMessage, LogMeta, Message, TransferMessage};
use alloy::primitives::B256;
use std::sync::Arc;

pub enum Reader {
    Block(BlockReader),
    Event(EventReader),
    Transfer(TransferReader),
}

impl Reader {
    pub fn read(&mut self) -> Result<(Vec<Message>, bool), ReadError> {
        match self {
            Reader::Block(r) => r.read(),
            Reader::Event(r) => r.read(),
            Reader::Transfer(r) => r.read(),
        }
    }

    /// Id of the last block whose records have been returned.
    pub fn position(&self) -> B256 {
        match self {
            Reader::Block(r) => r.cursor.position(),
            Reader::Event(r) => r.cursor.position(),
            Reader::Transfer(r) => r.cursor.position(),
        }
    }
}

pub struct BlockReader {
    cursor: ChainCursor,
}

impl BlockReader {
    pub fn new(chain: Arc<dyn Chain>, position: B256, limit: usize) -> Self {
        Self {
            cursor: ChainCursor::new(chain, position, limit),
        }
    }

    pub fn read(&mut self) -> Result<(Vec<Message>, bool), ReadError> {
        self.cursor.read_batch(|_, visited| {
            Ok(vec![Message::Block(BlockMessage::new(
                &visited.block,
                visited.removed,
            ))])
        })
    }
}

pub struct EventReader {
    cursor: ChainCursor,
    filter: EventFilter,
}

impl EventReader {
    pub fn new(chain: Arc<dyn Chain>, position: B256, filter: EventFilter, limit: usize) -> Self {
        Self {
            cursor: ChainCursor::new(chain, position, limit),
            filter,
        }
    }

    pub fn read(&mut self) -> Result<(Vec<Message>, bool), ReadError> {
        let filter = &self.filter;
        self.cursor.read_batch(|chain, visited| {
            let mut out = Vec::new();
            for_each_output(chain, &visited.block, |tx, clause_index, output, counters| {
                for event in &output.events {
                    if filter.matches(event) {
                        let meta = LogMeta::new(&visited.block, tx, clause_index, counters.events);
                        out.push(Message::Event(EventMessage::new(event, meta, visited.removed)));
                    }
                    counters.events += 1;
                }
            })?;
            Ok(in_delivery_order(out, visited))
        })
    }
}

pub struct TransferReader {
    cursor: ChainCursor,
    filter: TransferFilter,
}

impl TransferReader {
    pub fn new(
        chain: Arc<dyn Chain>,
        position: B256,
        filter: TransferFilter,
        limit: usize,
    ) -> Self {
        Self {
            cursor: ChainCursor::new(chain, position, limit),
            filter,
        }
    }

    pub fn read(&mut self) -> Result<(Vec<Message>, bool), ReadError> {
        let filter = &self.filter;
        self.cursor.read_batch(|chain, visited| {
            let mut out = Vec::new();
            for_each_output(chain, &visited.block, |tx, clause_index, output, counters| {
                for transfer in &output.transfers {
                    if filter.matches(&tx.origin, transfer) {
                        let meta = LogMeta::new(&visited.block, tx, clause_index, counters.transfers);
                        out.push(Message::Transfer(TransferMessage::new(
                            transfer,
                            meta,
                            visited.removed,
                        )));
                    }
                    counters.transfers += 1;
                }
            })?;
            Ok(in_delivery_order(out, visited))
        })
    }
}

/// Running per-block record indexes.
#[derive(Default)]
struct Counters {
    events: u32,
    transfers: u32,
}

/// Walk the clause outputs of every non-reverted transaction in `block`.
fn for_each_output<F>(chain: &dyn Chain, block: &Block, mut f: F) -> Result<(), ReadError>
where
    F: FnMut(&crate::block::Transaction, usize, &crate::block::Output, &mut Counters),
{
    let receipts = receipts(chain, block)?;
    let mut counters = Counters::default();
    for (tx, receipt) in block.transactions().iter().zip(&receipts) {
        if receipt.reverted {
            continue;
        }
        for (clause_index, output) in receipt.outputs.iter().enumerate() {
            f(tx, clause_index, output, &mut counters);
        }
    }
    Ok(())
}

/// Records of a removed block are undone last-first.
fn in_delivery_order(mut messages: Vec<Message>, visited: &Visited) -> Vec<Message> {
    if visited.removed {
        messages.reverse();
    }
    messages
}
