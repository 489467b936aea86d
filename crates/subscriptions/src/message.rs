//! Client-facing messages, one per WebSocket frame.
//!
//! Every message carries its block id/number and a `removed` flag set when the block it
//! came from left the canonical chain, so clients can reconcile reorganizations.

use crate::block::{Block, Event, Transaction, Transfer};
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMessage {
    pub number: u32,
    pub id: B256,
    pub parent_id: B256,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub beneficiary: Address,
    pub total_score: u64,
    pub signer: Address,
    pub transactions: Vec<B256>,
    pub removed: bool,
}

impl BlockMessage {
    pub fn new(block: &Block, removed: bool) -> Self {
        let header = block.header();
        Self {
            number: header.number,
            id: header.id,
            parent_id: header.parent_id,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            gas_used: header.gas_used,
            beneficiary: header.beneficiary,
            total_score: header.total_score,
            signer: header.signer,
            transactions: block.transactions().iter().map(|tx| tx.id).collect(),
            removed,
        }
    }
}

/// Where an event or transfer was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMeta {
    pub block_id: B256,
    pub block_number: u32,
    pub block_timestamp: u64,
    pub tx_id: B256,
    pub tx_origin: Address,
    pub clause_index: u32,
    /// Index among records of the same kind in the block, counted before filtering.
    pub log_index: u32,
}

impl LogMeta {
    pub(crate) fn new(block: &Block, tx: &Transaction, clause_index: usize, log_index: u32) -> Self {
        Self {
            block_id: block.header().id,
            block_number: block.header().number,
            block_timestamp: block.header().timestamp,
            tx_id: tx.id,
            tx_origin: tx.origin,
            clause_index: clause_index as u32,
            log_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub meta: LogMeta,
    pub removed: bool,
}

impl EventMessage {
    pub(crate) fn new(event: &Event, meta: LogMeta, removed: bool) -> Self {
        Self {
            address: event.address,
            topics: event.topics.clone(),
            data: event.data.clone(),
            meta,
            removed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMessage {
    pub sender: Address,
    pub recipient: Address,
    pub amount: U256,
    pub meta: LogMeta,
    pub removed: bool,
}

impl TransferMessage {
    pub(crate) fn new(transfer: &Transfer, meta: LogMeta, removed: bool) -> Self {
        Self {
            sender: transfer.sender,
            recipient: transfer.recipient,
            amount: transfer.amount,
            meta,
            removed,
        }
    }
}

/// Unit of delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Block(BlockMessage),
    Event(EventMessage),
    Transfer(TransferMessage),
}

impl Message {
    pub fn block_number(&self) -> u32 {
        match self {
            Message::Block(m) => m.number,
            Message::Event(m) => m.meta.block_number,
            Message::Transfer(m) => m.meta.block_number,
        }
    }

    pub fn removed(&self) -> bool {
        match self {
            Message::Block(m) => m.removed,
            Message::Event(m) => m.removed,
            Message::Transfer(m) => m.removed,
        }
    }
}
