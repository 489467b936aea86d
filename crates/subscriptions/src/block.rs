//! Chain records read by the subscription readers.
//!
//! Blocks, transactions and receipts are immutable once constructed. The first 4 bytes
//! of a block id are the big-endian block number, so a position can be mapped to a
//! height without a store lookup.

use alloy::primitives::{Address, Bytes, B256, U256};
use sha3::{Digest, Keccak256};

/// Block number stamped into the first 4 bytes of a block id.
pub fn block_number(id: &B256) -> u32 {
    u32::from_be_bytes([id[0], id[1], id[2], id[3]])
}

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub number: u32,
    pub id: B256,
    pub parent_id: B256,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub beneficiary: Address,
    pub total_score: u64,
    pub signer: Address,
}

/// A transaction as seen by subscribers: its id and the account that originated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: B256,
    pub origin: Address,
}

impl Transaction {
    /// Transaction with an id derived from `origin` and `nonce`.
    pub fn new(origin: Address, nonce: u64) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(origin.as_slice());
        hasher.update(nonce.to_be_bytes());
        Self {
            id: B256::from_slice(&hasher.finalize()),
            origin,
        }
    }
}

/// Log event emitted by a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Value transfer performed by a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub sender: Address,
    pub recipient: Address,
    pub amount: U256,
}

/// Per-clause execution output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub events: Vec<Event>,
    pub transfers: Vec<Transfer>,
}

/// Execution receipt of one transaction; `outputs` holds one entry per clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub reverted: bool,
    pub outputs: Vec<Output>,
}

/// Immutable block: header plus transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Genesis block (number 0, zero parent).
    pub fn genesis(timestamp: u64) -> Self {
        let header = seal(0, B256::ZERO, timestamp, Address::ZERO, &[]);
        Self::new(header, Vec::new())
    }

    /// Child of `parent` carrying `transactions`. `beneficiary` also distinguishes
    /// sibling blocks built on the same parent.
    pub fn child(
        parent: &Header,
        timestamp: u64,
        beneficiary: Address,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut header = seal(
            parent.number + 1,
            parent.id,
            timestamp,
            beneficiary,
            &transactions,
        );
        header.total_score = parent.total_score + 1;
        header.gas_used = 21_000 * transactions.len() as u64;
        Self::new(header, transactions)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
}

fn seal(
    number: u32,
    parent_id: B256,
    timestamp: u64,
    beneficiary: Address,
    transactions: &[Transaction],
) -> Header {
    let mut hasher = Keccak256::new();
    hasher.update(parent_id);
    hasher.update(timestamp.to_be_bytes());
    hasher.update(beneficiary);
    for tx in transactions {
        hasher.update(tx.id);
    }
    let mut id = B256::from_slice(&hasher.finalize());
    id[..4].copy_from_slice(&number.to_be_bytes());
    Header {
        number,
        id,
        parent_id,
        timestamp,
        gas_limit: 10_000_000,
        gas_used: 0,
        beneficiary,
        total_score: 0,
        signer: beneficiary,
    }
}
