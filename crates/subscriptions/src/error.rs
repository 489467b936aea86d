//! Error types for subscription handshakes and delivery.

use crate::chain::ChainError;
use alloy::primitives::B256;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, http::StatusCode};

/// Failure reading chain data; terminal for the reader that produced it.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("position {0} is not known to the chain")]
    UnknownPosition(B256),
    #[error("block {0} not found")]
    MissingBlock(B256),
    #[error("canonical block #{0} not found")]
    MissingCanonical(u32),
    #[error("block {id} has {txs} transactions but {receipts} receipts")]
    ReceiptsMismatch { id: B256, txs: usize, receipts: usize },
    #[error("position {0} shares no ancestor with the canonical chain")]
    NoCommonAncestor(B256),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("{param}: {reason}")]
    InvalidArgument { param: &'static str, reason: String },
    #[error("subject not found: {0}")]
    NotFound(String),
    #[error("origin not allowed: {0}")]
    Forbidden(String),
    #[error("transport: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Read(#[from] ReadError),
}

impl SubscriptionError {
    pub(crate) fn invalid(param: &'static str, reason: impl ToString) -> Self {
        SubscriptionError::InvalidArgument {
            param,
            reason: reason.to_string(),
        }
    }

    /// HTTP status used when the error rejects a handshake.
    pub fn status(&self) -> StatusCode {
        match self {
            SubscriptionError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
