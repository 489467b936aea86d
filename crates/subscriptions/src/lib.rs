//! Real-time chain subscriptions: clients open a WebSocket on `{prefix}/{subject}` and
//! receive, as new blocks are committed, the blocks, events or transfers matching their
//! filter.
//!
//! - **Reader**: per-connection cursor over one subject ([Reader]); resumes from a block
//!   position, reads in bounded batches and rewinds across reorganizations, flagging
//!   orphaned records as removed.
//! - **Delivery loop** ([pipe]): drains the reader, then sleeps until the next new-head
//!   wake-up or shutdown.
//! - **Service** ([Subscriptions]): handshake validation, origin policy, connection
//!   lifecycle and close frames; [Shutdown] stops every loop and waits for all
//!   connections to leave.
//!
//! The chain store is a collaborator behind the [Chain] trait; [MemChain] is an
//! in-memory implementation.

pub mod block;
pub mod chain;
pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod message;
pub mod params;
pub mod pipe;
pub mod reader;
pub mod server;

pub use block::{Block, Event, Header, Output, Receipt, Transaction, Transfer};
pub use chain::{Chain, ChainError, MemChain};
pub use config::SubscriptionsConfig;
pub use error::{ReadError, SubscriptionError};
pub use filter::{EventFilter, Match, TransferFilter};
pub use message::{BlockMessage, EventMessage, LogMeta, Message, TransferMessage};
pub use params::{Query, Subject};
pub use pipe::pipe;
pub use reader::{BlockReader, EventReader, Reader, TransferReader};
pub use server::{Shutdown, Subscriptions};
