//! Delivery loop for one connection.
//!
//! Drains the reader until it reports no pending data, then waits for either the shutdown
//! signal or the next new-head wake-up. The loop only suspends while waiting (and on
//! socket writes); it never polls the chain on a timer.

use crate::error::SubscriptionError;
use crate::reader::Reader;
use alloy::primitives::B256;
use futures_util::{Sink, SinkExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;

/// Run the delivery loop until shutdown (`Ok`) or a read/write failure (`Err`).
///
/// `heads` should be subscribed before the reader's position was resolved so that no
/// head committed in between is missed. A closed head signal ends the loop like shutdown.
pub async fn pipe<S>(
    sink: &mut S,
    reader: &mut Reader,
    heads: &mut watch::Receiver<B256>,
    shutdown: &CancellationToken,
) -> Result<(), SubscriptionError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }
        drain(sink, reader).await?;

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            changed = heads.changed() => {
                if changed.is_err() {
                    tracing::debug!("new-head signal closed");
                    return Ok(());
                }
            }
        }
    }
}

async fn drain<S>(sink: &mut S, reader: &mut Reader) -> Result<(), SubscriptionError>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        let (messages, has_more) = reader.read()?;
        if !messages.is_empty() {
            for message in &messages {
                sink.feed(WsMessage::Text(serde_json::to_string(message)?))
                    .await?;
            }
            sink.flush().await?;
        }
        if !has_more {
            return Ok(());
        }
    }
}
