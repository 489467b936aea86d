//! Connection lifecycle and shutdown coordination.
//!
//! Each inbound connection is handled by its own task: the WebSocket handshake callback
//! resolves the subject, parses position and filter parameters and checks the origin, so
//! every rejection is answered with a plain HTTP error before any upgrade. Accepted
//! connections run the delivery loop and end with a close frame (`1001` on shutdown,
//! `1011` with the error text on failure).
//!
//! [`Shutdown::close`] fires the shutdown signal and waits until every registered
//! connection has unregistered. It consumes the handle, so it can only run once.

use crate::chain::Chain;
use crate::config::SubscriptionsConfig;
use crate::error::SubscriptionError;
use crate::filter::{EventFilter, TransferFilter};
use crate::params::{resolve_position, Query, Subject};
use crate::pipe::pipe;
use crate::reader::{BlockReader, EventReader, Reader, TransferReader};
use futures_util::{SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Close frame reasons are limited to 123 bytes by the WebSocket protocol.
const MAX_CLOSE_REASON: usize = 123;

/// Subscription service handle; cheap to clone.
#[derive(Clone)]
pub struct Subscriptions {
    inner: Arc<Inner>,
}

struct Inner {
    chain: Arc<dyn Chain>,
    config: SubscriptionsConfig,
    shutdown: CancellationToken,
    active: watch::Sender<usize>,
}

/// Single-use shutdown handle returned by [`Subscriptions::new`].
pub struct Shutdown {
    token: CancellationToken,
    active: watch::Receiver<usize>,
}

impl Shutdown {
    /// Stop every delivery loop and wait for all connections to unregister.
    pub async fn close(mut self) {
        let active = *self.active.borrow();
        tracing::info!(active, "shutting down subscriptions");
        self.token.cancel();
        // Err means every service handle is gone, and with it every connection.
        let _ = self.active.wait_for(|n| *n == 0).await;
        tracing::info!("subscriptions quiesced");
    }
}

/// Registration of one connection; unregisters on drop, whatever the exit path.
struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.inner.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Subscriptions {
    pub fn new(chain: Arc<dyn Chain>, config: SubscriptionsConfig) -> (Self, Shutdown) {
        let token = CancellationToken::new();
        let (active, active_rx) = watch::channel(0);
        let inner = Arc::new(Inner {
            chain,
            config,
            shutdown: token.clone(),
            active,
        });
        (
            Self { inner },
            Shutdown {
                token,
                active: active_rx,
            },
        )
    }

    /// Number of registered connections.
    pub fn active_connections(&self) -> usize {
        *self.inner.active.borrow()
    }

    /// Count a new connection, unless shutdown has fired. The check runs under the
    /// counter's lock, so a registration either precedes `close`'s wait or is refused.
    fn register(&self) -> Option<ConnectionGuard> {
        let shutdown = &self.inner.shutdown;
        let registered = self.inner.active.send_if_modified(|n| {
            if shutdown.is_cancelled() {
                return false;
            }
            *n += 1;
            true
        });
        registered.then(|| ConnectionGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Accept connections until shutdown, one task per connection.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let Some(guard) = self.register() else {
                        tracing::debug!(%peer, "shutting down, dropping connection");
                        break;
                    };
                    let this = self.clone();
                    tokio::spawn(async move { this.run(stream, peer, guard).await });
                }
                Err(e) => {
                    tracing::warn!(reason = %e, "accept failed");
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
        tracing::debug!("stopped accepting subscriptions");
    }

    /// Handle one connection on an already-accepted stream.
    pub async fn handle_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(guard) = self.register() else {
            tracing::debug!(%peer, "shutting down, dropping connection");
            return;
        };
        self.run(stream, peer, guard).await
    }

    async fn run<S>(&self, stream: S, peer: SocketAddr, _guard: ConnectionGuard)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let span = tracing::debug_span!("subscription", %peer, subject = tracing::field::Empty);
        self.connection(stream).instrument(span).await
    }

    async fn connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Subscribed before the position is resolved so no head is missed in between.
        let mut heads = self.inner.chain.new_heads();
        let mut reader = None;
        let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match self.prepare(req) {
                Ok(prepared) => {
                    reader = Some(prepared);
                    Ok(response)
                }
                Err(e) => {
                    tracing::debug!(reason = %e, "subscription rejected");
                    Err(reject(&e))
                }
            }
        };
        let handshake = timeout(
            self.inner.config.handshake_timeout(),
            accept_hdr_async(stream, callback),
        );
        let ws = match handshake.await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                tracing::debug!(reason = %e, "upgrade to websocket");
                return;
            }
            Err(_) => {
                tracing::debug!("websocket handshake timed out");
                return;
            }
        };
        let Some(mut reader) = reader else {
            return;
        };

        let (mut sink, mut stream) = ws.split();
        let outcome = tokio::select! {
            outcome = pipe(&mut sink, &mut reader, &mut heads, &self.inner.shutdown) => outcome,
            _ = client_closed(&mut stream) => {
                tracing::debug!("client went away");
                // Flushes the queued close reply, if the client sent a close frame.
                if let Err(e) = sink.close().await {
                    tracing::debug!(reason = %e, "close websocket");
                }
                return;
            }
        };

        let frame = match outcome {
            Ok(()) => CloseFrame {
                code: CloseCode::Away,
                reason: "".into(),
            },
            Err(e) => {
                tracing::debug!(reason = %e, position = %reader.position(), "subscription failed");
                CloseFrame {
                    code: CloseCode::Error,
                    reason: close_reason(&e.to_string()).into(),
                }
            }
        };
        if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
            tracing::debug!(reason = %e, "write close message");
        }
    }

    /// Validate a handshake request and build its reader. Checked in order: subject,
    /// parameters, origin.
    fn prepare(&self, req: &Request) -> Result<Reader, SubscriptionError> {
        let subject = self.subject(req.uri().path())?;
        tracing::Span::current().record("subject", tracing::field::display(subject));
        let reader = self.build_reader(subject, &Query::parse(req.uri().query()))?;

        let origin = match req.headers().get(ORIGIN) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| SubscriptionError::Forbidden("<non-ascii origin>".into()))?,
            ),
            None => None,
        };
        if !self.inner.config.origin_allowed(origin) {
            return Err(SubscriptionError::Forbidden(
                origin.unwrap_or_default().to_string(),
            ));
        }
        Ok(reader)
    }

    fn subject(&self, path: &str) -> Result<Subject, SubscriptionError> {
        let prefix = self.inner.config.path_prefix.trim_end_matches('/');
        path.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|subject| !subject.is_empty() && !subject.contains('/'))
            .ok_or_else(|| SubscriptionError::NotFound(path.to_string()))?
            .parse()
    }

    /// Build the reader for `subject` from request parameters (`pos` plus the subject's
    /// filter fields).
    pub fn build_reader(&self, subject: Subject, query: &Query) -> Result<Reader, SubscriptionError> {
        let chain = Arc::clone(&self.inner.chain);
        let limit = self.inner.config.max_blocks_per_read;
        let position = resolve_position(chain.as_ref(), query.get("pos"))?;
        Ok(match subject {
            Subject::Block => Reader::Block(BlockReader::new(chain, position, limit)),
            Subject::Event => Reader::Event(EventReader::new(
                chain,
                position,
                EventFilter::from_query(query)?,
                limit,
            )),
            Subject::Transfer => Reader::Transfer(TransferReader::new(
                chain,
                position,
                TransferFilter::from_query(query)?,
                limit,
            )),
        })
    }
}

/// Resolves once the client closes its side or the connection fails.
async fn client_closed<St>(stream: &mut St)
where
    St: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(reason = %e, "read websocket");
                return;
            }
        }
    }
}

fn reject(err: &SubscriptionError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() = err.status();
    response
}

fn close_reason(text: &str) -> String {
    if text.len() <= MAX_CLOSE_REASON {
        return text.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
