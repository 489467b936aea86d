//! Common helpers for integration tests.
//! Some helpers are only used by specific test binaries; allow dead_code to avoid per-binary warnings.
#![allow(dead_code)]

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use subscriptions::{
    Block, Chain, Event, MemChain, Output, Receipt, Shutdown, Subscriptions, SubscriptionsConfig,
    Transaction, Transfer,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing_subscriber::EnvFilter;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("subscriptions=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

/// A running service over an in-memory chain.
pub struct TestNode {
    pub chain: Arc<MemChain>,
    pub subs: Subscriptions,
    pub shutdown: Shutdown,
    pub addr: SocketAddr,
    pub server: JoinHandle<()>,
}

/// Bind on an ephemeral port and serve subscriptions over a fresh genesis chain.
pub async fn spawn_node(config: SubscriptionsConfig) -> Result<TestNode> {
    init_tracing();
    let chain = Arc::new(MemChain::new(Block::genesis(1_000)));
    let (subs, shutdown) = Subscriptions::new(chain.clone(), config);
    let listener = TcpListener::bind("127.0.0.1:0").await.context("bind")?;
    let addr = listener.local_addr()?;
    let server = {
        let subs = subs.clone();
        tokio::spawn(async move { subs.serve(listener).await })
    };
    Ok(TestNode {
        chain,
        subs,
        shutdown,
        addr,
        server,
    })
}

pub fn url(addr: SocketAddr, path_and_query: &str) -> String {
    format!("ws://{}{}", addr, path_and_query)
}

pub async fn connect(addr: SocketAddr, path_and_query: &str) -> Result<Client> {
    try_connect(addr, path_and_query).await.context("ws connect")
}

/// Connect without mapping the error, so handshake rejections can be inspected.
pub async fn try_connect(
    addr: SocketAddr,
    path_and_query: &str,
) -> std::result::Result<Client, WsError> {
    let (ws, _) = connect_async(url(addr, path_and_query)).await?;
    Ok(ws)
}

/// Connect with an explicit Origin header.
pub async fn connect_with_origin(
    addr: SocketAddr,
    path_and_query: &str,
    origin: &str,
) -> std::result::Result<Client, WsError> {
    let mut request = url(addr, path_and_query).into_client_request()?;
    request
        .headers_mut()
        .insert("Origin", origin.parse().expect("header value"));
    let (ws, _) = connect_async(request).await?;
    Ok(ws)
}

/// Next text frame as JSON.
pub async fn next_json<S>(ws: &mut S) -> Result<Value>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .context("timed out waiting for a frame")?
            .ok_or_else(|| anyhow::anyhow!("ws closed"))?
            .context("ws read")?;
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).context("parse frame"),
            Message::Close(frame) => anyhow::bail!("unexpected close: {:?}", frame),
            _ => continue,
        }
    }
}

/// Read until the server's close frame.
pub async fn expect_close<S>(ws: &mut S) -> Result<CloseFrame<'static>>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .context("timed out waiting for close")?
            .ok_or_else(|| anyhow::anyhow!("ws ended without close frame"))?
            .context("ws read")?;
        match frame {
            Message::Close(Some(frame)) => return Ok(frame),
            Message::Close(None) => anyhow::bail!("close frame without code"),
            Message::Text(text) => anyhow::bail!("unexpected message before close: {}", text),
            _ => continue,
        }
    }
}

/// No frame arrives within `window`.
pub async fn expect_silence(ws: &mut Client, window: Duration) -> Result<()> {
    match timeout(window, ws.next()).await {
        Err(_) => Ok(()),
        Ok(frame) => anyhow::bail!("unexpected frame: {:?}", frame),
    }
}

/// Wait until `n` connections are registered with the service.
pub async fn wait_for_active(subs: &Subscriptions, n: usize) -> Result<()> {
    timeout(WAIT, async {
        while subs.active_connections() != n {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .with_context(|| format!("expected {} active connections", n))
}

pub fn event(address: Address, topics: &[B256]) -> Event {
    Event {
        address,
        topics: topics.to_vec(),
        data: Default::default(),
    }
}

/// Append a block with one transaction from `origin` whose single clause emits
/// `events` and `transfers`.
pub fn append_block(
    chain: &MemChain,
    origin: Address,
    events: Vec<Event>,
    transfers: Vec<Transfer>,
) -> Result<B256> {
    let nonce = chain.best_block().number as u64;
    let tx = Transaction::new(origin, nonce);
    let receipt = Receipt {
        reverted: false,
        outputs: vec![Output { events, transfers }],
    };
    Ok(chain.append(vec![tx], vec![receipt])?.id)
}

pub fn append_empty(chain: &MemChain) -> Result<B256> {
    Ok(chain.append(Vec::new(), Vec::new())?.id)
}
