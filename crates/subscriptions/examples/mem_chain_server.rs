//! Example: serve subscriptions over an in-memory chain that grows on a timer.
//!
//! Every tick appends a block with a few random transactions, each emitting one transfer
//! and one event under a small set of topics, so filters have something to match.
//!
//! Usage: cargo run -p subscriptions --example mem_chain_server -- --listen 127.0.0.1:8669 --interval-secs 2 --allow-origin '*'

use alloy::primitives::{Address, Bytes, B256, U256};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use subscriptions::{
    Block, Chain, Event, MemChain, Output, Receipt, Subscriptions, SubscriptionsConfig,
    Transaction, Transfer,
};
use tokio::net::TcpListener;

const TOPICS: [u8; 3] = [0x01, 0x02, 0x03];

fn random_block(rng: &mut impl Rng, nonce: &mut u64) -> (Vec<Transaction>, Vec<Receipt>) {
    let count = rng.gen_range(1..=3);
    let mut txs = Vec::with_capacity(count);
    let mut receipts = Vec::with_capacity(count);
    for _ in 0..count {
        let origin = Address::from(rng.gen::<[u8; 20]>());
        txs.push(Transaction::new(origin, *nonce));
        *nonce += 1;
        let topic = B256::repeat_byte(TOPICS[rng.gen_range(0..TOPICS.len())]);
        receipts.push(Receipt {
            reverted: rng.gen_bool(0.1),
            outputs: vec![Output {
                events: vec![Event {
                    address: origin,
                    topics: vec![topic],
                    data: Bytes::from(rng.gen::<[u8; 8]>().to_vec()),
                }],
                transfers: vec![Transfer {
                    sender: origin,
                    recipient: Address::from(rng.gen::<[u8; 20]>()),
                    amount: U256::from(rng.gen_range(1..1_000_000u64)),
                }],
            }],
        });
    }
    (txs, receipts)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = std::env::args().collect();
    let mut listen = "127.0.0.1:8669".to_string();
    let mut interval_secs = 10u64;
    let mut allowed_origins = Vec::new();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--listen" => {
                i += 1;
                listen = args.get(i).cloned().unwrap_or(listen);
            }
            "--interval-secs" => {
                i += 1;
                interval_secs = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(interval_secs);
            }
            "--allow-origin" => {
                i += 1;
                if let Some(origin) = args.get(i) {
                    allowed_origins.push(origin.clone());
                }
            }
            _ => {}
        }
        i += 1;
    }
    if interval_secs == 0 {
        eprintln!("--interval-secs must be positive");
        std::process::exit(1);
    }

    let chain = Arc::new(MemChain::new(Block::genesis(0)));
    let config = SubscriptionsConfig {
        allowed_origins,
        ..Default::default()
    };
    let prefix = config.path_prefix.clone();
    let (subs, shutdown) = Subscriptions::new(chain.clone(), config);

    let producer = {
        let chain = Arc::clone(&chain);
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut nonce = 0u64;
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (txs, receipts) = random_block(&mut rng, &mut nonce);
                match chain.append(txs, receipts) {
                    Ok(header) => println!("block #{} {}", header.number, header.id),
                    Err(e) => tracing::warn!(reason = %e, "append block"),
                }
            }
        })
    };

    let listener = TcpListener::bind(&listen).await?;
    println!(
        "serving ws://{}{}/{{block,event,transfer}} from #{}",
        listener.local_addr()?,
        prefix,
        chain.best_block().number
    );
    let server = {
        let subs = subs.clone();
        tokio::spawn(async move { subs.serve(listener).await })
    };

    tokio::signal::ctrl_c().await?;
    producer.abort();
    shutdown.close().await;
    server.await?;
    Ok(())
}
