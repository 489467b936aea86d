//! Example: subscribe to one subject and print each delivered message.
//!
//! Usage: cargo run -p subscriptions --example subscribe_client -- --url 'ws://127.0.0.1:8669/subscriptions/transfer?sender=0x...'

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = std::env::args().collect();
    let mut url = String::new();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--url" {
            i += 1;
            url = args.get(i).cloned().unwrap_or_default();
        }
        i += 1;
    }
    if url.is_empty() {
        eprintln!("Usage: subscribe_client --url ws://HOST/subscriptions/SUBJECT[?pos=..]");
        std::process::exit(1);
    }

    let (mut ws, _) = connect_async(url.as_str()).await?;
    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let value: serde_json::Value = serde_json::from_str(&text)?;
                    let removed = if value["removed"] == true { " (removed)" } else { "" };
                    println!("{}{}", value, removed);
                }
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(frame) => println!("closed: {} {}", frame.code, frame.reason),
                        None => println!("closed"),
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                ws.close(None).await?;
                break;
            }
        }
    }
    Ok(())
}
