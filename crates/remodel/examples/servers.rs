//! Example: server lifecycle
//!
//! Lists servers, renames one and waits for a queued deletion.
//!
//! # Usage
//!
//! ```bash
//! export REMODEL_BASE_URI="https://api.example.com/v1"
//! export REMODEL_API_TOKEN="your-token"
//! cargo run --example servers -- <server-id>
//! ```

use remodel::{Client, WaitConfig};
use serde_json::{Map, json};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let id: u64 = std::env::args()
        .nth(1)
        .ok_or("usage: servers <server-id>")?
        .parse()?;

    let client = Client::builder()
        .config(remodel::ClientConfig::from_env()?)
        .wait(
            WaitConfig::default()
                .interval(Duration::from_secs(2))
                .timeout(Duration::from_secs(120))
                .on_tick(|n| println!("  still waiting ({n})")),
        )
        .build()?;
    let servers = client.servers();

    println!("=== Servers ===");
    let mut filter = Map::new();
    filter.insert("state".into(), json!("running"));
    for server in &servers.list(&filter).await? {
        println!("  - {} #{:?}", server, server.id());
    }

    let mut server = servers.retrieve(id).await?;
    let location = server.get("location.name").await?;
    println!("\n{} runs in {:?}", server, location.as_str());

    let mut changes = Map::new();
    changes.insert("name".into(), json!(format!("{}-renamed", server)));
    if servers.update(&mut server, &changes).await? {
        println!("Renamed to {}", server);
    }

    println!("\nDeleting {}", server);
    let deleted = servers.delete(&server).await?.wait().await?;
    println!("Gone, identity now {:?}", deleted.id());

    Ok(())
}
