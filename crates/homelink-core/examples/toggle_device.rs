//! Example: Toggling a Device
//!
//! This example starts an offline hub on a temporary cache, probes the
//! controller, and flips one device.
//!
//! Run with: `cargo run --example toggle_device -- [CONTROLLER_URL] [DEVICE_ID]`

use std::env;
use std::sync::Arc;

use homelink_core::{HttpController, Hub, HubConfig, MemoryReplica, StaticIdentity};
use homelink_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let mut config = HubConfig::default();
    if let Some(url) = args.get(1) {
        config = config.server_url(url);
    }
    let device_id = args.get(2).map_or("led-1", String::as_str);

    let controller = HttpController::new(&config.server_url)?;
    let hub = Hub::start(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryReplica::new()),
        Arc::new(controller),
        &StaticIdentity::signed_out(),
    )
    .await?;

    println!("Controller: {}", hub.server_url());
    println!("Status:     {}", hub.check_connection().await);
    println!();

    for device in hub.state().devices().snapshot() {
        println!(
            "  {} ({}): {}",
            device.name,
            device.id,
            if device.is_on { "on" } else { "off" }
        );
    }
    println!();

    println!("Toggling {}...", device_id);
    let outcome = hub.toggle(device_id).await;
    match (outcome.state, outcome.error) {
        (Some(state), _) => println!("Now {}", if state { "on" } else { "off" }),
        (None, error) => println!("Failed: {}", error.unwrap_or_default()),
    }

    hub.shutdown().await;
    Ok(())
}
