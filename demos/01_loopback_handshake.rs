//! Capability handshake against a loopback endpoint on an ephemeral port
//!
//! Run with: `cargo run --example 01_loopback_handshake`

use maple_tunnel::bus::{Accessory, BusConnection, BusIndex, Capabilities, LoopbackEndpoint, TcpConnector, LOOPBACK_HOST};
use maple_tunnel::gamepad::{condition_frame, ControllerCondition};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Starting loopback endpoint...");
    let bus = BusIndex::new(0)?;
    let advertised = Capabilities::NONE.with(Accessory::Storage).with(Accessory::Haptic);
    let (sink, frames) = crossbeam_channel::unbounded();
    let endpoint = LoopbackEndpoint::bind(SocketAddr::new(LOOPBACK_HOST, 0), bus, advertised)
        .await?
        .with_sink(sink);
    let addr = endpoint.local_addr()?;
    let server = tokio::spawn(endpoint.run());
    println!("✓ Endpoint listening on {}", addr);

    // BusConnection is blocking, keep it off the runtime threads
    let summary = tokio::task::spawn_blocking(move || {
        let connection = BusConnection::new(bus, addr, Arc::new(TcpConnector::default()));
        let capabilities = connection.connect()?;
        println!("✓ Handshake complete on port {}", bus);
        println!("  Accessories: {}", capabilities);
        println!("  Storage: {}", connection.has_accessory(Accessory::Storage));
        println!("  Haptic:  {}", connection.has_accessory(Accessory::Haptic));

        let frame = condition_frame(bus, capabilities, &ControllerCondition::default())?;
        let sent = connection.send(&frame);
        connection.disconnect();
        Ok::<_, Box<dyn Error + Send + Sync>>(sent)
    })
    .await?;
    let sent = summary.map_err(|e| e as Box<dyn Error>)?;
    println!("✓ Neutral condition frame sent: {}", sent);

    match frames.recv_timeout(Duration::from_secs(1)) {
        Ok(frame) => println!("✓ Endpoint received: {:?}", frame),
        Err(_) => println!("✗ Endpoint saw no frame"),
    }

    server.abort();
    println!("Done");
    Ok(())
}
