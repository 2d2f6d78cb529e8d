//! UI combo on a mock tunnel: LT + RT + Start fires once and never reaches the wire
//!
//! Run with: `cargo run --example 02_combo_mock`

use maple_tunnel::bus::{BusIndex, Capabilities, ConnectionPool, MockConnector, BASE_PORT, LOOPBACK_HOST};
use maple_tunnel::gamepad::{Axis, BridgeSettings, Button, GamepadBridge};
use std::error::Error;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let connector = MockConnector::with_capabilities(Capabilities::NONE);
    let pool = Arc::new(ConnectionPool::new(LOOPBACK_HOST, BASE_PORT, Arc::new(connector.clone()))?);
    let mut bridge = GamepadBridge::new("DreamConn+", 0, BusIndex::new(3)?, pool, BridgeSettings::default());
    println!("✓ Bridge attached to port {}", bridge.bus());
    connector.clear_written();

    println!("Holding LT, RT, then pressing Start...");
    bridge.axis_input(Axis::LeftTrigger, i16::MAX);
    bridge.axis_input(Axis::RightTrigger, i16::MAX);
    let outcome = bridge.button_input(Button::Start, true);
    println!("  Combo fired: {}", outcome.combo_fired);

    // Held keys do not fire again
    let again = bridge.tick();
    println!("  Fired again on idle tick: {}", again);

    let frames = connector.written_frames();
    // One frame per input event, nothing extra for the combo
    println!("✓ {} condition frames on the wire for 3 inputs", frames.len());
    for frame in &frames {
        println!("  {:?}", frame);
    }
    println!("  Stats: {:?}", bridge.stats());
    Ok(())
}
