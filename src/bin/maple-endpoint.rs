//! Loopback endpoint emulator
//!
//! Listens on all four bus ports and plays the remote side of the tunnel:
//! capability queries are answered, every other frame is logged.
//!
//! Usage: `maple-endpoint [CAPS_A CAPS_B CAPS_C CAPS_D]` where each mask is
//! 0 (none), 1 (storage), 2 (haptic) or 3 (both). Defaults to 3 everywhere.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use maple_tunnel::bus::{BusIndex, Capabilities, LoopbackEndpoint, BUS_COUNT};
use maple_tunnel::gamepad::ControllerCondition;
use maple_tunnel::{BusFrame, Command, Config};
use std::net::SocketAddr;
use std::thread;

fn parse_masks() -> Result<[Capabilities; BUS_COUNT]> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut masks = [Capabilities::from_bits(0b11); BUS_COUNT];
    match args.len() {
        0 => {}
        BUS_COUNT => {
            for (mask, arg) in masks.iter_mut().zip(&args) {
                let bits: u8 = arg.parse().with_context(|| format!("bad capability mask '{}'", arg))?;
                if bits > 0b11 {
                    bail!("capability mask {} out of range", bits);
                }
                *mask = Capabilities::from_bits(bits);
            }
        }
        n => bail!("expected 0 or {} capability masks, got {}", BUS_COUNT, n),
    }
    Ok(masks)
}

fn log_frame(frame: &BusFrame) {
    match (frame.command, ControllerCondition::from_payload(frame.payload())) {
        (Command::DataTransfer, Some(condition)) => info!(
            "0x{:02X}: buttons {:04X} lt {} rt {} stick ({}, {})",
            frame.origin,
            condition.buttons,
            condition.left_trigger,
            condition.right_trigger,
            condition.stick_x,
            condition.stick_y
        ),
        _ => info!("{:?}", frame),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let masks = parse_masks()?;
    let config = Config::load_default().unwrap_or_else(|e| {
        warn!("{}; using built-in defaults", e);
        Config::default()
    });

    let (sink, frames) = crossbeam_channel::unbounded::<BusFrame>();
    thread::Builder::new()
        .name("frame-log".to_string())
        .spawn(move || {
            for frame in frames {
                log_frame(&frame);
            }
        })?;

    let mut tasks = Vec::with_capacity(BUS_COUNT);
    for (bus, capabilities) in BusIndex::ALL.into_iter().zip(masks) {
        let port = bus.tcp_port(config.bus.base_port)?;
        let addr = SocketAddr::new(config.bus.host, port);
        let endpoint = LoopbackEndpoint::bind(addr, bus, capabilities)
            .await
            .with_context(|| format!("binding {}", addr))?
            .with_sink(sink.clone());
        tasks.push(tokio::spawn(endpoint.run()));
    }
    info!("✓ Endpoint emulator ready, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    info!("Shutting down");
    for task in tasks {
        task.abort();
    }
    Ok(())
}
