//! Maple tunnel - Main Application
//!
//! Drives the bridge manager from a line-based script on stdin, standing in
//! for the host's input device layer:
//!
//! ```text
//! attach <device> <port> [vid:pid] [name]
//! detach <device>
//! press <device> <button>
//! release <device> <button>
//! axis <device> <axis> <value>
//! port <device> <port>
//! unbind <device>
//! wait <ms>
//! status
//! quit
//! ```
//!
//! Ports are `0`..`3` or `A`..`D`. Without `vid:pid` the device is a DreamConn.

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use maple_tunnel::bus::constants::{DREAMCONN_PRODUCT_ID, DREAMCONN_VENDOR_ID};
use maple_tunnel::gamepad::{Axis, Button, DeviceInfo};
use maple_tunnel::{BridgeManager, BusIndex, Config, InputEvent, InputMessage};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One parsed script line
#[derive(Debug)]
enum ScriptLine {
    Message(InputMessage),
    Wait(Duration),
    Status,
    Quit,
}

fn parse_port(token: &str) -> Result<BusIndex> {
    let index = match token.to_ascii_uppercase().as_str() {
        "A" => 0,
        "B" => 1,
        "C" => 2,
        "D" => 3,
        other => other.parse::<u8>().with_context(|| format!("bad port '{}'", token))?,
    };
    Ok(BusIndex::new(index)?)
}

fn parse_identity(token: &str) -> Result<(u16, u16)> {
    let (vendor, product) = token
        .split_once(':')
        .ok_or_else(|| anyhow!("identity '{}' is not vid:pid", token))?;
    let vendor = u16::from_str_radix(vendor, 16).with_context(|| format!("bad vendor id '{}'", vendor))?;
    let product = u16::from_str_radix(product, 16).with_context(|| format!("bad product id '{}'", product))?;
    Ok((vendor, product))
}

fn nth_arg<'a>(args: &[&'a str], i: usize, verb: &str) -> Result<&'a str> {
    args.get(i)
        .copied()
        .ok_or_else(|| anyhow!("'{}' needs more arguments", verb))
}

fn parse_line(line: &str) -> Result<Option<ScriptLine>> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let arg = |i: usize| nth_arg(args, i, verb);
    let device = || -> Result<u32> {
        let token = nth_arg(args, 0, verb)?;
        token.parse().with_context(|| format!("bad device index '{}'", token))
    };

    let parsed = match verb {
        "attach" => {
            let index = device()?;
            let port = parse_port(arg(1)?)?;
            let (vendor_id, product_id) = match args.get(2) {
                Some(identity) => parse_identity(identity)?,
                None => (DREAMCONN_VENDOR_ID, DREAMCONN_PRODUCT_ID),
            };
            let name = if args.len() > 3 {
                args[3..].join(" ")
            } else {
                format!("Device {}", index)
            };
            ScriptLine::Message(InputMessage::Attached {
                device: DeviceInfo::new(index, name, vendor_id, product_id),
                port,
            })
        }
        "detach" => ScriptLine::Message(InputMessage::Detached { device_index: device()? }),
        "press" | "release" => {
            let button: Button = arg(1)?.parse().map_err(|e: String| anyhow!(e))?;
            ScriptLine::Message(InputMessage::Input {
                device_index: device()?,
                event: InputEvent::Button {
                    button,
                    pressed: verb == "press",
                },
            })
        }
        "axis" => {
            let axis: Axis = arg(1)?.parse().map_err(|e: String| anyhow!(e))?;
            let raw = arg(2)?;
            let value: i16 = raw.parse().with_context(|| format!("bad axis value '{}'", raw))?;
            ScriptLine::Message(InputMessage::Input {
                device_index: device()?,
                event: InputEvent::Axis { axis, value },
            })
        }
        "port" => ScriptLine::Message(InputMessage::Reassign {
            device_index: device()?,
            port: parse_port(arg(1)?)?,
        }),
        "unbind" => ScriptLine::Message(InputMessage::Unbind { device_index: device()? }),
        "wait" => {
            let ms: u64 = arg(0)?.parse().context("bad wait duration")?;
            ScriptLine::Wait(Duration::from_millis(ms))
        }
        "status" => ScriptLine::Status,
        "quit" | "exit" => ScriptLine::Quit,
        other => bail!("unknown command '{}'", other),
    };
    Ok(Some(parsed))
}

fn drain_events(manager: &BridgeManager) {
    while let Ok(event) = manager.events().try_recv() {
        println!("event: {:?}", event);
    }
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("{}; using built-in defaults", e);
            Config::default()
        }),
    };

    let connector = Arc::new(config.tcp_connector());
    let mut manager = BridgeManager::new(config, connector)?;
    manager.start()?;
    let input = manager.input_sender();

    info!("Reading commands from stdin (Ctrl+D to stop)");

    for (number, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        let parsed = match parse_line(&line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(e) => {
                warn!("line {}: {:#}", number + 1, e);
                continue;
            }
        };

        match parsed {
            ScriptLine::Message(message) => input.send(message).context("input thread stopped")?,
            ScriptLine::Wait(duration) => thread::sleep(duration),
            ScriptLine::Status => {
                // Let queued input settle before reading the pool
                thread::sleep(Duration::from_millis(50));
                println!("{}", manager.status_json()?);
            }
            ScriptLine::Quit => break,
        }
        drain_events(&manager);
    }

    // Give the input thread a poll cycle to flush, then shut down
    thread::sleep(Duration::from_millis(50));
    drain_events(&manager);
    manager.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attach_defaults_to_dreamconn() {
        let Some(ScriptLine::Message(InputMessage::Attached { device, port })) =
            parse_line("attach 3 B").unwrap()
        else {
            panic!("expected attach");
        };
        assert_eq!(device.index, 3);
        assert_eq!(device.identity(), "1209:2f07");
        assert_eq!(port, BusIndex::new(1).unwrap());
    }

    #[test]
    fn test_parse_input_lines() {
        assert!(matches!(
            parse_line("press 0 start").unwrap(),
            Some(ScriptLine::Message(InputMessage::Input {
                device_index: 0,
                event: InputEvent::Button { button: Button::Start, pressed: true }
            }))
        ));
        assert!(matches!(
            parse_line("axis 1 lt -20").unwrap(),
            Some(ScriptLine::Message(InputMessage::Input {
                device_index: 1,
                event: InputEvent::Axis { axis: Axis::LeftTrigger, value: -20 }
            }))
        ));
        assert!(matches!(
            parse_line("unbind 2").unwrap(),
            Some(ScriptLine::Message(InputMessage::Unbind { device_index: 2 }))
        ));
        assert!(parse_line("  # comment only").unwrap().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("attach 0 E").is_err());
        assert!(parse_line("press 0").is_err());
        assert!(parse_line("attach 0 A 12345").is_err());
        assert!(parse_line("fly 0").is_err());
    }
}
