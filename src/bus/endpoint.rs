//! Loopback tunnel endpoint emulator
//!
//! Plays the remote side of one port: answers the capability query with a
//! fixed accessory mask and hands every other frame to an optional sink.
//! Used by the integration tests and by the `maple-endpoint` binary.

use crossbeam_channel::Sender;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use crate::bus::codec::{FrameCodec, FrameCodecError};
use crate::bus::constants::{UNIT_HOST, UNIT_MAIN};
use crate::bus::frame::{BusFrame, CodecError, Command};
use crate::bus::types::{BusIndex, Capabilities};

/// Reply to a capability query: payload byte 0 is the accessory mask
pub fn capability_reply(bus: BusIndex, capabilities: Capabilities) -> Result<BusFrame, CodecError> {
    BusFrame::encode(
        Command::DeviceStatus,
        bus.address(UNIT_HOST),
        bus.address(UNIT_MAIN | capabilities.expansion_units()),
        &[capabilities.bits()],
    )
}

pub struct LoopbackEndpoint {
    bus: BusIndex,
    capabilities: Capabilities,
    listener: TcpListener,
    sink: Option<Sender<BusFrame>>,
}

impl LoopbackEndpoint {
    pub async fn bind(addr: SocketAddr, bus: BusIndex, capabilities: Capabilities) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Endpoint for bus {} listening on {} (accessories: {})", bus, listener.local_addr()?, capabilities);
        Ok(Self {
            bus,
            capabilities,
            listener,
            sink: None,
        })
    }

    /// Forward received non-query frames to `sink`
    pub fn with_sink(mut self, sink: Sender<BusFrame>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            info!("Bus {}: client {} connected", self.bus, peer);

            let bus = self.bus;
            let capabilities = self.capabilities;
            let sink = self.sink.clone();
            tokio::spawn(async move {
                match serve_client(stream, bus, capabilities, sink).await {
                    Ok(()) => info!("Bus {}: client {} closed", bus, peer),
                    Err(e) => warn!("Bus {}: client {} dropped: {}", bus, peer, e),
                }
            });
        }
    }

    /// Accept connections until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let bus = self.bus;
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Bus {}: endpoint shutting down", bus);
                Ok(())
            }
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    bus: BusIndex,
    capabilities: Capabilities,
    sink: Option<Sender<BusFrame>>,
) -> Result<(), FrameCodecError> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, FrameCodec);

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        match frame.command {
            Command::DeviceRequest => {
                debug!("Bus {}: capability query from 0x{:02X}", bus, frame.origin);
                framed.send(capability_reply(bus, capabilities)?).await?;
            }
            _ => {
                debug!("Bus {}: received {:?}", bus, frame);
                if let Some(sink) = &sink {
                    // Receiver gone just means nobody is watching
                    let _ = sink.send(frame);
                }
            }
        }
    }

    Ok(())
}
