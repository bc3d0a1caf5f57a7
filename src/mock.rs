//! Stand-in for the auxiliary gain endpoint
//!
//! Logs every gain write, remembers it per strip and answers argument-less
//! gain queries with the stored value, so the surface can be exercised without
//! a mixer.

use crate::osc::address::{self, GainAddress};
use crate::osc::{self, Arg, Message};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Gain reported for strips that were never written
pub const DEFAULT_GAIN: f32 = 0.5;

#[derive(Debug, Default)]
pub struct MockAuxiliary {
    /// 0-based loop index -> last written gain
    gains: HashMap<usize, f32>,
}

impl MockAuxiliary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(&self, index: usize) -> f32 {
        self.gains.get(&index).copied().unwrap_or(DEFAULT_GAIN)
    }

    /// Handle one message; returns the reply to send back, if any
    pub fn handle(&mut self, msg: &Message) -> Option<Message> {
        let index = match address::parse_gain_address(&msg.addr) {
            GainAddress::Index(index) => index,
            GainAddress::BadId | GainAddress::NotGain => {
                debug!("Mock ignoring {}", msg);
                return None;
            }
        };

        match msg.args.as_slice() {
            [] => Some(Message::new(
                address::gain_address(index),
                vec![Arg::Float(self.gain(index))],
            )),
            [value] => {
                if let Some(gain) = value.as_f32() {
                    info!("🎚️  Strip {} gain -> {:.4}", index + 1, gain);
                    self.gains.insert(index, gain);
                } else {
                    debug!("Mock ignoring non-numeric gain {}", msg);
                }
                None
            }
            _ => {
                debug!("Mock ignoring {}", msg);
                None
            }
        }
    }
}

/// Bind `port` and serve until the task is dropped
pub async fn run(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("Failed to bind mock auxiliary on {}", addr))?;
    info!("🧪 Mock auxiliary endpoint listening on {}", socket.local_addr()?);

    serve(socket, MockAuxiliary::new()).await
}

async fn serve(socket: UdpSocket, mut mock: MockAuxiliary) -> Result<()> {
    let mut buf = vec![0u8; 65_536];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                debug!("Mock receive error: {}", e);
                continue;
            }
        };
        let messages = match osc::decode_packet(&buf[..len]) {
            Ok(m) => m,
            Err(e) => {
                debug!("Mock dropping datagram from {}: {}", from, e);
                continue;
            }
        };

        for msg in &messages {
            if let Some(reply) = mock.handle(msg) {
                let bytes = osc::encode(&reply)?;
                if let Err(e) = socket.send_to(&bytes, from).await {
                    debug!("Mock reply to {} failed: {}", from, e);
                }
            }
        }
    }
}
