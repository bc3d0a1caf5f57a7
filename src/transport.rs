//! UDP transport for OSC traffic
//!
//! A single socket is bound at startup. Every outbound request leaves from it,
//! so engine and auxiliary replies come back to the same port, where the
//! listener task decodes them and hands them to the dispatcher.

use crate::dispatch;
use crate::osc::{self, Message};
use crate::state::ChannelStore;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest datagram we accept
const MAX_DATAGRAM: usize = 65_536;

/// Where an outbound message goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The looper engine
    Engine,
    /// Optional endpoint serving the gain-control family
    Auxiliary,
}

/// Fire-and-forget message sink
///
/// Implementations must not wait for any reply.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message; `Ok` only means it left the process
    async fn send(&self, target: Target, msg: &Message) -> Result<()>;

    /// Whether an auxiliary endpoint is configured
    fn has_auxiliary(&self) -> bool;
}

/// Resolve `host:port` to the first socket address
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("No address found for {}:{}", host, port))
}

/// UDP implementation of [`Transport`]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    engine: SocketAddr,
    auxiliary: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind the local socket. Failing here is fatal for the caller.
    ///
    /// A wildcard `listen` address follows the engine's address family; a
    /// concrete one must already match it, as must the auxiliary endpoint.
    pub async fn bind(
        listen: SocketAddr,
        engine: SocketAddr,
        auxiliary: Option<SocketAddr>,
    ) -> Result<Self> {
        let listen = listen_for(listen, engine);
        if listen.is_ipv4() != engine.is_ipv4() {
            bail!(
                "Listen address {} and engine {} use different address families",
                listen,
                engine
            );
        }
        if let Some(aux) = auxiliary.filter(|a| a.is_ipv4() != engine.is_ipv4()) {
            bail!(
                "Auxiliary endpoint {} and engine {} use different address families",
                aux,
                engine
            );
        }

        let socket = UdpSocket::bind(listen)
            .await
            .with_context(|| format!("Failed to bind OSC reply socket on {}", listen))?;

        Ok(Self {
            socket: Arc::new(socket),
            engine,
            auxiliary,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .context("Failed to read local socket address")
    }

    pub fn engine_addr(&self) -> SocketAddr {
        self.engine
    }

    /// `osc.udp://<ip>:<port>` that remote peers should answer to
    pub async fn reply_url(&self) -> Result<String> {
        let port = self.local_addr()?.port();
        let ip = reply_ip(self.engine).await;
        Ok(format!("osc.udp://{}", SocketAddr::new(ip, port)))
    }

    /// Start the inbound listener task
    ///
    /// Every datagram is decoded and dispatched on its own; a bad datagram
    /// never stops the loop.
    pub fn spawn_listener(&self, store: ChannelStore) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, from) = match socket.recv_from(&mut buf).await {
                    Ok(r) => r,
                    Err(e) => {
                        // ICMP unreachable from a peer that is not up yet surfaces here
                        debug!("OSC receive error: {}", e);
                        continue;
                    }
                };

                match osc::decode_packet(&buf[..len]) {
                    Ok(messages) => {
                        for msg in &messages {
                            debug!("OSC IN ({}): {}", from, msg);
                            dispatch::dispatch(&store, msg);
                        }
                    }
                    Err(e) => debug!("Dropping undecodable datagram from {}: {}", from, e),
                }
            }
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, target: Target, msg: &Message) -> Result<()> {
        let addr = match target {
            Target::Engine => self.engine,
            Target::Auxiliary => self
                .auxiliary
                .context("No auxiliary endpoint configured")?,
        };
        let bytes = osc::encode(msg)?;
        debug!("OSC OUT ({}): {}", addr, msg);
        self.socket
            .send_to(&bytes, addr)
            .await
            .with_context(|| format!("Failed to send {} to {}", msg.addr, addr))?;
        Ok(())
    }

    fn has_auxiliary(&self) -> bool {
        self.auxiliary.is_some()
    }
}

/// Wildcard address of the engine's family when `listen` is a wildcard
fn listen_for(listen: SocketAddr, engine: SocketAddr) -> SocketAddr {
    if !listen.ip().is_unspecified() {
        return listen;
    }
    SocketAddr::new(unspecified(engine), listen.port())
}

fn unspecified(engine: SocketAddr) -> IpAddr {
    if engine.is_ipv4() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    }
}

fn loopback(engine: SocketAddr) -> IpAddr {
    if engine.is_ipv4() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        IpAddr::V6(Ipv6Addr::LOCALHOST)
    }
}

/// Local IP the engine can reach us on
///
/// Loopback engines get the loopback address of their family; otherwise the
/// address the OS would route toward the engine, falling back to loopback.
async fn reply_ip(engine: SocketAddr) -> IpAddr {
    if engine.ip().is_loopback() {
        return loopback(engine);
    }

    let probe = async {
        let sock = UdpSocket::bind(SocketAddr::new(unspecified(engine), 0)).await?;
        sock.connect(engine).await?;
        sock.local_addr()
    };

    match probe.await {
        Ok(addr) if !addr.ip().is_unspecified() => addr.ip(),
        Ok(_) => loopback(engine),
        Err(e) => {
            warn!("Could not determine local address toward {}: {}", engine, e);
            loopback(engine)
        }
    }
}

/// Log the reply endpoint once at startup
pub fn log_endpoints(transport: &UdpTransport, reply_url: &str) {
    info!(
        "OSC engine at {}, replies to {}{}",
        transport.engine,
        reply_url,
        transport
            .auxiliary
            .map(|a| format!(", auxiliary at {}", a))
            .unwrap_or_default()
    );
}
