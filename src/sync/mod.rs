//! Outbound synchronizer - keeps the mirrored loop table fresh
//!
//! At startup the engine is pinged, given a moment to announce its loop
//! count, and asked to push the meter/position controls on its own. After
//! that a cadence task re-polls the state, next state and gain of every
//! announced loop. The protocol has no delivery guarantee, so the
//! cadence is also the retry mechanism: a dropped reply heals on the next
//! sweep.
//!
//! Gain is read from one source only: the auxiliary endpoint when one is
//! configured, the engine's `wet` control otherwise.

use crate::osc::address::{self, Control};
use crate::osc::{Arg, Message};
use crate::state::ChannelStore;
use crate::transport::{Target, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Synchronizer settings taken from the config at startup
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Engine address prefix, e.g. `/sl`
    pub prefix: String,
    /// Push interval requested in registrations
    pub register_interval_ms: i32,
    /// Pause after the ping so the pong can widen the channel count
    pub handshake_wait: Duration,
}

/// Builds and emits registration and poll requests
pub struct Synchronizer {
    transport: Arc<dyn Transport>,
    store: ChannelStore,
    settings: SyncSettings,
    reply_url: String,
}

impl Synchronizer {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: ChannelStore,
        settings: SyncSettings,
        reply_url: String,
    ) -> Self {
        Self {
            transport,
            store,
            settings,
            reply_url,
        }
    }

    /// `/ping [reply_url, "/pong"]`
    pub fn ping_message(&self) -> Message {
        Message::new(
            address::PING,
            vec![self.reply_url.as_str().into(), address::PONG.into()],
        )
    }

    /// `<prefix>/<i>/register_auto_update [control, interval, reply_url, reply_path]`
    pub fn registration(&self, index: usize, control: Control) -> Message {
        let prefix = &self.settings.prefix;
        Message::new(
            address::register_address(prefix, index),
            vec![
                control.name().into(),
                Arg::Int(self.settings.register_interval_ms),
                self.reply_url.as_str().into(),
                address::update_path(prefix, index, control).into(),
            ],
        )
    }

    /// `<prefix>/<i>/get [control, reply_url, reply_path]`
    pub fn poll(&self, index: usize, control: Control) -> Message {
        let prefix = &self.settings.prefix;
        Message::new(
            address::get_address(prefix, index),
            vec![
                control.name().into(),
                self.reply_url.as_str().into(),
                address::update_path(prefix, index, control).into(),
            ],
        )
    }

    /// Argument-less gain read for the auxiliary endpoint
    pub fn gain_query(&self, index: usize) -> Message {
        Message::new(address::gain_address(index), vec![])
    }

    async fn send(&self, target: Target, msg: Message) {
        if let Err(e) = self.transport.send(target, &msg).await {
            warn!("OSC send failed ({}): {:#}", msg.addr, e);
        }
    }

    pub async fn handshake(&self) {
        self.send(Target::Engine, self.ping_message()).await;
    }

    /// Gain read request for loop `index` from the authoritative source
    fn gain_read(&self, index: usize) -> (Target, Message) {
        if self.transport.has_auxiliary() {
            (Target::Auxiliary, self.gain_query(index))
        } else {
            (Target::Engine, self.poll(index, Control::Wet))
        }
    }

    /// Register push updates for every currently announced loop
    ///
    /// Returns the number of loops covered. Loops announced later are only
    /// polled.
    pub async fn register_all(&self) -> usize {
        let count = self.store.channel_count();
        for index in 0..count {
            for control in Control::REGISTERED {
                self.send(Target::Engine, self.registration(index, control))
                    .await;
            }
            let (target, msg) = self.gain_read(index);
            self.send(target, msg).await;
        }
        count
    }

    /// Ping, wait for the pong window, then register
    pub async fn startup(&self) {
        self.handshake().await;
        if !self.settings.handshake_wait.is_zero() {
            tokio::time::sleep(self.settings.handshake_wait).await;
        }
        let count = self.register_all().await;
        info!("Registered auto updates for {} loop(s)", count);
    }

    /// One poll pass over the loops announced right now
    pub async fn sweep(&self) {
        let count = self.store.channel_count();
        for index in 0..count {
            for control in Control::POLLED {
                self.send(Target::Engine, self.poll(index, control)).await;
            }
            let (target, msg) = self.gain_read(index);
            self.send(target, msg).await;
        }
    }

    /// Run sweeps forever, sleeping the current cadence between them
    ///
    /// The cadence is re-read after every sweep, so a reloaded interval takes
    /// effect on the next one.
    pub fn spawn_poller(self: Arc<Self>, cadence: watch::Receiver<Duration>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last = *cadence.borrow();
            debug!("Poll cadence {:?}", last);
            loop {
                self.sweep().await;
                let interval = *cadence.borrow();
                if interval != last {
                    info!("Poll cadence changed to {:?}", interval);
                    last = interval;
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}
