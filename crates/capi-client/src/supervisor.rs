// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Keep-alive and reconnection for a set of connections.
//!
//! Every sweep looks at how long each connection has been silent. One keep-alive interval of
//! silence earns a transport ping; two, or a dead transport, earns a forced reconnect. This is
//! the only place reconnects are decided.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::select;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ChatClient;

/// What the supervisor needs from a connection.
#[async_trait]
pub trait Supervised: Send + Sync {
    fn connected(&self) -> bool;
    fn last_inbound(&self) -> Option<Instant>;
    fn disconnect(&self, force: bool);
    async fn connect(&self) -> bool;
    fn ping(&self) -> bool;
}

#[async_trait]
impl Supervised for ChatClient {
    fn connected(&self) -> bool {
        ChatClient::connected(self)
    }

    fn last_inbound(&self) -> Option<Instant> {
        ChatClient::last_inbound(self)
    }

    fn disconnect(&self, force: bool) {
        ChatClient::disconnect(self, force);
    }

    async fn connect(&self) -> bool {
        ChatClient::connect(self).await.is_ok()
    }

    fn ping(&self) -> bool {
        ChatClient::ping(self, None).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Silence before a ping. Twice this and the connection is considered dead.
    pub keep_alive: Duration,
    pub sweep_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(10),
            sweep_period: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Healthy,
    /// Declared down and force-disconnected; reconnect attempts continue each sweep.
    Recovering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Alive,
    Pinged,
    PingFailed,
    Reconnected,
    ReconnectFailed,
}

struct Watched {
    name: String,
    connection: Arc<dyn Supervised>,
    recovery: Recovery,
}

pub struct Supervisor {
    config: SupervisorConfig,
    watched: Mutex<Vec<Watched>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            watched: Mutex::new(vec![]),
        }
    }

    pub async fn watch(&self, name: impl Into<String>, connection: Arc<dyn Supervised>) {
        self.watched.lock().await.push(Watched {
            name: name.into(),
            connection,
            recovery: Recovery::Healthy,
        });
    }

    pub async fn recovery(&self, name: &str) -> Option<Recovery> {
        self.watched
            .lock()
            .await
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.recovery)
    }

    /// Check every connection once, as of `now`.
    pub async fn sweep(&self, now: Instant) -> Vec<(String, SweepOutcome)> {
        let keep_alive = self.config.keep_alive;
        let mut watched = self.watched.lock().await;
        let mut outcomes = Vec::with_capacity(watched.len());
        for entry in watched.iter_mut() {
            // Nothing received yet counts as exactly one interval of silence.
            let idle = entry
                .connection
                .last_inbound()
                .map_or(keep_alive, |last| now.saturating_duration_since(last));
            let connected = entry.connection.connected();

            let outcome = if idle >= keep_alive * 2 || !connected {
                if entry.recovery == Recovery::Healthy {
                    warn!(name = %entry.name, ?idle, connected, "Connection is down, reconnecting");
                    entry.recovery = Recovery::Recovering;
                    entry.connection.disconnect(true);
                }
                if entry.connection.connect().await {
                    info!(name = %entry.name, "Reconnected");
                    entry.recovery = Recovery::Healthy;
                    SweepOutcome::Reconnected
                } else {
                    debug!(name = %entry.name, "Reconnect failed, will retry");
                    SweepOutcome::ReconnectFailed
                }
            } else if idle >= keep_alive {
                if entry.connection.ping() {
                    SweepOutcome::Pinged
                } else {
                    SweepOutcome::PingFailed
                }
            } else {
                SweepOutcome::Alive
            };
            outcomes.push((entry.name.clone(), outcome));
        }
        outcomes
    }

    /// Sweep every `sweep_period` until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sweep_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep(Instant::now()).await;
                }
            }
        }
        debug!("Supervisor stopped");
    }
}
