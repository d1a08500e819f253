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

//! Chat bot host
//!
//! Runs one bot instance per enabled entry in the config file, each with its own connection and
//! permission database, and keeps them connected until interrupted.
//!
//! ```bash
//! capi-host --config-file bots.yaml
//! ```

mod commands;
mod config;
mod instance;

use std::sync::Arc;

use capi_client::Supervisor;
use capi_common::tracing::init_tracing;
use clap::Parser;
use eyre::Result;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::instance::BotInstance;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse().resolve()?;
    init_tracing(args.debug)?;

    let mut hup_signal = signal(SignalKind::hangup())?;
    let mut stop_signal = signal(SignalKind::interrupt())?;

    let supervisor = Arc::new(Supervisor::new(args.supervisor_config()));
    let mut instances = vec![];
    for (name, instance_config) in &args.instances {
        if !instance_config.enabled {
            info!(instance = %name, "Instance disabled, skipping");
            continue;
        }
        let instance = BotInstance::new(name, instance_config.clone())?;
        instance.start().await;
        supervisor
            .watch(name.clone(), Arc::new(instance.client().clone()))
            .await;
        instances.push(instance);
    }
    if instances.is_empty() {
        warn!("No enabled instances configured");
    }

    let cancel = CancellationToken::new();
    let supervisor_task = tokio::spawn({
        let supervisor = supervisor.clone();
        let cancel = cancel.clone();
        async move { supervisor.run(cancel).await }
    });

    info!(instances = instances.len(), "Host started");
    select! {
        _ = hup_signal.recv() => {
            info!("HUP received, stopping...");
        },
        _ = stop_signal.recv() => {
            info!("STOP received, stopping...");
        }
    }

    cancel.cancel();
    supervisor_task.await?;
    for instance in &instances {
        if let Err(e) = instance.stop(true) {
            error!(instance = %instance.name(), error = %e, "Could not save permission database");
        }
    }
    info!("Done.");

    Ok(())
}
