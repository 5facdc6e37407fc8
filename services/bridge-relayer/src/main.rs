// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bridge Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use anyhow::Context;
use bridge_relayer_config::cli::{create_store, load_config, setup_logger, Opts};
use bridge_relayer_context::RelayerContext;
use bridge_relayer_utils::probe;
use tokio::signal::unix;
use tokio::time;

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, args.json_logs)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is loaded and verified from the given directory
    let config = load_config(args.config_dir.clone())?;
    // persistent storage of the block cursors
    let store = create_store(&args)?;
    let ctx = RelayerContext::new(config, store)
        .context("failed to create the relayer context")?;

    // size of the block store, refreshed every hour
    let store_size_task = {
        let store = ctx.store().clone();
        let metrics = ctx.metrics.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let size = store.get_data_stored_size();
                metrics.store_size.set(i64::try_from(size).unwrap_or(i64::MAX));
            }
        })
    };

    // fails if any enabled chain cannot be reached or has no usable signer.
    let relayer = bridge_relayer::service::ignite(&ctx).await?;
    let mut relayer_handle = tokio::spawn(relayer.start(ctx.shutdown_signal()));
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let mut hangup_signal = unix::signal(unix::SignalKind::hangup())?;
    let shutdown = || {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            shutdown = true
        );
        tracing::warn!("Shutting down...");
        // send shutdown signal to all of the application.
        ctx.shutdown();
        store_size_task.abort();
    };
    let stopped = tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            shutdown();
            None
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            shutdown();
            None
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
            shutdown();
            None
        },
        _ = hangup_signal.recv() => {
            tracing::warn!("Got Hangup signal ...");
            shutdown();
            None
        },
        // the relayer only stops on its own after a fatal error.
        joined = &mut relayer_handle => {
            shutdown();
            Some(joined)
        },
    };
    let joined = match stopped {
        Some(joined) => joined,
        None => relayer_handle.await,
    };
    match joined {
        Ok(Ok(())) => {
            tracing::info!("Clean Exit ..");
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Relayer stopped");
            Err(e.into())
        }
        Err(e) => Err(anyhow::anyhow!("relayer task failed: {e}")),
    }
}
