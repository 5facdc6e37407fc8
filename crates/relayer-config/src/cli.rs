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

use crate::RelayerConfig;
use anyhow::Context;
use directories_next::ProjectDirs;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

/// Package identifier, used to find the default config and data directories.
pub const PACKAGE_ID: [&str; 3] = ["tools", "webb", "bridge-relayer"];

/// Command line options of the relayer.
#[derive(StructOpt, Debug)]
#[structopt(name = "Bridge Relayer")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: Option<PathBuf>,
    /// Directory of the block store. Defaults to a `store` directory next to
    /// the configuration directory.
    #[structopt(long = "blockstore", value_name = "PATH", parse(from_os_str))]
    pub blockstore: Option<PathBuf>,
    /// Create the Database Store in a temporary directory.
    /// and will be deleted when the process exits.
    #[structopt(long)]
    pub tmp: bool,
    /// Print logs as JSON lines instead of the pretty format.
    #[structopt(long)]
    pub json_logs: bool,
}

/// Loads the configuration from `config_dir`, or from the default config
/// directory of the platform.
pub fn load_config<P>(
    config_dir: Option<P>,
) -> Result<RelayerConfig, anyhow::Error>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for bridge relayer");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let v = crate::utils::load(path)?;
    tracing::trace!("Config loaded..");
    Ok(v)
}

/// Maps the number of `-v` flags to a log level.
pub fn log_level(verbosity: i32) -> tracing::Level {
    use tracing::Level;
    match verbosity {
        i32::MIN..=0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the global `tracing` subscriber.
pub fn setup_logger(verbosity: i32, json: bool) -> anyhow::Result<()> {
    let log_level = log_level(verbosity);
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in ["bridge_relayer", "bridge_ew_evm", "bridge_event_watcher_traits"] {
        env_filter = env_filter.add_directive(
            format!("{target}={log_level}")
                .parse::<tracing_subscriber::filter::Directive>()
                .context("valid log directive")?,
        );
    }
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    // json is easy to parse, which integration tests and log shippers rely on.
    if json || cfg!(feature = "integration-tests") {
        logger
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        logger.pretty().try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

/// Where the block store lives, given the command line options.
pub fn store_path(opts: &Opts) -> anyhow::Result<PathBuf> {
    if let Some(p) = opts.blockstore.as_ref() {
        return Ok(p.clone());
    }
    let db_path = match opts.config_dir.as_ref() {
        Some(p) => match p.parent() {
            Some(parent) => parent.join("store"),
            None => p.join("store"),
        },
        None => {
            let dirs = ProjectDirs::from(
                PACKAGE_ID[0],
                PACKAGE_ID[1],
                PACKAGE_ID[2],
            )
            .context("failed to get data dir")?;
            dirs.data_local_dir().join("store")
        }
    };
    Ok(db_path)
}

/// Opens the block store selected by the command line options.
pub fn create_store(
    opts: &Opts,
) -> anyhow::Result<bridge_relayer_store::SledStore> {
    // check if we shall use the temp dir.
    if opts.tmp {
        tracing::debug!("Using temp dir for store");
        let store = bridge_relayer_store::SledStore::temporary()?;
        return Ok(store);
    }
    let db_path = store_path(opts)?;
    tracing::debug!("Opening block store at {}", db_path.display());
    let store = bridge_relayer_store::SledStore::open(db_path)?;
    Ok(store)
}
