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

use config::{Config, File};
use std::path::{Path, PathBuf};

use super::*;

/// Environment variables with this prefix override file values.
pub const ENV_PREFIX: &str = "BRIDGE";

/// Finds every `toml` and `json` file under `base_dir`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> bridge_relayer_utils::Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(bridge_relayer_utils::Error::from))
        .collect()
}

/// Merges `files` (later files win) and the environment into a [`RelayerConfig`].
pub fn parse_from_files(
    files: &[PathBuf],
) -> bridge_relayer_utils::Result<RelayerConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of BRIDGE).
    let builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__"),
    );
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: Result<
        RelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Loads and validates the configuration found in `path`.
pub fn load<P: AsRef<Path>>(
    path: P,
) -> bridge_relayer_utils::Result<RelayerConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// Names unnamed chains after their key, drops disabled chains and verifies
/// the result.
pub fn postloading_process(
    mut config: RelayerConfig,
) -> bridge_relayer_utils::Result<RelayerConfig> {
    tracing::trace!("Checking configration sanity ...");

    config.chains.retain(|name, chain| {
        if !chain.enabled() {
            tracing::debug!("Chain {} is disabled, skipping", name);
        }
        chain.enabled()
    });
    for (name, chain) in config.chains.iter_mut() {
        match chain {
            ChainConfig::Evm(c) if c.name.is_empty() => {
                c.name = name.clone();
            }
            ChainConfig::Evm(_) => {}
        }
    }
    config.verify()?;

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::SignerConfig;
    use std::io::Write;

    const GOERLI: &str = r#"
[relayer]
channel-capacity = 4

[chains.goerli]
type = "evm"
id = 1
endpoint = "http://localhost:8545"
bridge = "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B"
erc20-handler = "0x3167776db165D8eA0f51790CA2bbf44Db5105ADF"
block-confirmations = 5
block-interval = 10
start-block = 30
signer = { type = "local", private-key = "0x000000000000000000000000000000000000000000000000000000000000dead" }
"#;

    const SEPOLIA: &str = r#"
{
  "chains": {
    "sepolia": {
      "type": "evm",
      "id": 2,
      "endpoint": "http://localhost:9545",
      "ws-endpoint": "ws://localhost:9546",
      "bridge": "0x0000000000000000000000000000000000000002",
      "generic-handler": "0x0000000000000000000000000000000000000003",
      "gas-limit": 900000,
      "signer": { "type": "kms", "key-id": "relayer-key" },
      "voter": { "max-retries": 2 }
    }
  }
}
"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_and_merges_all_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "goerli.toml", GOERLI);
        write(dir.path(), "sepolia.json", SEPOLIA);
        write(dir.path(), "README.md", "ignored");

        let config = load(dir.path()).unwrap();
        assert_eq!(config.relayer.channel_capacity, 4);
        assert_eq!(config.chains.len(), 2);

        let ChainConfig::Evm(goerli) = &config.chains["goerli"];
        assert_eq!(goerli.name, "goerli");
        assert_eq!(goerli.id, DomainId::new(1));
        assert_eq!(goerli.block_confirmations, 5);
        assert_eq!(goerli.block_interval, 10);
        assert_eq!(goerli.start_block, Some(30));
        assert_eq!(goerli.gas_limit, defaults::gas_limit());
        assert_eq!(goerli.handlers().count(), 1);
        assert!(matches!(
            goerli.signer,
            SignerConfig::Local { private_key: Some(_) }
        ));

        let ChainConfig::Evm(sepolia) = &config.chains["sepolia"];
        assert_eq!(sepolia.gas_limit, 900_000);
        assert!(sepolia.ws_endpoint.is_some());
        assert_eq!(sepolia.voter.max_retries, 2);
        assert_eq!(
            sepolia.voter.follow_up_timeout,
            defaults::follow_up_timeout()
        );
        assert_eq!(sepolia.signer.backend(), "kms");

        let ids: Vec<_> =
            config.enabled_chains().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![DomainId::new(1), DomainId::new(2)]);
    }

    #[test]
    fn unknown_chain_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = GOERLI.replace(r#"type = "evm""#, r#"type = "cosmos""#);
        write(dir.path(), "bad.toml", &bad);
        assert!(load(dir.path()).is_err());
    }

    #[test]
    fn duplicate_domain_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "goerli.toml", GOERLI);
        write(dir.path(), "sepolia.json", &SEPOLIA.replace(r#""id": 2"#, r#""id": 1"#));
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, bridge_relayer_utils::Error::InvalidConfig(_)));
    }

    #[test]
    fn zero_block_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "goerli.toml",
            &GOERLI.replace("block-interval = 10", "block-interval = 0"),
        );
        assert!(load(dir.path()).is_err());
    }

    #[test]
    fn local_signer_needs_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let no_key = GOERLI.replace(
            r#"signer = { type = "local", private-key = "0x000000000000000000000000000000000000000000000000000000000000dead" }"#,
            r#"signer = { type = "local" }"#,
        );
        write(dir.path(), "goerli.toml", &no_key);
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, bridge_relayer_utils::Error::MissingSecrets(_)));
    }

    #[test]
    fn disabled_chains_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "goerli.toml",
            &GOERLI.replace(r#"type = "evm""#, "type = \"evm\"\nenabled = false"),
        );
        let config = load(dir.path()).unwrap();
        assert!(config.chains.is_empty());
    }
}
