//! Typed configuration (spec §4.K): TOML file plus `RELAY_`-prefixed
//! environment overrides, validated at load.

use std::path::PathBuf;

use relay_core::{Error, FilterParams, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Absent when neither the config file nor `RELAY_DATA_DIR` sets it;
    /// the CLI's `--data-dir` is still allowed to fill this in afterwards
    /// (main.rs), so this can't be a required field here.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub api_key: Option<String>,
    #[serde(default = "default_bloom_items")]
    pub bloom_items: usize,
    #[serde(default = "default_bloom_fp_rate")]
    pub bloom_fp_rate: f64,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_bloom_items() -> usize {
    20_000
}

fn default_bloom_fp_rate() -> f64 {
    0.001
}

fn default_log_filter() -> String {
    "relay_core=info,relay_server=info,relay_node=info".to_string()
}

impl RelayConfig {
    /// Loads `path` (if it exists) merged with `RELAY_`-prefixed environment
    /// variables, then validates the result.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("RELAY")
                .try_parsing(true)
                .separator("_"),
        );

        let raw = builder
            .build()
            .map_err(|e| Error::Validation(format!("loading config: {e}")))?;
        let cfg: RelayConfig = raw
            .try_deserialize()
            .map_err(|e| Error::Validation(format!("parsing config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if let Some(data_dir) = &self.data_dir {
            if let Some(parent) = data_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(Error::Validation(format!(
                        "data directory parent does not exist: {}",
                        parent.display()
                    )));
                }
            }
        }
        self.filter_params().validate()?;
        Ok(())
    }

    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            items: self.bloom_items,
            fp_rate: self.bloom_fp_rate,
        }
    }
}
