// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Duration;
use url::Url;

pub const DEFAULT_RPC_URL: &str = "http://localhost:8080";
pub const DEFAULT_BURST: u32 = 10;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_EMPTY_BLOCK_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_HISTORY_BLOCKS: usize = 8;
pub const DEFAULT_RECEIPT_SAMPLES: usize = 16;

/// Method mix observed on a public mainnet endpoint (Infura, Dec 2019).
pub fn default_methods() -> BTreeMap<String, u64> {
    [
        ("eth_getCode", 100),
        ("eth_getLogs", 250),
        ("eth_getTransactionByHash", 250),
        ("eth_blockNumber", 350),
        ("eth_getTransactionCount", 400),
        ("eth_getBlockByNumber", 400),
        ("eth_getBalance", 550),
        ("eth_getTransactionReceipt", 600),
        ("eth_call", 2000),
    ]
    .into_iter()
    .map(|(method, weight)| (method.to_owned(), weight))
    .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid method weight `{0}`, expected NAME:WEIGHT")]
    MethodWeight(String),

    #[error("method {0} given more than once")]
    DuplicateMethod(String),

    #[error("rate limit must be a non-negative number, got {0}")]
    RateLimit(f64),

    #[error("burst must be at least 1")]
    Burst,

    #[error("invalid rpc url: {0}")]
    RpcUrl(#[from] url::ParseError),
}

/// One `NAME:WEIGHT` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodWeight {
    pub method: String,
    pub weight: u64,
}

impl FromStr for MethodWeight {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::MethodWeight(s.to_owned());
        let (method, weight) = s.rsplit_once(':').ok_or_else(invalid)?;
        let method = method.trim();
        if method.is_empty() {
            return Err(invalid());
        }
        let weight = weight.trim().parse().map_err(|_| invalid())?;
        Ok(Self {
            method: method.to_owned(),
            weight,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "monad-rpc-loadgen", version, about, long_about = None)]
pub struct Cli {
    /// Node used to sample chain state
    #[arg(long)]
    pub rpc_url: Option<Url>,

    /// Method weight as NAME:WEIGHT, may be repeated. Replaces the default mix
    #[arg(short = 'm', long = "method", value_name = "NAME:WEIGHT")]
    pub methods: Vec<MethodWeight>,

    /// Requests per second, 0 for unthrottled
    #[arg(short = 'r', long)]
    pub rate_limit: Option<f64>,

    #[arg(long)]
    pub burst: Option<u32>,

    #[arg(long)]
    pub refresh_interval_secs: Option<u64>,

    #[arg(long)]
    pub empty_block_backoff_secs: Option<u64>,

    /// Number of recent blocks snapshots sample from
    #[arg(long)]
    pub history_blocks: Option<usize>,

    /// Receipts fetched per refresh to discover contracts and topics
    #[arg(long)]
    pub receipt_samples: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// TOML file with the same keys and a [methods] table
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub rpc_url: Option<Url>,
    pub rate_limit: Option<f64>,
    pub burst: Option<u32>,
    pub refresh_interval_secs: Option<u64>,
    pub empty_block_backoff_secs: Option<u64>,
    pub history_blocks: Option<usize>,
    pub receipt_samples: Option<usize>,
    pub seed: Option<u64>,
    pub methods: Option<BTreeMap<String, u64>>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoadgenConfig {
    pub rpc_url: Url,
    pub methods: BTreeMap<String, u64>,
    /// `None` when unthrottled.
    pub rate_limit: Option<f64>,
    pub burst: u32,
    pub refresh_interval: Duration,
    pub empty_block_backoff: Duration,
    pub history_blocks: usize,
    pub receipt_samples: usize,
    pub seed: u64,
}

impl Cli {
    /// Loads the config file, if any, and applies command line overrides.
    pub fn resolve(&self) -> Result<LoadgenConfig, ConfigError> {
        let file = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    pub fn merge(&self, file: FileConfig) -> Result<LoadgenConfig, ConfigError> {
        let methods = if self.methods.is_empty() {
            file.methods.unwrap_or_else(default_methods)
        } else {
            let mut methods = BTreeMap::new();
            for MethodWeight { method, weight } in &self.methods {
                if methods.insert(method.clone(), *weight).is_some() {
                    return Err(ConfigError::DuplicateMethod(method.clone()));
                }
            }
            methods
        };

        let rate_limit = match self.rate_limit.or(file.rate_limit) {
            Some(rate) if !(rate.is_finite() && rate >= 0.0) => {
                return Err(ConfigError::RateLimit(rate))
            }
            Some(rate) if rate > 0.0 => Some(rate),
            _ => None,
        };
        let burst = self.burst.or(file.burst).unwrap_or(DEFAULT_BURST);
        if burst == 0 {
            return Err(ConfigError::Burst);
        }

        let rpc_url = match self.rpc_url.clone().or(file.rpc_url) {
            Some(url) => url,
            None => Url::parse(DEFAULT_RPC_URL)?,
        };

        Ok(LoadgenConfig {
            rpc_url,
            methods,
            rate_limit,
            burst,
            refresh_interval: Duration::from_secs(
                self.refresh_interval_secs
                    .or(file.refresh_interval_secs)
                    .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
            ),
            empty_block_backoff: Duration::from_secs(
                self.empty_block_backoff_secs
                    .or(file.empty_block_backoff_secs)
                    .unwrap_or(DEFAULT_EMPTY_BLOCK_BACKOFF_SECS),
            ),
            history_blocks: self
                .history_blocks
                .or(file.history_blocks)
                .unwrap_or(DEFAULT_HISTORY_BLOCKS),
            receipt_samples: self
                .receipt_samples
                .or(file.receipt_samples)
                .unwrap_or(DEFAULT_RECEIPT_SAMPLES),
            seed: self.seed.or(file.seed).unwrap_or_else(wall_clock_seed),
        })
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
