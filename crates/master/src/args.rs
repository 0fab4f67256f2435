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

use clap::builder::ValueHint;
use clap_derive::Parser;
use db_rpc_common::{DEFAULT_DB_QUEUE, DEFAULT_ORACLE_QUEUE};
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything the master needs to bring up the database side of the farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Where clients (and the master's own tasks) send database requests.
    pub db_queue: String,
    /// Where oracles attach to the router.
    pub oracle_queue: String,
    pub oracle_count: usize,
    pub poll_timeout_ms: u64,
    /// ABIs the farm builds for, as reported by GETABIS.
    pub build_abis: Vec<String>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            db_queue: DEFAULT_DB_QUEUE.to_string(),
            oracle_queue: DEFAULT_ORACLE_QUEUE.to_string(),
            oracle_count: 3,
            poll_timeout_ms: 1000,
            build_abis: vec!["cp34m".to_string(), "cp35m".to_string()],
        }
    }
}

impl MasterConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Parser, Debug, Serialize, Deserialize)]
pub struct Args {
    #[arg(
        long,
        value_name = "config",
        help = "Path to configuration (YAML) file to use, if any. If not specified, defaults are used.\
                Configuration file values can be overridden by command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        long,
        value_name = "db-queue",
        help = "Address clients send database requests to"
    )]
    pub db_queue: Option<String>,

    #[arg(
        long,
        value_name = "oracle-queue",
        help = "Address oracles attach to the router on"
    )]
    pub oracle_queue: Option<String>,

    #[arg(
        short,
        long,
        value_name = "oracles",
        help = "Number of oracles to run behind the router"
    )]
    pub oracles: Option<usize>,

    #[arg(
        long,
        value_name = "poll-timeout-ms",
        help = "How long each task waits on its queues before ticking again"
    )]
    pub poll_timeout_ms: Option<u64>,

    #[arg(
        long,
        value_name = "abi",
        help = "ABI to build for; repeat for each one. Replaces the configured list."
    )]
    pub build_abi: Vec<String>,

    #[arg(
        long,
        value_name = "num-io-threads",
        help = "Number of ZeroMQ IO threads to use",
        default_value = "1"
    )]
    pub num_io_threads: i32,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

impl Args {
    fn merge_config(&self, mut config: MasterConfig) -> Result<MasterConfig, eyre::Report> {
        if let Some(db_queue) = &self.db_queue {
            config.db_queue = db_queue.clone();
        }
        if let Some(oracle_queue) = &self.oracle_queue {
            config.oracle_queue = oracle_queue.clone();
        }
        if let Some(oracles) = self.oracles {
            config.oracle_count = oracles;
        }
        if let Some(poll_timeout_ms) = self.poll_timeout_ms {
            config.poll_timeout_ms = poll_timeout_ms;
        }
        if !self.build_abi.is_empty() {
            config.build_abis = self.build_abi.clone();
        }
        if config.oracle_count == 0 {
            return Err(eyre!("At least one oracle is needed to answer requests"));
        }
        Ok(config)
    }

    pub fn load_config(&self) -> Result<MasterConfig, eyre::Report> {
        let config = match &self.config_file {
            Some(config_path) => Figment::new()
                .merge(Serialized::defaults(MasterConfig::default()))
                .merge(Yaml::file(config_path))
                .extract::<MasterConfig>()
                .map_err(|e| {
                    eyre!(
                        "Failed to parse configuration from {:?}: {}",
                        config_path,
                        e
                    )
                })?,
            None => MasterConfig::default(),
        };
        self.merge_config(config)
    }
}
