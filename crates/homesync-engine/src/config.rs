use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use homesync_core::EntityKind;

use crate::manifest::DEFAULT_MANIFEST_PATH;
use crate::transport::TransportConfig;

/// Configuration for the homesync command-line client.
#[derive(Parser, Debug, Clone)]
#[command(name = "homesync")]
#[command(about = "Local cache synchronizer for a household-management server")]
pub struct Config {
    /// Base URL of the server API (e.g. https://grocy.example.org/api)
    #[arg(long, env = "HOMESYNC_SERVER_URL")]
    pub server_url: String,

    /// API key sent with every request
    #[arg(long, env = "HOMESYNC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Directory holding the local cache
    #[arg(long, env = "HOMESYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30", env = "HOMESYNC_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Endpoint reporting the server's change-tokens
    #[arg(long, default_value = DEFAULT_MANIFEST_PATH, env = "HOMESYNC_MANIFEST_PATH")]
    pub manifest_path: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Bring cached kinds up to date (all kinds when none are given)
    Refresh {
        /// Fetch even when the change-token is unchanged
        #[arg(long)]
        force: bool,

        kinds: Vec<EntityKind>,
    },
    /// Show every cached table
    Status,
    /// List the kinds that can be cached
    Kinds,
    /// Forget change-tokens so the next refresh fetches
    Invalidate {
        #[arg(required = true)]
        kinds: Vec<EntityKind>,
    },
    /// Drop every cached table
    Clear,
    /// Check that the server is reachable
    Ping,
}

impl Config {
    /// Get the effective cache directory.
    pub fn effective_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("homesync")
        })
    }

    pub fn transport_config(&self) -> TransportConfig {
        let config = TransportConfig::new(self.server_url.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs));
        match &self.api_key {
            Some(key) => config.with_api_key(key.clone()),
            None => config,
        }
    }
}
