use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tallystore::StoreConfig;

pub const DEFAULT_DATA_DIR: &str = "./tally-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub remote_url: Option<String>,
    pub quiet_period: Duration,
    pub remote_timeout: Duration,
    pub offline: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = lookup("TALLY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let remote_url = lookup("TALLY_REMOTE_URL").filter(|url| !url.trim().is_empty());

        let quiet_ms = lookup("TALLY_QUIET_MS")
            .unwrap_or_else(|| "300".to_string())
            .parse::<u64>()
            .context("TALLY_QUIET_MS must be a number of milliseconds")?;

        let timeout_ms = lookup("TALLY_TIMEOUT_MS")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u64>()
            .context("TALLY_TIMEOUT_MS must be a number of milliseconds")?;

        Ok(Self {
            data_dir,
            remote_url,
            quiet_period: Duration::from_millis(quiet_ms),
            remote_timeout: Duration::from_millis(timeout_ms),
            offline: false,
        })
    }

    /// Command line flags win over the environment.
    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        remote_url: Option<String>,
        offline: bool,
    ) -> Self {
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        if remote_url.is_some() {
            self.remote_url = remote_url;
        }
        self.offline |= offline;
        self
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new()
            .quiet_period(self.quiet_period)
            .remote_timeout(self.remote_timeout)
    }
}
