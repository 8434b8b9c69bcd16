//! Hub configuration
//!
//! Read from a JSON file; any field left out takes its default. Durations
//! are human-readable strings such as `"90s"`, `"1m"` or `"24h"`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relayhub_core::{HubError, HubResult, MacAddress, MAX_REMOTE_NODES};
use relayhub_state::{
    SchedulerConfig, SyncConfig, DEFAULT_LOG_SCAN_DEPTH, DEFAULT_MAX_DELAY, DEFAULT_MAX_NODES,
    DEFAULT_MAX_SCHEDULED, DEFAULT_MIN_DELAY, DEFAULT_RETENTION,
};
use serde::{Deserialize, Serialize};

use crate::telemetry::LogConfig;

/// Where a remote unit's hardware address can be reached over UDP
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub address: MacAddress,
    pub endpoint: SocketAddr,
}

/// Hub configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Scheduler evaluation period
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Remote node cap
    pub max_nodes: usize,
    /// Schedule queue cap
    pub max_scheduled: usize,
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// How long executed actions stay listed
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    /// Trailing log records scanned for a duration lookup
    pub log_scan_depth: usize,
    pub local_name: String,
    pub data_dir: PathBuf,
    /// UDP bind address of the link
    pub bind: SocketAddr,
    /// Hardware address the hub sends as
    pub own_address: MacAddress,
    pub routes: Vec<RouteConfig>,
    pub log: LogConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            tick_interval: Duration::from_secs(1),
            max_nodes: DEFAULT_MAX_NODES,
            max_scheduled: DEFAULT_MAX_SCHEDULED,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retention: DEFAULT_RETENTION,
            log_scan_depth: DEFAULT_LOG_SCAN_DEPTH,
            local_name: "Hub".into(),
            data_dir: PathBuf::from("relayhub-data"),
            bind: SocketAddr::from(([0, 0, 0, 0], 47100)),
            own_address: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            routes: Vec::new(),
            log: LogConfig::default(),
        }
    }
}

impl HubConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> HubResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| HubError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> HubResult<Self> {
        let config: HubConfig =
            serde_json::from_str(text).map_err(|e| HubError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.tick_interval.is_zero() {
            return Err(HubError::Config("tick_interval must be non-zero".into()));
        }
        if self.min_delay > self.max_delay {
            return Err(HubError::Config(format!(
                "min_delay {:?} exceeds max_delay {:?}",
                self.min_delay, self.max_delay
            )));
        }
        if self.max_nodes > MAX_REMOTE_NODES {
            return Err(HubError::Config(format!(
                "max_nodes {} exceeds the {} addressable units",
                self.max_nodes, MAX_REMOTE_NODES
            )));
        }
        if self.local_name.trim().is_empty() {
            return Err(HubError::Config("local_name must not be empty".into()));
        }
        if self.log_scan_depth == 0 {
            return Err(HubError::Config("log_scan_depth must be at least 1".into()));
        }
        Ok(())
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            local_name: self.local_name.clone(),
            max_nodes: self.max_nodes,
            log_scan_depth: self.log_scan_depth,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_actions: self.max_scheduled,
            min_delay: self.min_delay,
            max_delay: self.max_delay,
            retention: self.retention,
        }
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
