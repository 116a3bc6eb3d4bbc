use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;
use std::{env, fmt, path};

use serde::{Deserialize, Serialize};
pub use settings::ConfigError;
use settings::{write_field, write_title};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub database: DatabaseSettings,
    pub dispatch: Dispatch,
    pub correlation: Correlation,
    pub rewards: Rewards,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Dispatch {
    /// Seconds between fan-out periods
    pub interval_secs: u64,
    /// Frames that may wait in one connection's send queue
    pub outbound_queue_capacity: usize,
    /// Outstanding checks a single validator may owe before it is skipped
    pub max_pending_per_validator: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Correlation {
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rewards {
    /// Credit added to a validator's pending payout per accepted result
    pub per_check: u32,
}

impl Default for Server {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8081 }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: "uppe_hub.db".into() }
    }
}

impl Default for Dispatch {
    fn default() -> Self {
        Self { interval_secs: 60, outbound_queue_capacity: 256, max_pending_per_validator: 1024 }
    }
}

impl Default for Correlation {
    fn default() -> Self {
        Self { stale_after_secs: 120, sweep_interval_secs: 30 }
    }
}

impl Default for Rewards {
    fn default() -> Self {
        Self { per_check: 100 }
    }
}

impl Server {
    /// Listen address; `bind` may be an IPv4 or IPv6 literal
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.bind.parse::<IpAddr>()?, self.port))
    }
}

impl Dispatch {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Correlation {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_title_1 = |f: &mut fmt::Formatter<'_>, label: &str| write_title(f, 1, label);
        let write_1 = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            write_field(f, 1, label, value)
        };

        writeln!(f, "Current Hub Configuration State:")?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Dispatch")?;
        write_1(f, "Interval (s)", &self.dispatch.interval_secs)?;
        write_1(f, "Outbound Queue", &self.dispatch.outbound_queue_capacity)?;
        write_1(f, "Max Pending / Validator", &self.dispatch.max_pending_per_validator)?;
        write_title_1(f, "Correlation")?;
        write_1(f, "Stale After (s)", &self.correlation.stale_after_secs)?;
        write_1(f, "Sweep Interval (s)", &self.correlation.sweep_interval_secs)?;
        write_title_1(f, "Rewards")?;
        write_1(f, "Per Check", &self.rewards.per_check)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/hub.toml
    ///  or the specified path if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let path: Option<&path::Path> = optional_path.as_ref().map(|p| p.as_ref());
        settings::load_or_create(path, "hub.toml")
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env(&mut self) {
        if let Ok(path) = env::var("UPPE_HUB_DATABASE") {
            self.database.path = path;
        }
    }
}
