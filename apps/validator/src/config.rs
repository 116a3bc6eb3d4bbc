use std::time::Duration;
use std::{env, fmt, path};

use serde::{Deserialize, Serialize};
pub use settings::ConfigError;
use settings::{write_field, write_title};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hub: Hub,
    pub identity: Identity,
    pub probe: Probe,
    pub reconnect: Reconnect,
    /// Seconds between "still alive" log lines
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hub {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub keypair_path: path::PathBuf,
    /// Address declared to the hub at signup
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub timeout_ms: u64,
    /// Latency reported when a site could not be reached at all
    pub penalty_latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Reconnect {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub: Hub::default(),
            identity: Identity::default(),
            probe: Probe::default(),
            reconnect: Reconnect::default(),
            heartbeat_secs: 10,
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self { url: format!("ws://127.0.0.1:8081{}", hubwire::DEFAULT_WS_PATH) }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self { keypair_path: "uppe_validator.key".into(), ip: "127.0.0.1".into() }
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self { timeout_ms: 10_000, penalty_latency_ms: 1000 }
    }
}

impl Default for Reconnect {
    fn default() -> Self {
        Self { initial_backoff_secs: 1, max_backoff_secs: 60 }
    }
}

impl Probe {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl Reconnect {
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs.max(1))
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs.max(self.initial_backoff_secs).max(1))
    }
}

impl Config {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_title_1 = |f: &mut fmt::Formatter<'_>, label: &str| write_title(f, 1, label);
        let write_1 = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            write_field(f, 1, label, value)
        };

        writeln!(f, "Current Validator Configuration State:")?;
        write_title_1(f, "Hub")?;
        write_1(f, "URL", &self.hub.url)?;
        write_title_1(f, "Identity")?;
        write_1(f, "Keypair", &self.identity.keypair_path.display())?;
        write_1(f, "Declared IP", &self.identity.ip)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (ms)", &self.probe.timeout_ms)?;
        write_1(f, "Penalty Latency (ms)", &self.probe.penalty_latency_ms)?;
        write_title_1(f, "Reconnect")?;
        write_1(f, "Initial Backoff (s)", &self.reconnect.initial_backoff_secs)?;
        write_1(f, "Max Backoff (s)", &self.reconnect.max_backoff_secs)?;
        write_1(f, "Heartbeat (s)", &self.heartbeat_secs)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/validator.toml
    ///  or the specified path if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let path: Option<&path::Path> = optional_path.as_ref().map(|p| p.as_ref());
        settings::load_or_create(path, "validator.toml")
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env(&mut self) {
        if let Ok(path) = env::var("UPPE_VALIDATOR_KEYPAIR") {
            self.identity.keypair_path = path.into();
        }
    }
}
