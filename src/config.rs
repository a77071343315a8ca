//! Configuration management for the ilo_fand daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that describes the managed iLO device, its fans and temperature
//! sensors, and the polling cadence. Configuration is loaded once at
//! startup and treated as immutable for the process lifetime.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

/// Main configuration structure for the ilo_fand daemon.
///
/// Deserialized from the YAML configuration file.
///
/// # Example
///
/// ```yaml
/// version: 1
/// poll_seconds: 2
/// silent_speed: 13
/// manual_default_speed: 18
///
/// device:
///   host: 10.0.0.120
///   username: Administrator
///   password: hunter2
///
/// fans:
///   - id: 0
///     name: "Fan 1"
///     display_name: "Fan #1"
///     enabled: true
///
/// sensors:
///   - id: 2
///     name: "02-CPU 1"
///     display_name: "CPU 1"
///     enabled: true
///     safe_max: 85
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Telemetry poll and watchdog interval in seconds.
    #[serde(default = "defaults::poll_seconds")]
    pub poll_seconds: u16,

    /// Upper bound for a single remote command or telemetry fetch, in
    /// seconds. A hung device must never stall the poll cadence.
    #[serde(default = "defaults::request_timeout_seconds")]
    pub request_timeout_seconds: u16,

    /// Fan speed pinned by silent mode, raw device units (0-255).
    #[serde(default = "defaults::silent_speed")]
    pub silent_speed: u8,

    /// Initial manual target for every enabled fan, raw device units.
    #[serde(default = "defaults::manual_default_speed")]
    pub manual_default_speed: u8,

    /// The managed iLO device.
    pub device: DeviceCfg,

    /// Fans of the managed chassis.
    #[serde(default)]
    pub fans: Vec<FanCfg>,

    /// Temperature sensors of the managed chassis.
    #[serde(default)]
    pub sensors: Vec<SensorCfg>,
}

/// Address and credentials of the managed device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCfg {
    /// Hostname or IP of the iLO interface.
    pub host: String,

    /// iLO account used for both SSH and the Redfish API.
    pub username: String,

    /// Password for the account. Overridable via `ILO_PASS`.
    pub password: String,

    /// SSH port of the iLO console.
    #[serde(default = "defaults::ssh_port")]
    pub ssh_port: u16,

    /// Verify the device's TLS certificate. Off by default: iLO boards
    /// ship self-signed certificates.
    #[serde(default)]
    pub verify_tls: bool,

    /// Offer the legacy key-exchange and host-key algorithms
    /// (`diffie-hellman-group1-sha1`, `ssh-rsa`) that older iLO firmware
    /// requires. Host identity is not verified either way; both are
    /// deliberate compatibility trade-offs, not oversights.
    #[serde(default = "defaults::legacy_algorithms")]
    pub legacy_algorithms: bool,
}

/// Static description of one chassis fan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanCfg {
    /// Numeric id used in iLO console commands (`fan p <id> ...`).
    pub id: u16,

    /// Internal name as reported by the thermal endpoint (e.g. "Fan 1").
    pub name: String,

    /// Human-readable name for presentation.
    pub display_name: String,

    /// Disabled fans are never commanded and never shown.
    pub enabled: bool,
}

/// Static description of one temperature sensor.
///
/// Sensors whose internal name contains `DIMM` are memory-module sensors:
/// the presentation layer aggregates them into a single "Memory" row and
/// never shows them individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorCfg {
    /// Numeric id as reported by the device.
    pub id: u16,

    /// Internal name as reported by the thermal endpoint (e.g. "02-CPU 1").
    pub name: String,

    /// Human-readable name for presentation.
    pub display_name: String,

    /// Disabled sensors are ignored by the watchdog and the views.
    pub enabled: bool,

    /// Temperature (°C) at or above which the watchdog forces auto mode.
    pub safe_max: f64,
}

mod defaults {
    /// Default poll/watchdog interval in seconds.
    pub fn poll_seconds() -> u16 {
        2
    }

    /// Default per-call network timeout in seconds.
    pub fn request_timeout_seconds() -> u16 {
        10
    }

    /// Default silent-mode speed (raw 0-255).
    pub fn silent_speed() -> u8 {
        13
    }

    /// Default manual-mode seed speed (raw 0-255).
    pub fn manual_default_speed() -> u8 {
        18
    }

    /// Default iLO SSH port.
    pub fn ssh_port() -> u16 {
        22
    }

    /// Legacy algorithms are on by default; most deployed iLOs need them.
    pub fn legacy_algorithms() -> bool {
        true
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            poll_seconds: defaults::poll_seconds(),
            request_timeout_seconds: defaults::request_timeout_seconds(),
            silent_speed: defaults::silent_speed(),
            manual_default_speed: defaults::manual_default_speed(),
            device: DeviceCfg::default(),
            fans: Vec::new(),
            sensors: Vec::new(),
        }
    }
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            username: "Administrator".to_string(),
            password: String::new(),
            ssh_port: defaults::ssh_port(),
            verify_tls: false,
            legacy_algorithms: defaults::legacy_algorithms(),
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.poll_seconds == 0 {
            anyhow::bail!("poll_seconds must be at least 1");
        }
        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be at least 1");
        }
        if self.device.host.is_empty() {
            anyhow::bail!("device.host must not be empty");
        }

        let mut fan_ids = HashSet::new();
        let mut fan_names = HashSet::new();
        for fan in &self.fans {
            if !fan_ids.insert(fan.id) {
                anyhow::bail!("duplicate fan id {}", fan.id);
            }
            if !fan_names.insert(fan.name.as_str()) {
                anyhow::bail!("duplicate fan name '{}'", fan.name);
            }
        }

        let mut sensor_names = HashSet::new();
        for sensor in &self.sensors {
            if !sensor_names.insert(sensor.name.as_str()) {
                anyhow::bail!("duplicate sensor name '{}'", sensor.name);
            }
            if sensor.safe_max <= 0.0 {
                anyhow::bail!(
                    "sensor '{}' has non-positive safe_max {}",
                    sensor.name,
                    sensor.safe_max
                );
            }
        }

        Ok(())
    }

    /// Fans the daemon actually manages, in configuration order.
    pub fn enabled_fans(&self) -> impl Iterator<Item = &FanCfg> {
        self.fans.iter().filter(|fan| fan.enabled)
    }

    /// Looks up an enabled fan by its numeric id.
    pub fn find_enabled_fan(&self, id: u16) -> Option<&FanCfg> {
        self.fans.iter().find(|fan| fan.id == id && fan.enabled)
    }

    /// Poll/watchdog cadence.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_seconds))
    }

    /// Bound on a single remote command or telemetry fetch.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.request_timeout_seconds))
    }
}

fn locate_config() -> Result<PathBuf> {
    // 1) ENV
    if let Ok(env_path) = env::var("ILO_FAND_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    // 2) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("ilo_fand/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    // 3) /etc
    let etc = Path::new("/etc/ilo_fand/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Applies credential overrides from the container environment.
///
/// `ILO_HOST`, `ILO_USER` and `ILO_PASS` take precedence over the file so
/// secrets can stay out of it.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(host) = env::var("ILO_HOST") {
        config.device.host = host;
    }
    if let Ok(user) = env::var("ILO_USER") {
        config.device.username = user;
    }
    if let Ok(pass) = env::var("ILO_PASS") {
        config.device.password = pass;
    }
}

/// Configuration manager holding the loaded, validated configuration.
///
/// The configuration is immutable after startup; the manager only exposes
/// read accessors. Descriptor lists therefore need no further
/// synchronization beyond the shared read lock.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from a file or the standard locations.
    ///
    /// Search order:
    /// 1. Provided path parameter
    /// 2. ILO_FAND_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/ilo_fand/config.yml or ~/.config/ilo_fand/config.yml
    /// 4. /etc/ilo_fand/config.yml
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, config_path))
    }

    /// Gets a read-only reference to the configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Clones the configuration for use outside the lock.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Returns the path the configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        apply_env_overrides(&mut config);

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
