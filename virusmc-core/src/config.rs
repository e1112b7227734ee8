use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use virusmc_types::DeviceModel;

use crate::codec::OMNI_DEVICE_ID;
use crate::scheduler::PacingPolicy;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    device: DeviceConfig,
    #[serde(default)]
    pacing: PacingConfig,
    #[serde(default)]
    queues: QueueConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
}

#[derive(Deserialize, Default)]
struct DeviceConfig {
    model: Option<String>,
    device_id: Option<u8>,
}

#[derive(Deserialize, Default)]
struct PacingConfig {
    ack_timeout_ticks: Option<u32>,
    transfer_gap_ticks: Option<u32>,
    retry_on_timeout: Option<bool>,
}

#[derive(Deserialize, Default)]
struct QueueConfig {
    inbound_capacity: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    traffic_log: Option<bool>,
}

#[derive(Debug)]
pub struct ConfigError(toml::de::Error);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError(e)
    }
}

pub struct Config {
    device: DeviceConfig,
    pacing: PacingConfig,
    queues: QueueConfig,
    runtime: RuntimeConfig,
}

impl Default for Config {
    /// The embedded defaults, without any user overrides.
    fn default() -> Self {
        Self::from_file(embedded())
    }
}

impl Config {
    /// Embedded defaults merged with `~/.config/virusmc/config.toml` if present.
    pub fn load() -> Self {
        let mut base = embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Self::from_file(base)
    }

    /// Embedded defaults merged with the given TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut base = embedded();
        merge(&mut base, toml::from_str(contents)?);
        Ok(Self::from_file(base))
    }

    fn from_file(file: ConfigFile) -> Self {
        Config {
            device: file.device,
            pacing: file.pacing,
            queues: file.queues,
            runtime: file.runtime,
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.device
            .model
            .as_deref()
            .and_then(DeviceModel::from_name)
            .unwrap_or_default()
    }

    /// Device id stamped into outgoing dumps. Values above omni are clamped.
    pub fn device_id(&self) -> u8 {
        self.device.device_id.unwrap_or(OMNI_DEVICE_ID).min(OMNI_DEVICE_ID)
    }

    pub fn pacing(&self) -> PacingPolicy {
        let fallback = PacingPolicy::default();
        PacingPolicy {
            ack_timeout_ticks: self
                .pacing
                .ack_timeout_ticks
                .unwrap_or(fallback.ack_timeout_ticks)
                .max(1),
            transfer_gap_ticks: self
                .pacing
                .transfer_gap_ticks
                .unwrap_or(fallback.transfer_gap_ticks),
            retry_on_timeout: self
                .pacing
                .retry_on_timeout
                .unwrap_or(fallback.retry_on_timeout),
        }
    }

    /// Inbound event ring size (clamped to 16..=65536).
    pub fn inbound_capacity(&self) -> usize {
        self.queues
            .inbound_capacity
            .unwrap_or(1024)
            .clamp(16, 65_536)
    }

    pub fn traffic_log_enabled(&self) -> bool {
        self.runtime.traffic_log.unwrap_or(false)
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
        log::error!(target: "config", "embedded config.toml is invalid: {}", e);
        ConfigFile::default()
    })
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("virusmc").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.device.model.is_some() {
        base.device.model = user.device.model;
    }
    if user.device.device_id.is_some() {
        base.device.device_id = user.device.device_id;
    }
    if user.pacing.ack_timeout_ticks.is_some() {
        base.pacing.ack_timeout_ticks = user.pacing.ack_timeout_ticks;
    }
    if user.pacing.transfer_gap_ticks.is_some() {
        base.pacing.transfer_gap_ticks = user.pacing.transfer_gap_ticks;
    }
    if user.pacing.retry_on_timeout.is_some() {
        base.pacing.retry_on_timeout = user.pacing.retry_on_timeout;
    }
    if user.queues.inbound_capacity.is_some() {
        base.queues.inbound_capacity = user.queues.inbound_capacity;
    }
    if user.runtime.traffic_log.is_some() {
        base.runtime.traffic_log = user.runtime.traffic_log;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::default();
        assert_eq!(config.model(), DeviceModel::C);
        assert_eq!(config.device_id(), OMNI_DEVICE_ID);
        assert_eq!(config.pacing(), PacingPolicy::default());
        assert_eq!(config.inbound_capacity(), 1024);
        assert!(!config.traffic_log_enabled());
    }

    #[test]
    fn test_user_values_override_only_what_they_set() {
        let config = Config::from_toml_str(
            r#"
            [device]
            model = "TI"
            [pacing]
            transfer_gap_ticks = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.model(), DeviceModel::Ti);
        assert_eq!(config.device_id(), OMNI_DEVICE_ID);
        assert_eq!(config.pacing().transfer_gap_ticks, 4);
        assert_eq!(config.pacing().ack_timeout_ticks, 64);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = Config::from_toml_str(
            r#"
            [device]
            device_id = 99
            [pacing]
            ack_timeout_ticks = 0
            [queues]
            inbound_capacity = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.device_id(), OMNI_DEVICE_ID);
        assert_eq!(config.pacing().ack_timeout_ticks, 1);
        assert_eq!(config.inbound_capacity(), 16);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let config = Config::from_toml_str("[device]\nmodel = \"snow\"\n").unwrap();
        assert_eq!(config.model(), DeviceModel::C);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(Config::from_toml_str("[pacing\nack").is_err());
    }
}
