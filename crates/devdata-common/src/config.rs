//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "TOML configuration describing simulated devices and their elements."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use devdata_core::{Access, AccessMask, ValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_feed_interval() -> Duration {
    Duration::from_millis(1000)
}

/// Primary configuration object for devdata services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub devices: IndexMap<String, DeviceConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "DEVDATA_CONFIG";

    /// Load configuration from disk, respecting the `DEVDATA_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a device configuration by identifier.
    pub fn device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.get(device_id)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(anyhow!("configuration must contain at least one device"));
        }
        for (device_id, device) in &self.devices {
            device.validate(device_id)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Protocol family backing a device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Fieldbus style holding registers.
    #[default]
    Register,
    /// Constrained-network style pushed resources.
    Feed,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub driver: DriverKind,
    /// Period of the simulated device-side updates driven by the daemon.
    #[serde(default = "default_feed_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub update_interval: Duration,
    #[serde(default)]
    pub elements: Vec<ElementConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            driver: DriverKind::default(),
            update_interval: default_feed_interval(),
            elements: Vec::new(),
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self, device_id: &str) -> Result<()> {
        if self.elements.is_empty() {
            return Err(anyhow!(
                "device '{}' must declare at least one element",
                device_id
            ));
        }
        if self.update_interval.is_zero() {
            return Err(anyhow!(
                "device '{}' must use a non-zero update_interval",
                device_id
            ));
        }
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.name.as_str()) {
                return Err(anyhow!(
                    "device '{}' declares element '{}' more than once",
                    device_id,
                    element.name
                ));
            }
            element
                .validate(self.driver)
                .with_context(|| format!("invalid element in device '{}'", device_id))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub access: Vec<Access>,
    /// Holding register address, register driver only.
    #[serde(default)]
    pub register: Option<u16>,
    /// Fixed-point scale for float registers (`raw = value * scale`).
    #[serde(default)]
    pub scale: Option<f64>,
}

impl ElementConfig {
    /// Access mask assembled from the configured capability list.
    pub fn access_mask(&self) -> AccessMask {
        self.access.iter().copied().collect()
    }

    pub fn validate(&self, driver: DriverKind) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("element name must not be empty"));
        }
        if self.access.is_empty() {
            return Err(anyhow!(
                "element '{}' must grant at least one access right",
                self.name
            ));
        }
        if let Some(scale) = self.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(anyhow!(
                    "element '{}' has invalid scale {}",
                    self.name,
                    scale
                ));
            }
        }
        match driver {
            DriverKind::Register if self.register.is_none() => Err(anyhow!(
                "register element '{}' requires a register address",
                self.name
            )),
            DriverKind::Feed if self.register.is_some() => Err(anyhow!(
                "feed element '{}' must not declare a register address",
                self.name
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [logging]
        format = "pretty"

        [devices.boiler]
        description = "Boiler controller"
        driver = "register"
        update_interval = 250

        [[devices.boiler.elements]]
        name = "temp"
        description = "Temperature"
        type = "float"
        access = ["read", "observe"]
        register = 3
        scale = 10.0

        [[devices.boiler.elements]]
        name = "pump"
        type = "boolean"
        access = ["read", "write"]
        register = 7

        [devices.meter]
        driver = "feed"

        [[devices.meter.elements]]
        name = "energy"
        type = "integer"
        access = ["read", "observe"]
    "#;

    #[test]
    fn parses_devices_in_declaration_order() {
        let config: AppConfig = SAMPLE.parse().unwrap();
        assert_eq!(
            config.devices.keys().collect::<Vec<_>>(),
            vec!["boiler", "meter"]
        );
        let boiler = config.device("boiler").unwrap();
        assert_eq!(boiler.update_interval, Duration::from_millis(250));
        let temp = &boiler.elements[0];
        assert_eq!(temp.value_type, ValueType::Float);
        assert_eq!(temp.access_mask(), AccessMask::READ | AccessMask::OBSERVE);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.metrics.enabled);
        assert_eq!(config.device("meter").unwrap().driver, DriverKind::Feed);
    }

    #[test]
    fn rejects_empty_configuration() {
        assert!("".parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_register_element_without_address() {
        let content = r#"
            [devices.d]
            [[devices.d.elements]]
            name = "x"
            type = "integer"
            access = ["read"]
        "#;
        let err = content.parse::<AppConfig>().unwrap_err();
        assert!(format!("{err:#}").contains("requires a register address"));
    }

    #[test]
    fn rejects_duplicate_element_names() {
        let content = r#"
            [devices.d]
            driver = "feed"
            [[devices.d.elements]]
            name = "x"
            type = "integer"
            access = ["read"]
            [[devices.d.elements]]
            name = "x"
            type = "float"
            access = ["read"]
        "#;
        let err = content.parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_missing_access_and_bad_scale() {
        let no_access = r#"
            [devices.d]
            driver = "feed"
            [[devices.d.elements]]
            name = "x"
            type = "integer"
            access = []
        "#;
        assert!(no_access.parse::<AppConfig>().is_err());

        let bad_scale = r#"
            [devices.d]
            [[devices.d.elements]]
            name = "x"
            type = "float"
            access = ["read"]
            register = 1
            scale = 0.0
        "#;
        assert!(bad_scale.parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_zero_update_interval() {
        let content = r#"
            [devices.d]
            driver = "feed"
            update_interval = 0
            [[devices.d.elements]]
            name = "x"
            type = "integer"
            access = ["read"]
        "#;
        let err = content.parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("non-zero update_interval"));
    }

    #[test]
    fn loads_from_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.toml");
        fs::write(&path, SAMPLE).unwrap();
        let missing = dir.path().join("missing.toml");
        let loaded = AppConfig::load_with_source(&[missing.clone(), path.clone()]).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.devices.len(), 2);

        assert!(AppConfig::load(&[missing]).is_err());
    }
}
