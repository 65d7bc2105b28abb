//! ---
//! devdata_section: "05-networking-external-interfaces"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Builds devices and their simulated backends from configuration."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use devdata_common::config::{DeviceConfig, DriverKind, ElementConfig};
use devdata_core::{DataElement, Device, ElementBuilder, ElementMetrics};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::feed::{FeedDriver, FeedEndpoint};
use crate::register::RegisterDriver;
use crate::RegisterBank;

/// Simulated device side of a built device.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Shared holding registers of a register device.
    Register(RegisterBank),
    /// One endpoint per element of a feed device, keyed by element name.
    Feed(IndexMap<String, FeedEndpoint>),
}

/// A device together with the handles that drive its simulated backend.
#[derive(Debug)]
pub struct BuiltDevice {
    pub device: Device,
    pub backend: Backend,
}

fn builder(element: &ElementConfig, metrics: Option<&ElementMetrics>) -> ElementBuilder {
    let builder = DataElement::builder(
        element.name.as_str(),
        element.description.as_str(),
        element.value_type,
        element.access_mask(),
    );
    match metrics {
        Some(metrics) => builder.metrics(metrics.clone()),
        None => builder,
    }
}

/// Build the device `device_id` described by `config`.
pub fn build_device(
    device_id: &str,
    config: &DeviceConfig,
    metrics: Option<&ElementMetrics>,
) -> Result<BuiltDevice> {
    config.validate(device_id)?;
    let mut device = Device::new(device_id, config.description.as_str());

    let backend = match config.driver {
        DriverKind::Register => {
            let bank = RegisterBank::new(device_id);
            for element in &config.elements {
                let address = element
                    .register
                    .with_context(|| format!("element '{}' has no register", element.name))?;
                let mut driver = RegisterDriver::new(bank.clone(), address, element.value_type);
                if let Some(scale) = element.scale {
                    driver = driver.with_scale(scale);
                }
                debug!(device = %device_id, element = %element.name, register = driver.address(), "element mapped to holding register");
                device
                    .insert(builder(element, metrics).build(driver))
                    .with_context(|| format!("failed to add element to device '{}'", device_id))?;
            }
            Backend::Register(bank)
        }
        DriverKind::Feed => {
            let mut endpoints = IndexMap::new();
            for element in &config.elements {
                let endpoint = FeedEndpoint::new(
                    format!("/{}/{}", device_id, element.name),
                    element.value_type,
                );
                device
                    .insert(builder(element, metrics).build(FeedDriver::new(endpoint.clone())))
                    .with_context(|| format!("failed to add element to device '{}'", device_id))?;
                endpoints.insert(element.name.clone(), endpoint);
            }
            Backend::Feed(endpoints)
        }
    };

    info!(device = %device_id, driver = ?config.driver, elements = device.len(), "device built");
    Ok(BuiltDevice { device, backend })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdata_common::AppConfig;
    use devdata_core::{new_registry, Operation, Value};

    const CONFIG: &str = r#"
        [devices.boiler]
        [[devices.boiler.elements]]
        name = "temp"
        type = "float"
        access = ["read", "observe"]
        register = 3
        scale = 10.0

        [devices.meter]
        driver = "feed"
        [[devices.meter.elements]]
        name = "energy"
        type = "integer"
        access = ["read", "observe"]
    "#;

    #[test]
    fn builds_register_device() {
        let config: AppConfig = CONFIG.parse().unwrap();
        let metrics = ElementMetrics::new(new_registry()).unwrap();
        let built = build_device("boiler", config.device("boiler").unwrap(), Some(&metrics)).unwrap();
        let Backend::Register(bank) = &built.backend else {
            panic!("expected register backend");
        };
        bank.write_holding_register(3, 215).unwrap();
        assert_eq!(built.device.read("temp").unwrap(), Value::Float(21.5));
        assert_eq!(metrics.operation_count("temp", Operation::Read, "ok"), 1);
    }

    #[test]
    fn builds_feed_device() {
        let config: AppConfig = CONFIG.parse().unwrap();
        let built = build_device("meter", config.device("meter").unwrap(), None).unwrap();
        let Backend::Feed(endpoints) = &built.backend else {
            panic!("expected feed backend");
        };
        let endpoint = &endpoints["energy"];
        assert_eq!(endpoint.resource(), "/meter/energy");
        built.device.get("energy").unwrap().observe(|_| {}).unwrap();
        assert!(endpoint.publish(42).unwrap());
        assert_eq!(built.device.get("energy").unwrap().cached(), Value::Integer(42));
    }
}
