//! ---
//! devdata_section: "15-testing-qa-runbook"
//! devdata_subsection: "integration-tests"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "End-to-end tests from configuration to observed device elements."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::sync::Arc;

use devdata_common::AppConfig;
use devdata_core::{new_registry, Access, DeviceError, ElementError, ElementMetrics, Value};
use devdata_drivers::{build_device, spawn_feed, status, Backend};
use parking_lot::Mutex;
use tokio::sync::mpsc;

fn read(path: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let full = Path::new(manifest_dir).join("..").join(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

fn shipped_config() -> AppConfig {
    read("configs/devices.toml")
        .parse()
        .expect("sample configuration should validate")
}

#[test]
fn sample_configuration_builds_every_device() {
    let config = shipped_config();
    for (device_id, device_config) in &config.devices {
        let built = build_device(device_id, device_config, None).unwrap();
        assert_eq!(built.device.len(), device_config.elements.len());
        for (element, declared) in built.device.iter().zip(&device_config.elements) {
            assert_eq!(element.name(), declared.name);
            assert_eq!(element.value_type(), declared.value_type);
            assert_eq!(
                element.is_writable(),
                declared.access.contains(&Access::Write)
            );
        }
    }
}

#[test]
fn register_device_round_trip_through_bus() {
    let config = shipped_config();
    let registry = new_registry();
    let metrics = ElementMetrics::new(registry.clone()).unwrap();
    let built = build_device("boiler", config.device("boiler").unwrap(), Some(&metrics)).unwrap();
    let Backend::Register(bank) = built.backend else {
        panic!("boiler is a register device");
    };
    let device = built.device;

    let changes = Arc::new(Mutex::new(Vec::new()));
    for name in ["temp", "pump"] {
        let sink = Arc::clone(&changes);
        device
            .get(name)
            .unwrap()
            .observe(move |value| sink.lock().push((name, value.clone())))
            .unwrap();
    }

    // Device-side updates arrive unsolicited.
    assert_eq!(bank.apply_external(3, 215), 1);
    assert_eq!(bank.apply_external(7, 1), 1);

    // Caller-side writes go to the bus and notify observers.
    device.write("pump", false).unwrap();
    assert_eq!(bank.read_holding_registers(7, 1).unwrap(), vec![0]);

    device.write("setpoint", 65.5).unwrap();
    assert_eq!(bank.read_holding_registers(4, 1).unwrap(), vec![655]);

    assert!(matches!(
        device.write("temp", 30.0),
        Err(DeviceError::Element(ElementError::AccessDenied { .. }))
    ));
    assert_eq!(device.get("temp").unwrap().cached(), Value::Float(21.5));

    assert_eq!(
        *changes.lock(),
        vec![
            ("temp", Value::Float(21.5)),
            ("pump", Value::Boolean(true)),
            ("pump", Value::Boolean(false)),
        ]
    );

    bank.set_online(false);
    let err = device.read("setpoint").unwrap_err();
    match err {
        DeviceError::Element(err) => assert_eq!(err.driver_code(), Some(status::OFFLINE)),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(device.get("setpoint").unwrap().cached(), Value::Float(65.5));

    let families = registry.gather();
    assert_eq!(families.len(), 2);
}

#[tokio::test]
async fn feed_device_delivers_pushed_values() {
    let config = shipped_config();
    let built = build_device("meter", config.device("meter").unwrap(), None).unwrap();
    let Backend::Feed(endpoints) = built.backend else {
        panic!("meter is a feed device");
    };
    let device = built.device;

    let energy = device.get("energy").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    energy
        .observe(move |value| sink.lock().push(value.clone()))
        .unwrap();
    assert!(endpoints["energy"].is_observed());

    let (tx, rx) = mpsc::channel(4);
    let pump = spawn_feed(endpoints["energy"].clone(), rx);
    for reading in [100, 104, 109] {
        tx.send(Value::from(reading)).await.unwrap();
    }
    drop(tx);
    assert_eq!(pump.await.unwrap(), 3);

    assert_eq!(
        *seen.lock(),
        vec![Value::Integer(100), Value::Integer(104), Value::Integer(109)]
    );
    assert_eq!(device.read("energy").unwrap(), Value::Integer(109));

    let label = device.get("label").unwrap();
    assert!(matches!(
        label.observe(|_| {}),
        Err(ElementError::ObserveNotSupported { .. })
    ));
    label.write("plant room 2").unwrap();
    assert_eq!(
        endpoints["label"].current(),
        Value::String("plant room 2".into())
    );
}
