//! ---
//! devdata_section: "05-networking-external-interfaces"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Fieldbus style register bank and register-backed element driver."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use devdata_core::{ChangeNotifier, DriverError, NativeHooks, Value, ValueType};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::status;

/// Conversion between a 16-bit register and an element value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterCodec {
    value_type: ValueType,
    scale: f64,
}

impl RegisterCodec {
    /// Codec for `value_type` with a unit scale.
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            scale: 1.0,
        }
    }

    /// Fixed-point scale applied to float values (`raw = value * scale`).
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Element type handled by this codec.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn encode(&self, value: &Value) -> Result<u16, DriverError> {
        let raw = match value {
            Value::Integer(v) => *v,
            Value::Float(v) => {
                let scaled = (v * self.scale).round();
                if !scaled.is_finite() {
                    return Err(DriverError::new(
                        status::OUT_OF_RANGE,
                        format!("value {v} cannot be scaled into a register"),
                    ));
                }
                scaled as i64
            }
            Value::Boolean(v) => i64::from(*v),
            Value::String(_) => {
                return Err(DriverError::new(
                    status::UNSUPPORTED,
                    "string values cannot be stored in holding registers",
                ))
            }
        };
        u16::try_from(raw).map_err(|_| {
            DriverError::new(
                status::OUT_OF_RANGE,
                format!("value {raw} out of range for 16-bit register"),
            )
        })
    }

    pub fn decode(&self, raw: u16) -> Result<Value, DriverError> {
        match self.value_type {
            ValueType::Integer => Ok(Value::Integer(raw.into())),
            ValueType::Float => Ok(Value::Float(f64::from(raw) / self.scale)),
            ValueType::Boolean => Ok(Value::Boolean(raw != 0)),
            ValueType::String => Err(DriverError::new(
                status::UNSUPPORTED,
                "string values cannot be stored in holding registers",
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct Watch {
    notifier: ChangeNotifier,
    codec: RegisterCodec,
}

#[derive(Debug)]
struct BankState {
    online: bool,
    registers: HashMap<u16, u16>,
    watches: HashMap<u16, Vec<Watch>>,
}

/// In-memory register bank simulating a fieldbus slave's holding registers.
/// Clones share the same registers.
#[derive(Debug, Clone)]
pub struct RegisterBank {
    device_id: String,
    inner: Arc<Mutex<BankState>>,
}

impl RegisterBank {
    /// Create an online bank for the given logical device id.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            inner: Arc::new(Mutex::new(BankState {
                online: true,
                registers: HashMap::new(),
                watches: HashMap::new(),
            })),
        }
    }

    /// Logical device identifier.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Take the simulated device on or off the bus.
    pub fn set_online(&self, online: bool) {
        self.inner.lock().online = online;
        debug!(device = %self.device_id, online, "register bank link state changed");
    }

    fn ensure_online(state: &BankState, device_id: &str) -> Result<(), DriverError> {
        if state.online {
            Ok(())
        } else {
            Err(DriverError::new(
                status::OFFLINE,
                format!("device {device_id} is offline"),
            ))
        }
    }

    /// Read a range of holding registers; unset registers read as zero.
    pub fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, DriverError> {
        let state = self.inner.lock();
        Self::ensure_online(&state, &self.device_id)?;
        let mut values = Vec::with_capacity(count as usize);
        for offset in 0..count {
            let addr = start.checked_add(offset).ok_or_else(|| {
                DriverError::new(status::OUT_OF_RANGE, "register range exceeds address space")
            })?;
            values.push(*state.registers.get(&addr).unwrap_or(&0));
        }
        Ok(values)
    }

    /// Write a single holding register from the master side.
    pub fn write_holding_register(&self, address: u16, value: u16) -> Result<(), DriverError> {
        let mut state = self.inner.lock();
        Self::ensure_online(&state, &self.device_id)?;
        state.registers.insert(address, value);
        trace!(device = %self.device_id, address, value, "holding register written");
        Ok(())
    }

    /// Register contents sorted by address.
    pub fn snapshot(&self) -> BTreeMap<u16, u16> {
        self.inner
            .lock()
            .registers
            .iter()
            .map(|(addr, value)| (*addr, *value))
            .collect()
    }

    /// Route device-side changes of `address` to `notifier`.
    pub fn watch(&self, address: u16, notifier: ChangeNotifier, codec: RegisterCodec) {
        let mut state = self.inner.lock();
        state
            .watches
            .entry(address)
            .or_default()
            .push(Watch { notifier, codec });
        debug!(device = %self.device_id, address, "register watch installed");
    }

    /// Simulate the device changing a register on its own (sensor update,
    /// local operator action). Watchers of the address are notified on the
    /// calling thread. Returns the number of elements notified.
    pub fn apply_external(&self, address: u16, value: u16) -> usize {
        let watches = {
            let mut state = self.inner.lock();
            state.registers.insert(address, value);
            if let Some(list) = state.watches.get_mut(&address) {
                list.retain(|watch| watch.notifier.is_attached());
                list.clone()
            } else {
                Vec::new()
            }
        };

        let mut notified = 0;
        for watch in watches {
            match watch.codec.decode(value) {
                Ok(decoded) => {
                    if watch.notifier.notify_changed(decoded) {
                        notified += 1;
                    }
                }
                Err(err) => {
                    debug!(device = %self.device_id, address, element = %watch.notifier.element(), error = %err, "register change not representable")
                }
            }
        }
        notified
    }
}

/// [`NativeHooks`] implementation mapping one element to one holding register.
#[derive(Debug)]
pub struct RegisterDriver {
    bank: RegisterBank,
    address: u16,
    codec: RegisterCodec,
    notifier: Option<ChangeNotifier>,
}

impl RegisterDriver {
    /// Driver for the register at `address` holding a `value_type` element.
    pub fn new(bank: RegisterBank, address: u16, value_type: ValueType) -> Self {
        Self {
            bank,
            address,
            codec: RegisterCodec::new(value_type),
            notifier: None,
        }
    }

    /// Use a fixed-point scale for float values.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.codec = self.codec.with_scale(scale);
        self
    }

    /// Register address served by this driver.
    pub fn address(&self) -> u16 {
        self.address
    }
}

impl NativeHooks for RegisterDriver {
    fn read_native(&self) -> Result<Value, DriverError> {
        let raw = self.bank.read_holding_registers(self.address, 1)?;
        self.codec.decode(raw[0])
    }

    fn write_native(&self, value: &Value) -> Result<(), DriverError> {
        let raw = self.codec.encode(value)?;
        self.bank.write_holding_register(self.address, raw)
    }

    fn observe_native(&self) -> Result<(), DriverError> {
        let notifier = self.notifier.clone().ok_or_else(|| {
            DriverError::new(status::UNSUPPORTED, "driver not bound to an element")
        })?;
        if notifier.value_type() != self.codec.value_type() {
            return Err(DriverError::new(
                status::UNSUPPORTED,
                format!(
                    "register codec handles {} values but element {} is {}",
                    self.codec.value_type(),
                    notifier.element(),
                    notifier.value_type()
                ),
            ));
        }
        {
            let state = self.bank.inner.lock();
            RegisterBank::ensure_online(&state, &self.bank.device_id)?;
        }
        self.bank.watch(self.address, notifier, self.codec);
        Ok(())
    }

    fn bind(&mut self, notifier: ChangeNotifier) {
        self.notifier = Some(notifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdata_core::{AccessMask, DataElement, ElementError};

    #[test]
    fn register_bank_read_write_cycle() {
        let bank = RegisterBank::new("device-1");
        bank.write_holding_register(1, 123).unwrap();
        bank.write_holding_register(2, 456).unwrap();
        assert_eq!(bank.snapshot().len(), 2);

        bank.write_holding_register(3, 789).unwrap();
        let values = bank.read_holding_registers(1, 3).unwrap();
        assert_eq!(values, vec![123, 456, 789]);
        assert_eq!(bank.read_holding_registers(10, 1).unwrap(), vec![0]);
    }

    #[test]
    fn codec_scales_and_range_checks() {
        let codec = RegisterCodec::new(ValueType::Float).with_scale(10.0);
        assert_eq!(codec.encode(&Value::Float(22.5)).unwrap(), 225);
        assert_eq!(codec.decode(225).unwrap(), Value::Float(22.5));
        assert_eq!(
            codec.encode(&Value::Float(-1.0)).unwrap_err().code,
            status::OUT_OF_RANGE
        );

        let int = RegisterCodec::new(ValueType::Integer);
        assert_eq!(
            int.encode(&Value::Integer(70_000)).unwrap_err().code,
            status::OUT_OF_RANGE
        );
        let string = RegisterCodec::new(ValueType::String);
        assert_eq!(string.decode(1).unwrap_err().code, status::UNSUPPORTED);
    }

    #[test]
    fn element_writes_reach_register() {
        let bank = RegisterBank::new("boiler");
        let element = DataElement::new(
            "setpoint",
            "Setpoint",
            ValueType::Float,
            AccessMask::READ | AccessMask::WRITE,
            RegisterDriver::new(bank.clone(), 4, ValueType::Float).with_scale(10.0),
        );
        element.write(61.5).unwrap();
        assert_eq!(bank.read_holding_registers(4, 1).unwrap(), vec![615]);
        assert_eq!(element.read().unwrap(), Value::Float(61.5));

        let err = element.write(7000.0).unwrap_err();
        assert_eq!(err.driver_code(), Some(status::OUT_OF_RANGE));
        assert_eq!(element.cached(), Value::Float(61.5));
    }

    #[test]
    fn offline_bank_fails_every_hook() {
        let bank = RegisterBank::new("boiler");
        bank.set_online(false);
        let element = DataElement::new(
            "pump",
            "Pump",
            ValueType::Boolean,
            AccessMask::READ | AccessMask::WRITE | AccessMask::OBSERVE,
            RegisterDriver::new(bank.clone(), 7, ValueType::Boolean),
        );
        assert_eq!(element.read().unwrap_err().driver_code(), Some(status::OFFLINE));
        assert_eq!(element.write(true).unwrap_err().driver_code(), Some(status::OFFLINE));
        assert!(matches!(
            element.observe(|_| {}),
            Err(ElementError::NativeFailure { .. })
        ));

        bank.set_online(true);
        element.observe(|_| {}).unwrap();
        assert!(element.is_observed());
    }

    #[test]
    fn external_changes_reach_observers() {
        let bank = RegisterBank::new("boiler");
        let element = DataElement::new(
            "temp",
            "Temperature",
            ValueType::Float,
            AccessMask::READ | AccessMask::OBSERVE,
            RegisterDriver::new(bank.clone(), 3, ValueType::Float).with_scale(10.0),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        element
            .observe(move |value| sink.lock().push(value.clone()))
            .unwrap();

        assert_eq!(bank.apply_external(3, 225), 1);
        assert_eq!(bank.apply_external(4, 1), 0);
        assert_eq!(*seen.lock(), vec![Value::Float(22.5)]);
        assert_eq!(element.cached(), Value::Float(22.5));

        drop(element);
        assert_eq!(bank.apply_external(3, 230), 0);
    }
}
