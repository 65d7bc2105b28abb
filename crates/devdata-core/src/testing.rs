//! ---
//! devdata_section: "15-testing-qa-runbook"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Scriptable in-memory driver for tests and simulations."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;

use crate::element::{ChangeNotifier, NativeHooks};
use crate::error::DriverError;
use crate::value::Value;

#[derive(Debug)]
struct MockState {
    value: Value,
    read_error: Option<DriverError>,
    write_error: Option<DriverError>,
    observe_error: Option<DriverError>,
    reads: usize,
    writes: Vec<Value>,
    observes: usize,
    notifier: Option<ChangeNotifier>,
}

/// In-memory driver whose hook results can be scripted and whose calls are
/// recorded. Clones share state, so a test keeps one handle after moving the
/// driver into an element.
#[derive(Debug, Clone)]
pub struct MockDriver {
    inner: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Driver that reports `value` on read.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                value: value.into(),
                read_error: None,
                write_error: None,
                observe_error: None,
                reads: 0,
                writes: Vec::new(),
                observes: 0,
                notifier: None,
            })),
        }
    }

    /// Change the device-side value without notifying anyone.
    pub fn set_value(&self, value: impl Into<Value>) {
        self.inner.lock().value = value.into();
    }

    /// Make every subsequent read fail with `error`, or succeed again on `None`.
    pub fn fail_reads(&self, error: Option<DriverError>) {
        self.inner.lock().read_error = error;
    }

    /// Make every subsequent write fail with `error`, or succeed again on `None`.
    pub fn fail_writes(&self, error: Option<DriverError>) {
        self.inner.lock().write_error = error;
    }

    /// Make every subsequent observe activation fail with `error`, or succeed again on `None`.
    pub fn fail_observes(&self, error: Option<DriverError>) {
        self.inner.lock().observe_error = error;
    }

    /// Number of native reads performed.
    pub fn read_calls(&self) -> usize {
        self.inner.lock().reads
    }

    /// Values that reached the native write hook, oldest first.
    pub fn write_calls(&self) -> Vec<Value> {
        self.inner.lock().writes.clone()
    }

    /// Number of native observe activations attempted.
    pub fn observe_calls(&self) -> usize {
        self.inner.lock().observes
    }

    /// Simulate an unsolicited device-side change: store it and notify the
    /// bound element. Returns `false` when no element is attached.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let notifier = {
            let mut state = self.inner.lock();
            state.value = value.clone();
            state.notifier.clone()
        };
        notifier.is_some_and(|notifier| notifier.notify_changed(value))
    }
}

impl NativeHooks for MockDriver {
    fn read_native(&self) -> Result<Value, DriverError> {
        let mut state = self.inner.lock();
        state.reads += 1;
        match &state.read_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.value.clone()),
        }
    }

    fn write_native(&self, value: &Value) -> Result<(), DriverError> {
        let mut state = self.inner.lock();
        if let Some(err) = &state.write_error {
            return Err(err.clone());
        }
        state.writes.push(value.clone());
        state.value = value.clone();
        Ok(())
    }

    fn observe_native(&self) -> Result<(), DriverError> {
        let mut state = self.inner.lock();
        state.observes += 1;
        match &state.observe_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn bind(&mut self, notifier: ChangeNotifier) {
        self.inner.lock().notifier = Some(notifier);
    }
}
