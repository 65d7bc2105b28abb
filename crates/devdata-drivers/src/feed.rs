//! ---
//! devdata_section: "05-networking-external-interfaces"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Constrained-network style resources whose values are pushed by the device."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::sync::Arc;

use devdata_core::{ChangeNotifier, DriverError, NativeHooks, Value, ValueType};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::status;

#[derive(Debug)]
struct FeedState {
    value: Value,
    reachable: bool,
    observed: bool,
    notifier: Option<ChangeNotifier>,
}

/// Device-side resource that reports its value on its own schedule, the way
/// an observed LwM2M/CoAP resource does. Clones share state.
#[derive(Debug, Clone)]
pub struct FeedEndpoint {
    resource: String,
    value_type: ValueType,
    inner: Arc<Mutex<FeedState>>,
}

impl FeedEndpoint {
    /// Reachable resource holding the default value of `value_type`.
    pub fn new(resource: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            resource: resource.into(),
            value_type,
            inner: Arc::new(Mutex::new(FeedState {
                value: value_type.default_value(),
                reachable: true,
                observed: false,
                notifier: None,
            })),
        }
    }

    /// Resource path.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Type of the values this resource reports.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Simulate the device going out of (or back into) radio range.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().reachable = reachable;
    }

    /// Whether the element engaged observation on this resource.
    pub fn is_observed(&self) -> bool {
        self.inner.lock().observed
    }

    /// Last value held by the resource.
    pub fn current(&self) -> Value {
        self.inner.lock().value.clone()
    }

    /// Report a new value from the device. The observing element, if any, is
    /// notified on the calling thread. Returns whether an element was notified.
    pub fn publish(&self, value: impl Into<Value>) -> Result<bool, DriverError> {
        let value = value.into();
        if !value.is_compatible(self.value_type) {
            return Err(DriverError::new(
                status::UNSUPPORTED,
                format!(
                    "resource {} reports {} values, got {}",
                    self.resource,
                    self.value_type,
                    value.value_type()
                ),
            ));
        }
        let notifier = {
            let mut state = self.inner.lock();
            state.value = value.clone();
            if state.observed {
                state.notifier.clone()
            } else {
                None
            }
        };
        Ok(notifier.is_some_and(|notifier| notifier.notify_changed(value)))
    }

    fn ensure_reachable(state: &FeedState, resource: &str) -> Result<(), DriverError> {
        if state.reachable {
            Ok(())
        } else {
            Err(DriverError::new(
                status::OFFLINE,
                format!("resource {resource} is unreachable"),
            ))
        }
    }
}

/// [`NativeHooks`] implementation backed by a [`FeedEndpoint`].
#[derive(Debug)]
pub struct FeedDriver {
    endpoint: FeedEndpoint,
}

impl FeedDriver {
    pub fn new(endpoint: FeedEndpoint) -> Self {
        Self { endpoint }
    }
}

impl NativeHooks for FeedDriver {
    fn read_native(&self) -> Result<Value, DriverError> {
        let state = self.endpoint.inner.lock();
        FeedEndpoint::ensure_reachable(&state, &self.endpoint.resource)?;
        Ok(state.value.clone())
    }

    fn write_native(&self, value: &Value) -> Result<(), DriverError> {
        let mut state = self.endpoint.inner.lock();
        FeedEndpoint::ensure_reachable(&state, &self.endpoint.resource)?;
        state.value = value.clone();
        Ok(())
    }

    fn observe_native(&self) -> Result<(), DriverError> {
        let mut state = self.endpoint.inner.lock();
        FeedEndpoint::ensure_reachable(&state, &self.endpoint.resource)?;
        if state.notifier.is_none() {
            return Err(DriverError::new(
                status::UNSUPPORTED,
                "driver not bound to an element",
            ));
        }
        state.observed = true;
        debug!(resource = %self.endpoint.resource, "resource observation registered");
        Ok(())
    }

    fn bind(&mut self, notifier: ChangeNotifier) {
        self.endpoint.inner.lock().notifier = Some(notifier);
    }
}

/// Pump values from `updates` into `endpoint` until the sender side closes.
/// The task resolves to the number of values that reached an element.
pub fn spawn_feed(endpoint: FeedEndpoint, mut updates: mpsc::Receiver<Value>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut delivered = 0;
        while let Some(value) = updates.recv().await {
            match endpoint.publish(value) {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(resource = %endpoint.resource(), error = %err, "dropping malformed feed update")
                }
            }
        }
        debug!(resource = %endpoint.resource(), delivered, "feed closed");
        delivered
    })
}
