//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Device data element: access control, value cache, and change dispatch."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
//! A [`DataElement`] is one named, typed value exposed by a device. Callers
//! read, write, and observe it; the protocol specific work is delegated to a
//! driver implementing [`NativeHooks`]. Drivers push unsolicited updates
//! through the [`ChangeNotifier`] handed to them in [`NativeHooks::bind`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::access::{Access, AccessMask};
use crate::error::{DriverError, ElementError, Operation, Result};
use crate::metrics::ElementMetrics;
use crate::subscription::{Activation, Observation, Subscription, SubscriptionList};
use crate::value::{Value, ValueType};

/// Protocol specific hooks a driver supplies for one element.
///
/// Hooks are blocking: they complete (successfully or not) before the element
/// operation that invoked them returns. Drivers must not call back into the
/// owning element from inside a hook.
pub trait NativeHooks: Send + Sync {
    /// Fetch the current value from the device. Whether this hits the wire or
    /// serves a driver-side cache is driver policy.
    fn read_native(&self) -> std::result::Result<Value, DriverError>;

    /// Push a new value to the device.
    fn write_native(&self, value: &Value) -> std::result::Result<(), DriverError>;

    /// Engage the protocol's change notification mechanism.
    fn observe_native(&self) -> std::result::Result<(), DriverError>;

    /// Receive the notifier used to report externally driven changes. Called
    /// exactly once, while the element is being built.
    fn bind(&mut self, notifier: ChangeNotifier) {
        let _ = notifier;
    }
}

#[derive(Debug)]
struct ElementState {
    cached: Value,
    observing: bool,
    subscriptions: SubscriptionList,
    // Set while the outermost commit runs handlers; nested commits only queue.
    dispatching: bool,
    pending: VecDeque<Value>,
}

struct ElementCore {
    name: String,
    description: String,
    value_type: ValueType,
    access: AccessMask,
    metrics: Option<ElementMetrics>,
    // Held for the whole of read/write/observe/notify so caller operations and
    // driver notifications never interleave. Reentrant so handlers may call
    // back into the element from the dispatching thread.
    serial: ReentrantMutex<()>,
    state: Mutex<ElementState>,
}

impl ElementCore {
    fn cached(&self) -> Value {
        self.state.lock().cached.clone()
    }

    fn denied(&self, access: Access) -> ElementError {
        ElementError::AccessDenied {
            element: self.name.clone(),
            access,
        }
    }

    fn native_failure(&self, operation: Operation, source: DriverError) -> ElementError {
        ElementError::NativeFailure {
            element: self.name.clone(),
            operation,
            cached: self.cached(),
            source,
        }
    }

    fn finish<T>(&self, operation: Operation, result: Result<T>) -> Result<T> {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => {
                warn!(element = %self.name, %operation, error = %err, code = ?err.driver_code(), "element operation failed");
                err.outcome()
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(&self.name, operation, outcome);
        }
        result
    }

    /// Replace the cache and dispatch to every subscriber. Caller holds `serial`.
    ///
    /// A commit issued by a handler during dispatch updates the cache at once
    /// but its delivery is queued behind the change being dispatched, so every
    /// handler sees changes in the order they were committed.
    fn commit(&self, value: Value) {
        {
            let mut state = self.state.lock();
            state.cached = value.clone();
            state.pending.push_back(value);
            if state.dispatching {
                debug!(element = %self.name, queued = state.pending.len(), "change queued behind running dispatch");
                return;
            }
            state.dispatching = true;
        }
        let _dispatch = DispatchGuard(self);
        loop {
            let (value, handlers) = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(value) => (value, state.subscriptions.snapshot()),
                    None => break,
                }
            };
            debug!(element = %self.name, %value, subscribers = handlers.len(), "dispatching change");
            for handler in &handlers {
                handler(&value);
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_notifications(&self.name, handlers.len());
            }
        }
    }

    fn notify_changed(&self, value: Value) {
        let _serial = self.serial.lock();
        assert!(
            value.is_compatible(self.value_type),
            "driver reported a {} value for {} element `{}`",
            value.value_type(),
            self.value_type,
            self.name
        );
        self.commit(value);
    }
}

/// Ends a dispatch run, even when a handler panics.
struct DispatchGuard<'a>(&'a ElementCore);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.dispatching = false;
        state.pending.clear();
    }
}

/// Driver-side handle for reporting externally driven value changes.
///
/// Only obtainable through [`NativeHooks::bind`]. The notifier does not keep
/// its element alive; once the element is dropped it becomes inert.
#[derive(Clone)]
pub struct ChangeNotifier {
    core: Weak<ElementCore>,
    element: String,
    value_type: ValueType,
}

impl ChangeNotifier {
    /// Name of the element this notifier feeds.
    pub fn element(&self) -> &str {
        &self.element
    }

    /// Declared type of the element this notifier feeds.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Whether the element still exists.
    pub fn is_attached(&self) -> bool {
        self.core.strong_count() > 0
    }

    /// Replace the element's cached value and invoke every subscriber, in
    /// registration order, on the calling thread. Returns `false` when the
    /// element no longer exists.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not carry the element's declared type; that is
    /// a driver bug, not a runtime condition.
    pub fn notify_changed(&self, value: impl Into<Value>) -> bool {
        match self.core.upgrade() {
            Some(core) => {
                core.notify_changed(value.into());
                true
            }
            None => {
                debug!(element = %self.element, "dropping change for detached element");
                false
            }
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("element", &self.element)
            .field("value_type", &self.value_type)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Builder for [`DataElement`] with optional instrumentation.
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    name: String,
    description: String,
    value_type: ValueType,
    access: AccessMask,
    metrics: Option<ElementMetrics>,
}

impl ElementBuilder {
    /// Start a builder with the immutable element attributes.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        value_type: ValueType,
        access: AccessMask,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value_type,
            access,
            metrics: None,
        }
    }

    /// Record operations and notifications into `metrics`.
    pub fn metrics(mut self, metrics: ElementMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach the driver and produce the element.
    pub fn build<D>(self, mut driver: D) -> DataElement
    where
        D: NativeHooks + 'static,
    {
        let core = Arc::new(ElementCore {
            state: Mutex::new(ElementState {
                cached: self.value_type.default_value(),
                observing: false,
                subscriptions: SubscriptionList::default(),
                dispatching: false,
                pending: VecDeque::new(),
            }),
            name: self.name,
            description: self.description,
            value_type: self.value_type,
            access: self.access,
            metrics: self.metrics,
            serial: ReentrantMutex::new(()),
        });
        driver.bind(ChangeNotifier {
            core: Arc::downgrade(&core),
            element: core.name.clone(),
            value_type: core.value_type,
        });
        debug!(element = %core.name, value_type = %core.value_type, access = %core.access, "data element created");
        DataElement {
            core,
            driver: Box::new(driver),
        }
    }
}

/// One named, typed, access-controlled value exposed by a device.
pub struct DataElement {
    core: Arc<ElementCore>,
    driver: Box<dyn NativeHooks>,
}

impl DataElement {
    /// Create an element; name, description, type, and access are fixed for
    /// its whole lifetime.
    pub fn new<D>(
        name: impl Into<String>,
        description: impl Into<String>,
        value_type: ValueType,
        access: AccessMask,
        driver: D,
    ) -> Self
    where
        D: NativeHooks + 'static,
    {
        ElementBuilder::new(name, description, value_type, access).build(driver)
    }

    /// Start a builder for an element with optional instrumentation.
    pub fn builder(
        name: impl Into<String>,
        description: impl Into<String>,
        value_type: ValueType,
        access: AccessMask,
    ) -> ElementBuilder {
        ElementBuilder::new(name, description, value_type, access)
    }

    /// Element name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Human readable description.
    pub fn description(&self) -> &str {
        &self.core.description
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        self.core.value_type
    }

    /// Access mask granted at construction.
    pub fn access(&self) -> AccessMask {
        self.core.access
    }

    /// Whether `read` is permitted.
    pub fn is_readable(&self) -> bool {
        self.core.access.grants(Access::Read)
    }

    /// Whether `write` is permitted.
    pub fn is_writable(&self) -> bool {
        self.core.access.grants(Access::Write)
    }

    /// Whether `observe` is permitted.
    pub fn is_observable(&self) -> bool {
        self.core.access.grants(Access::Observe)
    }

    /// Whether the native observation has been engaged.
    pub fn is_observed(&self) -> bool {
        self.core.state.lock().observing
    }

    /// Number of registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.core.state.lock().subscriptions.len()
    }

    /// Last known value, without touching the driver.
    pub fn cached(&self) -> Value {
        self.core.cached()
    }

    /// Fetch the value through the driver, refresh the cache, and return it.
    ///
    /// On driver failure the cache is left untouched and carried in the
    /// returned [`ElementError::NativeFailure`].
    pub fn read(&self) -> Result<Value> {
        let _serial = self.core.serial.lock();
        let result = self.read_locked();
        self.core.finish(Operation::Read, result)
    }

    fn read_locked(&self) -> Result<Value> {
        if !self.is_readable() {
            return Err(self.core.denied(Access::Read));
        }
        let value = self
            .driver
            .read_native()
            .map_err(|source| self.core.native_failure(Operation::Read, source))?;
        if !value.is_compatible(self.core.value_type) {
            let source = DriverError::new(
                DriverError::CONTRACT_VIOLATION,
                format!(
                    "driver returned {} value for {} element",
                    value.value_type(),
                    self.core.value_type
                ),
            );
            return Err(self.core.native_failure(Operation::Read, source));
        }
        self.core.state.lock().cached = value.clone();
        Ok(value)
    }

    /// Validate and push a new value to the device. On success the cache is
    /// updated and every subscriber is notified; on any failure the cache is
    /// left untouched.
    pub fn write(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let _serial = self.core.serial.lock();
        let result = self.write_locked(value);
        self.core.finish(Operation::Write, result)
    }

    fn write_locked(&self, value: Value) -> Result<()> {
        if !self.is_writable() {
            return Err(self.core.denied(Access::Write));
        }
        if !value.is_compatible(self.core.value_type) {
            return Err(ElementError::TypeMismatch {
                element: self.core.name.clone(),
                expected: self.core.value_type,
                found: value.value_type(),
            });
        }
        self.driver
            .write_native(&value)
            .map_err(|source| self.core.native_failure(Operation::Write, source))?;
        self.core.commit(value);
        Ok(())
    }

    /// Register `handler` for value changes and engage native observation if
    /// it is not active yet.
    ///
    /// If the native hook fails the subscription stays registered and the
    /// error is returned; the next `observe` call retries the activation. Use
    /// [`DataElement::try_observe`] to keep the subscription handle in that
    /// case.
    pub fn observe<F>(&self, handler: F) -> Result<Subscription>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let observation = self.try_observe(handler)?;
        match observation.activation {
            Activation::Failed(err) => Err(err),
            Activation::Engaged | Activation::AlreadyActive => Ok(observation.subscription),
        }
    }

    /// Like [`DataElement::observe`] but reports the subscription and the
    /// activation outcome separately. Only fails when the element is not
    /// observable, in which case nothing is registered.
    pub fn try_observe<F>(&self, handler: F) -> Result<Observation>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let _serial = self.core.serial.lock();
        if !self.is_observable() {
            let err = ElementError::ObserveNotSupported {
                element: self.core.name.clone(),
            };
            return self.core.finish(Operation::Observe, Err(err));
        }

        let (subscription, observing) = {
            let mut state = self.core.state.lock();
            let id = state.subscriptions.push(Arc::new(handler));
            (Subscription::new(id, self.core.name.as_str()), state.observing)
        };
        debug!(element = %self.core.name, subscription = %subscription.id(), "subscription registered");

        let activation = if observing {
            Activation::AlreadyActive
        } else {
            match self.driver.observe_native() {
                Ok(()) => {
                    self.core.state.lock().observing = true;
                    info!(element = %self.core.name, "native observation engaged");
                    Activation::Engaged
                }
                Err(source) => {
                    Activation::Failed(self.core.native_failure(Operation::Observe, source))
                }
            }
        };

        let recorded = match &activation {
            Activation::Failed(err) => Err(err.clone()),
            Activation::Engaged | Activation::AlreadyActive => Ok(()),
        };
        let _ = self.core.finish(Operation::Observe, recorded);

        Ok(Observation {
            subscription,
            activation,
        })
    }

    /// Revoke a subscription. Returns `false` if it was not registered here.
    /// Native observation stays engaged even when the last subscriber leaves.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let _serial = self.core.serial.lock();
        let removed = self
            .core
            .state
            .lock()
            .subscriptions
            .remove(subscription.id());
        if removed {
            debug!(element = %self.core.name, subscription = %subscription.id(), "subscription revoked");
        }
        removed
    }
}

impl fmt::Debug for DataElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("DataElement")
            .field("name", &self.core.name)
            .field("value_type", &self.core.value_type)
            .field("access", &self.core.access)
            .field("cached", &state.cached)
            .field("observing", &state.observing)
            .field("subscribers", &state.subscriptions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;

    fn temperature(driver: MockDriver) -> DataElement {
        DataElement::new(
            "temp",
            "Temperature",
            ValueType::Float,
            AccessMask::READ | AccessMask::OBSERVE,
            driver,
        )
    }

    #[test]
    fn cache_starts_at_type_default() {
        let element = temperature(MockDriver::new(21.0));
        assert_eq!(element.cached(), Value::Float(0.0));
        assert!(!element.is_observed());
    }

    #[test]
    fn read_refreshes_cache() {
        let driver = MockDriver::new(21.0);
        let element = temperature(driver.clone());
        assert_eq!(element.read().unwrap(), Value::Float(21.0));
        driver.set_value(23.5);
        assert_eq!(element.cached(), Value::Float(21.0));
        assert_eq!(element.read().unwrap(), Value::Float(23.5));
        assert_eq!(driver.read_calls(), 2);
    }

    #[test]
    fn read_with_wrong_driver_type_is_a_native_failure() {
        let driver = MockDriver::new(7);
        let element = temperature(driver);
        let err = element.read().unwrap_err();
        assert_eq!(err.driver_code(), Some(DriverError::CONTRACT_VIOLATION));
        assert_eq!(element.cached(), Value::Float(0.0));
    }

    #[test]
    fn read_is_denied_without_read_bit() {
        let driver = MockDriver::new(1);
        let element = DataElement::new(
            "cmd",
            "Command",
            ValueType::Integer,
            AccessMask::WRITE,
            driver.clone(),
        );
        assert!(matches!(
            element.read(),
            Err(ElementError::AccessDenied { access: Access::Read, .. })
        ));
        assert_eq!(driver.read_calls(), 0);
    }

    #[test]
    fn notifier_is_inert_after_element_drop() {
        let driver = MockDriver::new(1.0);
        let element = temperature(driver.clone());
        assert!(driver.push(2.0));
        drop(element);
        assert!(!driver.push(3.0));
    }

    #[test]
    #[should_panic(expected = "driver reported a integer value")]
    fn notify_with_wrong_type_panics() {
        let driver = MockDriver::new(1.0);
        let _element = temperature(driver.clone());
        driver.push(5);
    }

    #[test]
    fn handler_may_read_cache_during_dispatch() {
        let driver = MockDriver::new(1.0);
        let element = Arc::new(temperature(driver.clone()));
        let seen = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(&element);
        let sink = Arc::clone(&seen);
        element
            .observe(move |_| {
                if let Some(element) = weak.upgrade() {
                    *sink.lock() = Some(element.cached());
                }
            })
            .unwrap();
        driver.push(4.5);
        assert_eq!(*seen.lock(), Some(Value::Float(4.5)));
    }
}
