//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Protocol-agnostic device data elements."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
//! Device data elements shared by every protocol driver in the workspace.
//! This crate owns the permission model, the cached value and its change
//! notifications, and the native hook contract drivers implement.
#![warn(missing_docs)]

pub mod access;
pub mod device;
pub mod element;
pub mod error;
pub mod metrics;
pub mod subscription;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod value;

pub use access::{Access, AccessMask};
pub use device::Device;
pub use element::{ChangeNotifier, DataElement, ElementBuilder, NativeHooks};
pub use error::{DeviceError, DriverError, ElementError, Operation, Result};
pub use metrics::{new_registry, ElementMetrics, SharedRegistry};
pub use subscription::{Activation, Handler, Observation, Subscription, SubscriptionId};
pub use value::{Value, ValueType};
