//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Error taxonomy for device data elements and containers."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::access::Access;
use crate::value::{Value, ValueType};

/// Result alias for element operations.
pub type Result<T> = std::result::Result<T, ElementError>;

/// Element operation that delegated to a native hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// `read` / native read.
    Read,
    /// `write` / native write.
    Write,
    /// `observe` / native observation activation.
    Observe,
}

/// Status reported by a protocol driver hook. The core never interprets `code`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("driver status {code}: {message}")]
pub struct DriverError {
    /// Driver specific status code.
    pub code: i16,
    /// Human readable detail.
    pub message: String,
}

impl DriverError {
    /// The driver returned a value that does not match the element's declared type.
    pub const CONTRACT_VIOLATION: i16 = -1;

    /// Build a driver error from a status code and message.
    pub fn new(code: i16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failures returned by [`crate::DataElement`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementError {
    /// The element does not grant the requested access.
    #[error("element {element}: {access} access denied")]
    AccessDenied {
        /// Element name.
        element: String,
        /// Missing capability.
        access: Access,
    },
    /// The supplied value does not carry the element's declared type.
    #[error("element {element}: expected {expected} value, got {found}")]
    TypeMismatch {
        /// Element name.
        element: String,
        /// Declared type of the element.
        expected: ValueType,
        /// Type of the rejected value.
        found: ValueType,
    },
    /// Observation was requested on a non-observable element.
    #[error("element {element} does not support observation")]
    ObserveNotSupported {
        /// Element name.
        element: String,
    },
    /// A native hook reported an error.
    #[error("element {element}: native {operation} failed")]
    NativeFailure {
        /// Element name.
        element: String,
        /// Operation that delegated to the failing hook.
        operation: Operation,
        /// Cached value at the time of the failure, left untouched.
        cached: Value,
        /// Driver status.
        #[source]
        source: DriverError,
    },
}

impl ElementError {
    /// Short label used for metrics and structured logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            ElementError::AccessDenied { .. } => "access_denied",
            ElementError::TypeMismatch { .. } => "type_mismatch",
            ElementError::ObserveNotSupported { .. } => "observe_not_supported",
            ElementError::NativeFailure { .. } => "native_failure",
        }
    }

    /// Driver status code for native failures.
    pub fn driver_code(&self) -> Option<i16> {
        match self {
            ElementError::NativeFailure { source, .. } => Some(source.code),
            _ => None,
        }
    }
}

/// Failures returned by [`crate::Device`] lookups and mutations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// An element with the same name was already registered.
    #[error("device {device} already contains element {element}")]
    Duplicate {
        /// Device name.
        device: String,
        /// Conflicting element name.
        element: String,
    },
    /// No element with the given name exists.
    #[error("device {device} has no element named {element}")]
    UnknownElement {
        /// Device name.
        device: String,
        /// Requested element name.
        element: String,
    },
    /// The element rejected the operation.
    #[error(transparent)]
    Element(#[from] ElementError),
}
