//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Device container aggregating data elements by name."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use indexmap::IndexMap;
use tracing::debug;

use crate::element::DataElement;
use crate::error::DeviceError;
use crate::value::Value;

/// A device: an ordered set of uniquely named data elements.
#[derive(Debug)]
pub struct Device {
    name: String,
    description: String,
    elements: IndexMap<String, DataElement>,
}

impl Device {
    /// Create an empty device.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            elements: IndexMap::new(),
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Add an element; names must be unique within the device.
    pub fn insert(&mut self, element: DataElement) -> Result<(), DeviceError> {
        if self.elements.contains_key(element.name()) {
            return Err(DeviceError::Duplicate {
                device: self.name.clone(),
                element: element.name().to_owned(),
            });
        }
        debug!(device = %self.name, element = %element.name(), "element added to device");
        self.elements.insert(element.name().to_owned(), element);
        Ok(())
    }

    /// Look up an element by name.
    pub fn element(&self, name: &str) -> Option<&DataElement> {
        self.elements.get(name)
    }

    /// Look up an element by name, failing with [`DeviceError::UnknownElement`].
    pub fn get(&self, name: &str) -> Result<&DataElement, DeviceError> {
        self.elements
            .get(name)
            .ok_or_else(|| DeviceError::UnknownElement {
                device: self.name.clone(),
                element: name.to_owned(),
            })
    }

    /// Read an element through its driver.
    pub fn read(&self, name: &str) -> Result<Value, DeviceError> {
        Ok(self.get(name)?.read()?)
    }

    /// Write an element through its driver.
    pub fn write(&self, name: &str, value: impl Into<Value>) -> Result<(), DeviceError> {
        Ok(self.get(name)?.write(value)?)
    }

    /// Elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DataElement> {
        self.elements.values()
    }

    /// Element names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the device has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
