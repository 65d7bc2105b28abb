//! ---
//! devdata_section: "05-networking-external-interfaces"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Reference protocol drivers for device data elements."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
//! Reference drivers: a fieldbus style register bank and a push-feed
//! resource, plus a factory building devices from configuration.

pub mod factory;
pub mod feed;
pub mod register;

/// Status codes reported in [`devdata_core::DriverError::code`] by the drivers
/// in this crate.
pub mod status {
    /// The simulated device is not reachable.
    pub const OFFLINE: i16 = 1;
    /// The requested operation or value kind is not supported.
    pub const UNSUPPORTED: i16 = 2;
    /// The value does not fit the transport representation.
    pub const OUT_OF_RANGE: i16 = 3;
}

pub use factory::{build_device, Backend, BuiltDevice};
pub use feed::{spawn_feed, FeedDriver, FeedEndpoint};
pub use register::{RegisterBank, RegisterCodec, RegisterDriver};
