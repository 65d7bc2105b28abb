//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Shared configuration and logging utilities."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
//! Configuration loading and tracing initialisation shared by devdata
//! services and tools.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, DeviceConfig, DriverKind, ElementConfig, LoadedAppConfig, LoggingConfig,
    MetricsConfig,
};
pub use logging::{init_tracing, LogFormat};
