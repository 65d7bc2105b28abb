//! ---
//! devdata_section: "03-persistence-logging"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Tracing subscriber setup for devdata services."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "DEVDATA_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

// Flush workers live for the whole process; only the first init installs them.
static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Stdout format. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("ignoring {LOG_ENV}={directive:?} ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

fn file_layer<S>(writer: NonBlocking) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_current_span(true)
        .with_writer(writer)
        .boxed()
}

/// Base path of the daily log file for `service_name`; the appender adds a
/// date suffix.
pub fn log_file_path(directory: &Path, service_name: &str) -> PathBuf {
    directory.join(format!("{service_name}.log"))
}

/// Install the global tracing subscriber.
///
/// * `DEVDATA_LOG` overrides the filter (e.g. `debug,devdata_core=trace`);
///   otherwise `RUST_LOG` is honoured, finally defaulting to `info`.
/// * Stdout receives JSON or pretty output per [`LogFormat`]; element events
///   are also written as JSON to [`log_file_path`], rolled daily.
///
/// Calling this more than once keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "unable to create log directory {}",
            config.directory.display()
        )
    })?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{service_name}.log")));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer(config.format, stdout_writer))
        .with(file_layer(file_writer))
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set([file_guard, stdout_guard]);
        info!(
            service = %service_name,
            log_file = %log_file_path(&config.directory, service_name).display(),
            format = ?config.format,
            "tracing initialised"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_uses_kebab_case() {
        let parsed: LoggingConfig = toml::from_str("format = \"pretty\"").unwrap();
        assert_eq!(parsed.format, LogFormat::Pretty);
        let parsed: LoggingConfig = toml::from_str("format = \"structured-json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::StructuredJson);
    }

    #[test]
    fn log_file_is_named_after_service() {
        assert_eq!(
            log_file_path(Path::new("target/logs"), "devdatad"),
            PathBuf::from("target/logs/devdatad.log")
        );
    }

    #[test]
    fn init_creates_log_directory_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
        };
        init_tracing("devdata-test", &config).unwrap();
        assert!(config.directory.is_dir());
        init_tracing("devdata-test", &config).unwrap();
    }
}
