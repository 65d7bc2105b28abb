//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "binary"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Binary entrypoint for the devdata simulation daemon."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use devdata_common::config::{AppConfig, DeviceConfig};
use devdata_common::logging::{init_tracing, LogFormat};
use devdata_core::{new_registry, Device, ElementMetrics, Value};
use devdata_drivers::{build_device, spawn_feed, Backend, RegisterCodec};
use indexmap::IndexMap;
use prometheus::TextEncoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Device data simulation daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override the stdout log format")]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Pretty,
    StructuredJson,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::StructuredJson => LogFormat::StructuredJson,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Build the devices and run the simulated device side")]
    Run {
        #[arg(long, help = "Stop after this many simulation ticks per device")]
        ticks: Option<u64>,
    },
    #[command(about = "Print the configured devices and elements")]
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/devices.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }

    match cli.command.unwrap_or(Commands::Run { ticks: None }) {
        Commands::List => {
            print_inventory(&config);
            Ok(())
        }
        Commands::Run { ticks } => {
            init_tracing("devdatad", &config.logging)?;
            info!(config_path = %loaded.source.display(), devices = config.devices.len(), "configuration loaded");
            run(config, ticks).await
        }
    }
}

fn print_inventory(config: &AppConfig) {
    for (device_id, device) in &config.devices {
        println!("{} ({:?}) {}", device_id, device.driver, device.description);
        for element in &device.elements {
            println!(
                "  {:<16} {:<8} {:<20} {}",
                element.name,
                element.value_type.to_string(),
                element.access_mask().to_string(),
                element.description
            );
        }
    }
}

async fn run(config: AppConfig, ticks: Option<u64>) -> Result<()> {
    let metrics = if config.metrics.enabled {
        Some(ElementMetrics::new(new_registry())?)
    } else {
        None
    };

    let mut devices = Vec::new();
    let mut simulations = Vec::new();
    let mut simulated = Vec::new();
    for (device_id, device_config) in &config.devices {
        let built = build_device(device_id, device_config, metrics.as_ref())?;
        observe_device(&built.device);
        simulations.push(spawn_simulation(
            device_id.clone(),
            device_config.clone(),
            built.backend,
            ticks,
        ));
        simulated.push(device_id.clone());
        devices.push(built.device);
    }

    tokio::select! {
        _ = signal::ctrl_c() => info!("shutdown requested"),
        results = futures::future::join_all(simulations) => {
            for (device_id, result) in simulated.iter().zip(results) {
                if let Err(err) = result {
                    error!(device = %device_id, error = %err, "simulation task failed");
                }
            }
            info!("simulation finished");
        }
    }

    for device in &devices {
        for element in device.iter().filter(|element| element.is_readable()) {
            match element.read() {
                Ok(value) => info!(device = %device.name(), element = %element.name(), %value, "final reading"),
                Err(err) => warn!(device = %device.name(), element = %element.name(), error = %err, "final reading failed"),
            }
        }
    }

    if let Some(metrics) = &metrics {
        let encoded = TextEncoder::new().encode_to_string(&metrics.registry().gather())?;
        println!("{encoded}");
    }
    Ok(())
}

fn observe_device(device: &Device) {
    for element in device.iter().filter(|element| element.is_observable()) {
        let device_id = device.name().to_owned();
        let element_name = element.name().to_owned();
        let result = element.observe(move |value| {
            info!(device = %device_id, element = %element_name, %value, "value changed");
        });
        if let Err(err) = result {
            warn!(device = %device.name(), element = %element.name(), error = %err, "observation not engaged");
        }
    }
}

fn next_sample(current: &Value, rng: &mut impl Rng) -> Value {
    match current {
        Value::Integer(v) => {
            Value::Integer((*v + rng.gen_range(0..=3i64)).min(i64::from(u16::MAX)))
        }
        Value::Float(v) => {
            let next = (*v + rng.gen_range(-0.5..=0.5f64)).clamp(0.0, 100.0);
            Value::Float((next * 10.0).round() / 10.0)
        }
        Value::Boolean(v) => Value::Boolean(if rng.gen_bool(0.2) { !v } else { *v }),
        Value::String(v) => Value::String(v.clone()),
    }
}

fn spawn_simulation(
    device_id: String,
    config: DeviceConfig,
    backend: Backend,
    ticks: Option<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut interval = tokio::time::interval(config.update_interval);

        let mut feeds = IndexMap::new();
        if let Backend::Feed(endpoints) = &backend {
            for (name, endpoint) in endpoints {
                let (tx, rx) = mpsc::channel(16);
                spawn_feed(endpoint.clone(), rx);
                feeds.insert(name.clone(), tx);
            }
        }

        let mut samples: IndexMap<String, Value> = config
            .elements
            .iter()
            .map(|element| (element.name.clone(), element.value_type.default_value()))
            .collect();

        let mut tick = 0u64;
        loop {
            interval.tick().await;
            if ticks.is_some_and(|limit| tick >= limit) {
                break;
            }
            tick += 1;

            for element in &config.elements {
                let Some(current) = samples.get_mut(&element.name) else {
                    continue;
                };
                let next = next_sample(current, &mut rng);
                *current = next.clone();

                match &backend {
                    Backend::Register(bank) => {
                        let Some(address) = element.register else {
                            continue;
                        };
                        let codec = RegisterCodec::new(element.value_type)
                            .with_scale(element.scale.unwrap_or(1.0));
                        match codec.encode(&next) {
                            Ok(raw) => {
                                bank.apply_external(address, raw);
                            }
                            Err(err) => {
                                debug!(device = %device_id, element = %element.name, error = %err, "sample not representable")
                            }
                        }
                    }
                    Backend::Feed(_) => {
                        if let Some(tx) = feeds.get(&element.name) {
                            if tx.send(next).await.is_err() {
                                warn!(device = %device_id, element = %element.name, "feed closed early");
                            }
                        }
                    }
                }
            }
        }
        debug!(device = %device_id, tick, "simulation stopped");
    })
}
