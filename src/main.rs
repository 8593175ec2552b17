//! Entry point: parses CLI flags, optionally merges a TOML device config,
//! initializes logging, and runs the acceptor until shutdown.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use adbmockd::acceptor;
use adbmockd::backend::{Device, DeviceMetadata};
use adbmockd::config::{Config, DeviceConfig};

fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(verbose).init();
}

fn build_device(config: &Config) -> anyhow::Result<Device> {
    let Some(path) = &config.config else {
        return Ok(Device::new(DeviceMetadata::default()));
    };
    let device_config = DeviceConfig::load(path)?;
    let entries = device_config.filesystem_entries().to_vec();
    let device = Device::new(device_config.metadata())
        .with_packages(device_config.packages())
        .with_processes(device_config.processes())
        .with_log_messages(device_config.log_messages.clone())
        .with_filesystem(|fs| {
            for entry in entries {
                let _ = fs.write_file(&entry.path, "/", entry.content.into_bytes(), entry.mode);
            }
        });
    Ok(device)
}

#[tokio::main]
async fn main() {
    let config = Config::parse();
    initialize_logger(config.verbose);

    let device = match build_device(&config) {
        Ok(device) => device,
        Err(err) => {
            tracing::error!(error = %err, "failed to load device config");
            std::process::exit(1);
        }
    };

    tracing::info!(host = %config.host, port = config.port, "starting adbmockd");

    if let Err(err) = acceptor::run(&config.host, config.port, device).await {
        tracing::error!(error = %err, "adbmockd exited with an error");
        std::process::exit(1);
    }
}
