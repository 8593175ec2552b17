//! CLI configuration: host/port/verbosity flags plus an optional TOML
//! file seeding the simulated device.

use clap::Parser;
use serde::Deserialize;

use crate::backend::{DeviceMetadata, PackageInfo, ProcessInfo};

#[derive(Debug, Parser)]
#[command(name = "adbmockd", about = "A mock Android Debug Bridge daemon speaking the binary ADB wire protocol over TCP")]
pub struct Config {
    /// Address to bind the listener on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the listener on.
    #[arg(long, default_value_t = 5037)]
    pub port: u16,

    /// Optional TOML file seeding the simulated device's properties,
    /// filesystem entries, packages, processes and log lines.
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,

    /// Raises the default log level to `debug` when no `RUST_LOG` is set.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceConfig {
    pub serial: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub android_version: Option<String>,
    pub sdk_version: Option<String>,
    pub kernel_version: Option<String>,
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
    #[serde(default)]
    pub processes: Vec<ProcessEntry>,
    #[serde(default)]
    pub log_messages: Vec<String>,
    #[serde(default)]
    pub filesystem: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PackageEntry {
    pub package: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub user: String,
    pub name: String,
}

/// One seeded file, written into the simulated device's filesystem at
/// startup. `mode` defaults to `0o644` when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_file_mode")]
    pub mode: u32,
}

fn default_file_mode() -> u32 {
    0o644
}

impl DeviceConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn metadata(&self) -> DeviceMetadata {
        let default = DeviceMetadata::default();
        DeviceMetadata {
            serial: self.serial.clone().unwrap_or(default.serial),
            model: self.model.clone().unwrap_or(default.model),
            manufacturer: self.manufacturer.clone().unwrap_or(default.manufacturer),
            android_version: self.android_version.clone().unwrap_or(default.android_version),
            sdk_version: self.sdk_version.clone().unwrap_or(default.sdk_version),
            kernel_version: self.kernel_version.clone().unwrap_or(default.kernel_version),
            state: default.state,
        }
    }

    pub fn packages(&self) -> Vec<PackageInfo> {
        self.packages.iter().map(|p| PackageInfo { package: p.package.clone(), path: p.path.clone() }).collect()
    }

    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.processes.iter().map(|p| ProcessInfo { pid: p.pid, user: p.user.clone(), name: p.name.clone(), cpu: 0.0, mem: 0.0 }).collect()
    }

    pub fn filesystem_entries(&self) -> &[FileEntry] {
        &self.filesystem
    }
}
