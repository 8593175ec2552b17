//! The simulated Android device consumed by the protocol engine. Holds
//! filesystem, property store, package/process lists, forward rules and a
//! log ring behind a single lock so it is safe to share across transport
//! sessions.

pub mod fs;
pub mod shell;

use parking_lot::Mutex;

use fs::Filesystem;

#[derive(Debug, Clone)]
pub struct DeviceMetadata {
    pub serial: String,
    pub model: String,
    pub manufacturer: String,
    pub android_version: String,
    pub sdk_version: String,
    pub kernel_version: String,
    pub state: String,
}

impl Default for DeviceMetadata {
    fn default() -> Self {
        Self {
            serial: "MOCK123456".to_string(),
            model: "MockPhone".to_string(),
            manufacturer: "MockMaker".to_string(),
            android_version: "12".to_string(),
            sdk_version: "31".to_string(),
            kernel_version: "5.4.0".to_string(),
            state: "device".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub package: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub user: String,
    pub name: String,
    pub cpu: f32,
    pub mem: f32,
}

struct DeviceState {
    metadata: DeviceMetadata,
    properties: std::collections::BTreeMap<String, String>,
    filesystem: Filesystem,
    packages: Vec<PackageInfo>,
    processes: Vec<ProcessInfo>,
    forward_rules: std::collections::BTreeMap<String, String>,
    log_messages: Vec<String>,
    log_cursor: usize,
    next_pid: u32,
}

/// Shared, lock-protected simulated device. Cheap to clone (an `Arc`
/// internally) so every accepted connection gets its own handle onto the
/// same device state.
#[derive(Clone)]
pub struct Device(std::sync::Arc<Mutex<DeviceState>>);

impl Device {
    pub fn new(metadata: DeviceMetadata) -> Self {
        let mut properties = std::collections::BTreeMap::new();
        properties.insert("ro.product.model".to_string(), metadata.model.clone());
        properties.insert("ro.product.manufacturer".to_string(), metadata.manufacturer.clone());
        properties.insert("ro.product.device".to_string(), metadata.model.to_lowercase());
        properties.insert("ro.product.name".to_string(), metadata.model.to_lowercase());
        properties.insert("ro.build.version.release".to_string(), metadata.android_version.clone());
        properties.insert("ro.build.version.sdk".to_string(), metadata.sdk_version.clone());
        properties.insert("ro.serialno".to_string(), metadata.serial.clone());

        let log_messages = vec![
            "01-01 00:00:00.000  1000  1000 I ActivityManager: Start proc 1000:com.android.systemui/u0a100 for service".to_string(),
            "01-01 00:00:01.000  1000  1000 I PackageManager: Package manager ready".to_string(),
        ];

        Self(std::sync::Arc::new(Mutex::new(DeviceState {
            metadata,
            properties,
            filesystem: Filesystem::default(),
            packages: Vec::new(),
            processes: Vec::new(),
            forward_rules: std::collections::BTreeMap::new(),
            log_messages,
            log_cursor: 0,
            next_pid: 1001,
        })))
    }

    pub fn with_filesystem(self, f: impl FnOnce(&mut Filesystem)) -> Self {
        f(&mut self.0.lock().filesystem);
        self
    }

    pub fn with_packages(self, packages: Vec<PackageInfo>) -> Self {
        self.0.lock().packages = packages;
        self
    }

    pub fn with_processes(self, processes: Vec<ProcessInfo>) -> Self {
        let mut state = self.0.lock();
        state.next_pid = processes.iter().map(|p| p.pid).max().unwrap_or(1000) + 1;
        state.processes = processes;
        drop(state);
        self
    }

    pub fn with_log_messages(self, messages: Vec<String>) -> Self {
        if !messages.is_empty() {
            self.0.lock().log_messages = messages;
        }
        self
    }

    pub fn serial(&self) -> String {
        self.0.lock().metadata.serial.clone()
    }

    pub fn state(&self) -> String {
        self.0.lock().metadata.state.clone()
    }

    pub fn model(&self) -> String {
        self.0.lock().metadata.model.clone()
    }

    pub fn banner_properties(&self) -> Vec<(String, String)> {
        self.0.lock().properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn get_property(&self, name: &str) -> Option<String> {
        self.0.lock().properties.get(name).cloned()
    }

    pub fn set_property(&self, name: &str, value: &str) {
        self.0.lock().properties.insert(name.to_string(), value.to_string());
    }

    pub fn list_properties(&self) -> Vec<(String, String)> {
        self.0.lock().properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn list_packages(&self) -> Vec<PackageInfo> {
        let mut packages = self.0.lock().packages.clone();
        packages.sort_by(|a, b| a.package.cmp(&b.package));
        packages
    }

    pub fn install_package(&self, apk_path: &str) -> String {
        let name = apk_path.rsplit('/').next().unwrap_or(apk_path).trim_end_matches(".apk").to_string();
        let mut state = self.0.lock();
        state.packages.push(PackageInfo { package: name.clone(), path: apk_path.to_string() });
        name
    }

    pub fn uninstall_package(&self, package: &str) -> bool {
        let mut state = self.0.lock();
        let before = state.packages.len();
        state.packages.retain(|p| p.package != package);
        state.packages.len() != before
    }

    pub fn list_processes(&self) -> Vec<ProcessInfo> {
        let mut processes = self.0.lock().processes.clone();
        processes.sort_by_key(|p| p.pid);
        processes
    }

    pub fn spawn_process(&self, name: &str, user: &str) -> ProcessInfo {
        let mut state = self.0.lock();
        let pid = state.next_pid;
        state.next_pid += 1;
        let process = ProcessInfo { pid, user: user.to_string(), name: name.to_string(), cpu: 0.0, mem: 0.0 };
        state.processes.push(process.clone());
        process
    }

    pub fn add_forward_rule(&self, local: &str, remote: &str) {
        self.0.lock().forward_rules.insert(local.to_string(), remote.to_string());
    }

    pub fn remove_forward_rule(&self, local: &str) -> bool {
        self.0.lock().forward_rules.remove(local).is_some()
    }

    pub fn list_forward_rules(&self) -> Vec<(String, String)> {
        self.0.lock().forward_rules.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn next_log_lines(&self, count: usize) -> Vec<String> {
        let mut state = self.0.lock();
        if state.log_messages.is_empty() {
            return Vec::new();
        }
        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            let idx = state.log_cursor % state.log_messages.len();
            lines.push(state.log_messages[idx].clone());
            state.log_cursor += 1;
        }
        lines
    }

    pub fn append_log(&self, message: &str) {
        let now = time::OffsetDateTime::now_utc();
        let stamp = format!("{:02}-{:02} {:02}:{:02}:{:02}.000", now.month() as u8, now.day(), now.hour(), now.minute(), now.second());
        self.0.lock().log_messages.push(format!("{stamp}  1000  1000 I MockDevice: {message}"));
    }

    pub async fn reboot(&self) {
        self.0.lock().metadata.state = "rebooting".to_string();
        self.append_log("BootReceiver: Device reboot requested");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.0.lock().metadata.state = "device".to_string();
        self.append_log("BootReceiver: Device boot completed");
    }

    pub fn with_filesystem_ref<R>(&self, f: impl FnOnce(&Filesystem) -> R) -> R {
        f(&self.0.lock().filesystem)
    }

    pub fn with_filesystem_mut<R>(&self, f: impl FnOnce(&mut Filesystem) -> R) -> R {
        f(&mut self.0.lock().filesystem)
    }
}
