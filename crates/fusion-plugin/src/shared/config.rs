use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_POWER_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CLEANUP_QUEUE_CAPACITY: usize = 64;

const VM_FOLDER: &str = "Documents/Virtual Machines.localized";

/// Which VMware product `vmrun` talks to (`-T` flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    Fusion,
    Workstation,
}

impl HostType {
    pub fn as_flag(&self) -> &'static str {
        match self {
            HostType::Fusion => "fusion",
            HostType::Workstation => "ws",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fusion" => Some(HostType::Fusion),
            "ws" | "workstation" => Some(HostType::Workstation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Where instance directories are created.
    pub vm_dir: PathBuf,
    /// Where template `.vmwarevm` bundles are looked up.
    pub vm_lib: PathBuf,
    pub vmrun_path: PathBuf,
    pub host_type: HostType,
    pub vm_password: Option<String>,
    pub poll_interval: Duration,
    /// Upper bound for a single power transition wait.
    pub power_timeout: Duration,
    pub command_timeout: Duration,
    pub cleanup_queue_capacity: usize,
}

impl PluginConfig {
    pub fn new(vm_dir: impl Into<PathBuf>, vm_lib: impl Into<PathBuf>) -> Self {
        Self {
            vm_dir: vm_dir.into(),
            vm_lib: vm_lib.into(),
            vmrun_path: PathBuf::from("vmrun"),
            host_type: HostType::Fusion,
            vm_password: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            power_timeout: DEFAULT_POWER_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            cleanup_queue_capacity: DEFAULT_CLEANUP_QUEUE_CAPACITY,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unparsable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let home = lookup("HOME").unwrap_or_default();
        let default_dir = PathBuf::from(home).join(VM_FOLDER);

        let vm_dir = lookup("FUSION_VM_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_dir.clone());
        let vm_lib = lookup("FUSION_VM_LIB")
            .map(PathBuf::from)
            .unwrap_or(default_dir);

        let mut config = Self::new(vm_dir, vm_lib);

        if let Some(path) = lookup("FUSION_VMRUN_PATH") {
            config.vmrun_path = PathBuf::from(path);
        }
        if let Some(host_type) = lookup("FUSION_HOST_TYPE").and_then(|v| HostType::parse(&v)) {
            config.host_type = host_type;
        }
        config.vm_password = lookup("FUSION_VM_PASSWORD").filter(|v| !v.is_empty());

        if let Some(ms) = parse_positive(&lookup, "FUSION_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_positive(&lookup, "FUSION_POWER_TIMEOUT_SECS") {
            config.power_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive(&lookup, "FUSION_COMMAND_TIMEOUT_SECS") {
            config.command_timeout = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_positive(&lookup, "FUSION_CLEANUP_QUEUE_CAPACITY") {
            config.cleanup_queue_capacity = capacity as usize;
        }

        config
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    lookup(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}
