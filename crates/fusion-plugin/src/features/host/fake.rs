//! In-memory hypervisor used by lifecycle tests.

use super::{
    CloneType, Host, HostError, HostResult, PowerOffMode, PowerOnMode, PowerState, ToolsState,
    VirtualMachine,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct FakeVmState {
    pub display_name: String,
    pub memory_mbs: u32,
    pub vcpus: u32,
    pub running: bool,
    pub tools: ToolsState,
    pub power_on_mode: Option<PowerOnMode>,
    pub power_off_mode: Option<PowerOffMode>,
}

#[derive(Default)]
struct FakeHostState {
    vms: HashMap<PathBuf, FakeVmState>,
    calls: Vec<String>,
    fail_enumeration: bool,
    fail_power_on: bool,
    fail_power_off: HashSet<PathBuf>,
    disconnected: bool,
}

#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<FakeHostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a VM that is already running, e.g. one left over from a
    /// previous process.
    pub fn add_running_vm(&self, vmx_path: impl Into<PathBuf>, display_name: &str) {
        let mut state = self.state.lock().unwrap();
        state.vms.insert(
            vmx_path.into(),
            FakeVmState {
                display_name: display_name.to_string(),
                running: true,
                ..FakeVmState::default()
            },
        );
    }

    pub fn set_tools_state(&self, vmx_path: &Path, tools: ToolsState) {
        let mut state = self.state.lock().unwrap();
        if let Some(vm) = state.vms.get_mut(vmx_path) {
            vm.tools = tools;
        }
    }

    pub fn fail_enumeration(&self) {
        self.state.lock().unwrap().fail_enumeration = true;
    }

    pub fn fail_power_on(&self) {
        self.state.lock().unwrap().fail_power_on = true;
    }

    /// Make `power_off` fail for the VM at `vmx_path` only.
    pub fn fail_power_off(&self, vmx_path: &Path) {
        self.state
            .lock()
            .unwrap()
            .fail_power_off
            .insert(vmx_path.to_path_buf());
    }

    pub fn vm(&self, vmx_path: &Path) -> Option<FakeVmState> {
        self.state.lock().unwrap().vms.get(vmx_path).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn running_paths(&self) -> Vec<PathBuf> {
        let state = self.state.lock().unwrap();
        state
            .vms
            .iter()
            .filter(|(_, vm)| vm.running)
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.lock().unwrap().disconnected
    }

    fn handle(&self, vmx_path: &Path) -> Arc<dyn VirtualMachine> {
        Arc::new(FakeVm {
            host: self.clone(),
            vmx_path: vmx_path.to_path_buf(),
        })
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn with_vm<T>(
        &self,
        vmx_path: &Path,
        f: impl FnOnce(&mut FakeVmState) -> T,
    ) -> HostResult<T> {
        let mut state = self.state.lock().unwrap();
        state
            .vms
            .get_mut(vmx_path)
            .map(f)
            .ok_or_else(|| HostError::VmNotFound(vmx_path.display().to_string()))
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn open_vm(
        &self,
        vmx_path: &Path,
        _password: Option<&str>,
    ) -> HostResult<Arc<dyn VirtualMachine>> {
        let known = self.state.lock().unwrap().vms.contains_key(vmx_path);
        if !known {
            if !vmx_path.is_file() {
                return Err(HostError::VmNotFound(vmx_path.display().to_string()));
            }
            self.state
                .lock()
                .unwrap()
                .vms
                .insert(vmx_path.to_path_buf(), FakeVmState::default());
        }
        self.record(format!("open {}", vmx_path.display()));
        Ok(self.handle(vmx_path))
    }

    async fn find_running(&self) -> HostResult<Vec<PathBuf>> {
        if self.state.lock().unwrap().fail_enumeration {
            return Err(HostError::CommandFailed {
                command: "list".to_string(),
                status: Some(255),
                stderr: "Error: host unavailable".to_string(),
            });
        }
        let mut running = self.running_paths();
        running.sort();
        Ok(running)
    }

    async fn disconnect(&self) {
        self.state.lock().unwrap().disconnected = true;
    }
}

struct FakeVm {
    host: FakeHost,
    vmx_path: PathBuf,
}

#[async_trait]
impl VirtualMachine for FakeVm {
    async fn clone_vm(
        &self,
        _clone_type: CloneType,
        destination: &Path,
    ) -> HostResult<Arc<dyn VirtualMachine>> {
        tokio::fs::write(destination, "config.version = \"8\"\n")
            .await
            .map_err(|e| HostError::io(destination, e))?;
        self.host
            .state
            .lock()
            .unwrap()
            .vms
            .insert(destination.to_path_buf(), FakeVmState::default());
        self.host.record(format!("clone {}", destination.display()));
        Ok(self.host.handle(destination))
    }

    async fn set_display_name(&self, name: &str) -> HostResult<()> {
        self.host.record(format!("set_display_name {name}"));
        self.host
            .with_vm(&self.vmx_path, |vm| vm.display_name = name.to_string())
    }

    async fn set_memory_size(&self, megabytes: u32) -> HostResult<()> {
        self.host.record(format!("set_memory_size {megabytes}"));
        self.host
            .with_vm(&self.vmx_path, |vm| vm.memory_mbs = megabytes)
    }

    async fn set_vcpus(&self, count: u32) -> HostResult<()> {
        self.host.record(format!("set_vcpus {count}"));
        self.host.with_vm(&self.vmx_path, |vm| vm.vcpus = count)
    }

    async fn power_on(&self, mode: PowerOnMode) -> HostResult<()> {
        self.host.record("power_on".to_string());
        if self.host.state.lock().unwrap().fail_power_on {
            return Err(HostError::CommandFailed {
                command: "start".to_string(),
                status: Some(255),
                stderr: "Error: cannot power on".to_string(),
            });
        }
        self.host.with_vm(&self.vmx_path, |vm| {
            vm.running = true;
            vm.power_on_mode = Some(mode);
        })
    }

    async fn power_off(&self, mode: PowerOffMode) -> HostResult<()> {
        self.host.record(format!("power_off {mode:?}"));
        if self
            .host
            .state
            .lock()
            .unwrap()
            .fail_power_off
            .contains(&self.vmx_path)
        {
            return Err(HostError::CommandFailed {
                command: "stop".to_string(),
                status: Some(255),
                stderr: "Error: The virtual machine is busy".to_string(),
            });
        }
        self.host.with_vm(&self.vmx_path, |vm| {
            vm.running = false;
            vm.power_off_mode = Some(mode);
        })
    }

    async fn is_running(&self) -> HostResult<bool> {
        self.host.with_vm(&self.vmx_path, |vm| vm.running)
    }

    async fn power_state(&self) -> HostResult<PowerState> {
        self.host.with_vm(&self.vmx_path, |vm| {
            if vm.running {
                PowerState::POWERED_ON
            } else {
                PowerState::POWERED_OFF
            }
        })
    }

    async fn tools_state(&self) -> HostResult<ToolsState> {
        self.host.with_vm(&self.vmx_path, |vm| vm.tools)
    }

    async fn display_name(&self) -> HostResult<String> {
        self.host
            .with_vm(&self.vmx_path, |vm| vm.display_name.clone())
    }

    async fn vmx_path(&self) -> HostResult<PathBuf> {
        Ok(self.vmx_path.clone())
    }
}
