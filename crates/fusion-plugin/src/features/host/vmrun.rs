//! [`Host`] implementation backed by VMware's `vmrun` command line tool.

use super::command::{describe_command, CommandRunner, TokioCommandRunner};
use super::vmx::{self, VmxFile, DISPLAY_NAME_KEY, MEMORY_SIZE_KEY, NUM_VCPUS_KEY};
use super::{
    CloneType, Host, HostError, HostResult, PowerOffMode, PowerOnMode, PowerState, ToolsState,
    VirtualMachine,
};
use crate::shared::config::{HostType, PluginConfig};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const LIST_HEADER: &str = "Total running VMs:";

struct VmrunContext {
    runner: Arc<dyn CommandRunner>,
    vmrun: PathBuf,
    host_type: HostType,
}

impl VmrunContext {
    /// Run `vmrun -T <type> [-vp <password>] <args...>` and return stdout.
    async fn vmrun(&self, password: Option<&str>, args: &[&str]) -> HostResult<String> {
        let mut full_args = vec!["-T".to_string(), self.host_type.as_flag().to_string()];
        if let Some(password) = password {
            full_args.push("-vp".to_string());
            full_args.push(password.to_string());
        }
        full_args.extend(args.iter().map(ToString::to_string));

        let output = self.runner.run(&self.vmrun, &full_args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            // vmrun reports most errors on stdout as "Error: ...".
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(HostError::CommandFailed {
                command: describe_command(&self.vmrun, &full_args),
                status: output.status.code(),
                stderr: detail,
            });
        }

        Ok(stdout)
    }

    async fn running_vms(&self) -> HostResult<Vec<PathBuf>> {
        let stdout = self.vmrun(None, &["list"]).await?;
        parse_list_output(&stdout)
    }
}

/// Talks to the local VMware Fusion/Workstation install through `vmrun`.
pub struct VmrunHost {
    context: Arc<VmrunContext>,
}

impl VmrunHost {
    pub fn new(config: &PluginConfig) -> Self {
        Self::with_runner(
            Arc::new(TokioCommandRunner::new(config.command_timeout)),
            config.vmrun_path.clone(),
            config.host_type,
        )
    }

    pub fn with_runner(
        runner: Arc<dyn CommandRunner>,
        vmrun: impl Into<PathBuf>,
        host_type: HostType,
    ) -> Self {
        Self {
            context: Arc::new(VmrunContext {
                runner,
                vmrun: vmrun.into(),
                host_type,
            }),
        }
    }
}

#[async_trait]
impl Host for VmrunHost {
    async fn open_vm(
        &self,
        vmx_path: &Path,
        password: Option<&str>,
    ) -> HostResult<Arc<dyn VirtualMachine>> {
        let metadata = tokio::fs::metadata(vmx_path)
            .await
            .map_err(|_| HostError::VmNotFound(vmx_path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(HostError::VmNotFound(vmx_path.display().to_string()));
        }

        Ok(Arc::new(VmrunVm {
            context: Arc::clone(&self.context),
            vmx_path: vmx_path.to_path_buf(),
            password: password.map(ToString::to_string),
        }))
    }

    async fn find_running(&self) -> HostResult<Vec<PathBuf>> {
        self.context.running_vms().await
    }

    async fn disconnect(&self) {
        // vmrun is stateless; there is no session to tear down.
        info!(host_type = self.context.host_type.as_flag(), "Disconnecting from VM host");
    }
}

pub struct VmrunVm {
    context: Arc<VmrunContext>,
    vmx_path: PathBuf,
    password: Option<String>,
}

impl VmrunVm {
    fn path_arg(&self) -> String {
        self.vmx_path.display().to_string()
    }

    async fn vmrun(&self, args: &[&str]) -> HostResult<String> {
        self.context.vmrun(self.password.as_deref(), args).await
    }
}

#[async_trait]
impl VirtualMachine for VmrunVm {
    async fn clone_vm(
        &self,
        clone_type: CloneType,
        destination: &Path,
    ) -> HostResult<Arc<dyn VirtualMachine>> {
        let mode = match clone_type {
            CloneType::Full => "full",
            CloneType::Linked => "linked",
        };
        let clone_name = destination
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| HostError::Parse(format!("bad clone destination {destination:?}")))?;
        let source = self.path_arg();
        let target = destination.display().to_string();
        let name_arg = format!("-cloneName={clone_name}");

        debug!(%source, %target, mode, "Cloning VM");
        self.vmrun(&["clone", &source, &target, mode, &name_arg])
            .await?;

        Ok(Arc::new(VmrunVm {
            context: Arc::clone(&self.context),
            vmx_path: destination.to_path_buf(),
            password: self.password.clone(),
        }))
    }

    async fn set_display_name(&self, name: &str) -> HostResult<()> {
        vmx::update(&self.vmx_path, DISPLAY_NAME_KEY, name).await
    }

    async fn set_memory_size(&self, megabytes: u32) -> HostResult<()> {
        vmx::update(&self.vmx_path, MEMORY_SIZE_KEY, &megabytes.to_string()).await
    }

    async fn set_vcpus(&self, count: u32) -> HostResult<()> {
        vmx::update(&self.vmx_path, NUM_VCPUS_KEY, &count.to_string()).await
    }

    async fn power_on(&self, mode: PowerOnMode) -> HostResult<()> {
        let mode = match mode {
            PowerOnMode::Normal => "nogui",
            PowerOnMode::LaunchGui => "gui",
        };
        self.vmrun(&["start", &self.path_arg(), mode]).await?;
        Ok(())
    }

    async fn power_off(&self, mode: PowerOffMode) -> HostResult<()> {
        let mode = match mode {
            PowerOffMode::Normal => "hard",
            PowerOffMode::FromGuest => "soft",
        };
        self.vmrun(&["stop", &self.path_arg(), mode]).await?;
        Ok(())
    }

    async fn is_running(&self) -> HostResult<bool> {
        let running = self.context.running_vms().await?;
        if running.iter().any(|path| path == &self.vmx_path) {
            return Ok(true);
        }

        // `vmrun list` prints resolved absolute paths.
        let own = resolve_path(&self.vmx_path).await;
        for path in &running {
            if resolve_path(path).await == own {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn power_state(&self) -> HostResult<PowerState> {
        if self.is_running().await? {
            Ok(PowerState::POWERED_ON)
        } else {
            Ok(PowerState::POWERED_OFF)
        }
    }

    async fn tools_state(&self) -> HostResult<ToolsState> {
        let stdout = self.vmrun(&["checkToolsState", &self.path_arg()]).await?;
        Ok(parse_tools_state(&stdout))
    }

    async fn display_name(&self) -> HostResult<String> {
        let vmx = VmxFile::load(&self.vmx_path).await?;
        vmx.get(DISPLAY_NAME_KEY).ok_or_else(|| {
            HostError::Parse(format!("{} has no {DISPLAY_NAME_KEY}", self.path_arg()))
        })
    }

    async fn vmx_path(&self) -> HostResult<PathBuf> {
        Ok(self.vmx_path.clone())
    }
}

/// Canonical form of `path`, or `path` itself when it cannot be resolved.
async fn resolve_path(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Parse `vmrun list`:
///
/// ```text
/// Total running VMs: 2
/// /Users/me/VMs/instance-1/instance-1.vmx
/// /Users/me/VMs/instance-2/instance-2.vmx
/// ```
pub fn parse_list_output(stdout: &str) -> HostResult<Vec<PathBuf>> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

    let header = lines
        .next()
        .ok_or_else(|| HostError::Parse("empty vmrun list output".to_string()))?;
    if !header.starts_with(LIST_HEADER) {
        return Err(HostError::Parse(format!("unexpected list header: {header}")));
    }

    Ok(lines.map(PathBuf::from).collect())
}

pub fn parse_tools_state(stdout: &str) -> ToolsState {
    match stdout.trim().to_ascii_lowercase().as_str() {
        "running" => ToolsState::Running,
        "installed" => ToolsState::Installed,
        "not installed" | "notinstalled" => ToolsState::NotInstalled,
        _ => ToolsState::Unknown,
    }
}
