use crate::features::cleanup::CleanupQueue;
use crate::features::host::{CloneType, Host, PowerOffMode, PowerOnMode, ToolsState, VirtualMachine};
use crate::features::power::PowerStatePoller;
use crate::features::spec_store::repo::SpecRepository;
use crate::shared::error::{PluginError, PluginResult};
use crate::shared::types::{CreateInstanceRequest, Description, InstanceId, InstanceSpec};
use fusion_core::tags_match;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where templates are read from and instances are written to.
#[derive(Debug, Clone)]
pub struct InstanceLayout {
    pub vm_dir: PathBuf,
    pub vm_lib: PathBuf,
}

impl InstanceLayout {
    pub fn new(vm_dir: impl Into<PathBuf>, vm_lib: impl Into<PathBuf>) -> Self {
        Self {
            vm_dir: vm_dir.into(),
            vm_lib: vm_lib.into(),
        }
    }

    /// `${vm_lib}/${vmx}.vmwarevm/${vmx}.vmx`
    pub fn template_path(&self, vmx: &str) -> PathBuf {
        self.vm_lib
            .join(format!("{vmx}.vmwarevm"))
            .join(format!("{vmx}.vmx"))
    }

    pub fn instance_dir(&self, id: &InstanceId) -> PathBuf {
        self.vm_dir.join(id.as_str())
    }

    /// `${vm_dir}/${id}/${id}.vmx`
    pub fn instance_vmx(&self, id: &InstanceId) -> PathBuf {
        self.instance_dir(id).join(format!("{id}.vmx"))
    }
}

/// Service for provisioning, destroying and describing VM instances.
///
/// Holds no instance table: every query re-derives state from the host's
/// running VMs joined with their spec sidecars.
pub struct InstanceService {
    host: Arc<dyn Host>,
    specs: Arc<dyn SpecRepository>,
    cleanup: CleanupQueue,
    poller: PowerStatePoller,
    layout: InstanceLayout,
    vm_password: Option<String>,
}

impl InstanceService {
    pub fn new(
        host: Arc<dyn Host>,
        specs: Arc<dyn SpecRepository>,
        cleanup: CleanupQueue,
        poller: PowerStatePoller,
        layout: InstanceLayout,
    ) -> Self {
        Self {
            host,
            specs,
            cleanup,
            poller,
            layout,
            vm_password: None,
        }
    }

    pub fn with_vm_password(mut self, password: Option<String>) -> Self {
        self.vm_password = password;
        self
    }

    pub fn layout(&self) -> &InstanceLayout {
        &self.layout
    }

    /// Decode and check provisioning properties without touching the host.
    pub fn validate(properties: &serde_json::Value) -> PluginResult<CreateInstanceRequest> {
        let request = CreateInstanceRequest::from_properties(properties)?;

        if request.vmx.trim().is_empty() {
            return Err(PluginError::ValidationError(
                "VMX template name cannot be empty".to_string(),
            ));
        }
        if request.vmx.contains(['/', '\\']) || request.vmx == "." || request.vmx == ".." {
            return Err(PluginError::ValidationError(format!(
                "VMX template name must be a single path component: {}",
                request.vmx
            )));
        }

        Ok(request)
    }

    /// Clone a template into a new instance and power it on.
    ///
    /// Order matters: clone, write the sidecar, configure, power on. A failed
    /// sidecar write therefore never leaves a running VM behind. Nothing is
    /// rolled back on failure; the caller should treat the instance as
    /// possibly partially created.
    pub async fn provision(&self, spec: InstanceSpec) -> PluginResult<InstanceId> {
        let properties = spec
            .properties
            .as_ref()
            .ok_or_else(|| PluginError::ValidationError("Properties must be set".to_string()))?;
        let request = Self::validate(properties)?;

        let template_path = self.layout.template_path(&request.vmx);
        debug!(template = %template_path.display(), "Using VMX template");
        if !tokio::fs::try_exists(&template_path).await.unwrap_or(false) {
            return Err(PluginError::TemplateNotFound(
                template_path.display().to_string(),
            ));
        }
        let source = self
            .host
            .open_vm(&template_path, self.vm_password.as_deref())
            .await?;

        let instance_id = InstanceId::generate();
        let instance_dir = self.layout.instance_dir(&instance_id);
        // `create_dir` fails atomically if a same-second provision got here first.
        tokio::fs::create_dir(&instance_dir)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    PluginError::InstanceExists(instance_id.to_string())
                }
                _ => PluginError::StorageError(format!("{}: {e}", instance_dir.display())),
            })?;
        let vmx_path = self.layout.instance_vmx(&instance_id);

        info!(instance_id = %instance_id, path = %vmx_path.display(), "Cloning template");
        let clone = source.clone_vm(CloneType::Full, &vmx_path).await?;

        self.specs.write(&vmx_path, &spec).await?;

        clone.set_display_name(instance_id.as_str()).await?;
        clone.set_memory_size(request.memory_size_mbs).await?;
        clone.set_vcpus(request.num_cpus).await?;

        let mode = if request.launch_gui {
            PowerOnMode::LaunchGui
        } else {
            PowerOnMode::Normal
        };
        info!(instance_id = %instance_id, ?mode, "Powering up");
        clone.power_on(mode).await.map_err(|e| {
            PluginError::PowerTransitionError(format!("power on {instance_id}: {e}"))
        })?;
        self.poller.wait_powered_on(clone.as_ref()).await?;

        info!(instance_id = %instance_id, "Instance provisioned successfully");
        Ok(instance_id)
    }

    /// Stop every running VM whose display name is `instance_id`.
    ///
    /// Unknown or already stopped instances are a no-op. Per-VM failures are
    /// logged and do not stop the remaining matches; only a failed host
    /// enumeration is returned.
    pub async fn destroy(&self, instance_id: &InstanceId) -> PluginResult<()> {
        let matches = self.find_running_named(instance_id).await?;
        if matches.is_empty() {
            debug!(instance_id = %instance_id, "No running VM to destroy");
            return Ok(());
        }

        for vm in matches {
            match self.stop_vm(vm.as_ref()).await {
                Ok(()) => info!(instance_id = %instance_id, "Destroyed VM"),
                Err(error) => {
                    warn!(instance_id = %instance_id, error = %error, "Destroy VM failed")
                }
            }
        }

        Ok(())
    }

    /// Describe running instances whose sidecar tags match `tags`.
    ///
    /// An empty filter matches all. A non-empty filter matches when any one
    /// key/value pair agrees. VMs without a readable sidecar are skipped.
    pub async fn describe_instances(
        &self,
        tags: &HashMap<String, String>,
    ) -> PluginResult<Vec<Description>> {
        let mut result = Vec::new();

        for vm in self.open_running().await? {
            let display_name = match vm.display_name().await {
                Ok(name) => name,
                Err(error) => {
                    warn!(error = %error, "Failed to get display name");
                    continue;
                }
            };
            let vmx_path = match vm.vmx_path().await {
                Ok(path) => path,
                Err(error) => {
                    warn!(display_name = %display_name, error = %error, "Failed to get VMX path");
                    continue;
                }
            };

            debug!(display_name = %display_name, path = %vmx_path.display(), "Checking VM");

            let spec = match self.specs.read(&vmx_path).await {
                Ok(spec) => spec,
                Err(error) => {
                    warn!(path = %vmx_path.display(), error = %error, "Skipping VM without readable spec");
                    continue;
                }
            };

            if tags_match(tags, &spec.tags) {
                result.push(Description {
                    id: InstanceId::new(display_name),
                    logical_id: spec.logical_id,
                    tags: spec.tags,
                });
            }
        }

        Ok(result)
    }

    async fn open_running(&self) -> PluginResult<Vec<Arc<dyn VirtualMachine>>> {
        let paths = self.host.find_running().await?;

        let mut vms = Vec::with_capacity(paths.len());
        for path in paths {
            match self
                .host
                .open_vm(&path, self.vm_password.as_deref())
                .await
            {
                Ok(vm) => vms.push(vm),
                Err(error) => {
                    debug!(path = %path.display(), error = %error, "Skipping VM that failed to open")
                }
            }
        }
        Ok(vms)
    }

    async fn find_running_named(
        &self,
        instance_id: &InstanceId,
    ) -> PluginResult<Vec<Arc<dyn VirtualMachine>>> {
        let mut matches = Vec::new();
        for vm in self.open_running().await? {
            if let Ok(name) = vm.display_name().await {
                if name == instance_id.as_str() {
                    matches.push(vm);
                }
            }
        }
        Ok(matches)
    }

    async fn stop_vm(&self, vm: &dyn VirtualMachine) -> PluginResult<()> {
        let mode = match vm.tools_state().await {
            Ok(ToolsState::Running) => PowerOffMode::FromGuest,
            _ => PowerOffMode::Normal,
        };

        vm.power_off(mode)
            .await
            .map_err(|e| PluginError::PowerTransitionError(format!("power off: {e}")))?;

        let vmx_path = vm.vmx_path().await?;
        self.cleanup.enqueue(vmx_path).await?;

        self.poller.wait_powered_off(vm).await
    }
}
