use crate::shared::error::{PluginError, PluginResult};
use crate::shared::types::InstanceSpec;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sidecar file name, placed next to each instance's `.vmx`.
pub const SPEC_FILE_NAME: &str = "infrakit.spec";

/// Storage for the orchestrator spec of each instance.
///
/// The whole spec goes into a sidecar file rather than a `.vmx` annotation:
/// special characters in an annotation can corrupt the definition file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpecRepository: Send + Sync {
    /// Persist `spec` next to the VM defined at `vmx_path`.
    async fn write(&self, vmx_path: &Path, spec: &InstanceSpec) -> PluginResult<()>;

    /// Load the spec stored next to the VM defined at `vmx_path`.
    async fn read(&self, vmx_path: &Path) -> PluginResult<InstanceSpec>;
}

pub fn spec_path(vmx_path: &Path) -> PathBuf {
    vmx_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(SPEC_FILE_NAME)
}

/// JSON sidecar files. Each file is written once at creation and only read
/// afterwards, so no locking is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSpecRepository;

impl FileSpecRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SpecRepository for FileSpecRepository {
    async fn write(&self, vmx_path: &Path, spec: &InstanceSpec) -> PluginResult<()> {
        let path = spec_path(vmx_path);
        let buf = serde_json::to_vec(spec)
            .map_err(|e| PluginError::SidecarWriteError(format!("{}: {e}", path.display())))?;

        tokio::fs::write(&path, buf)
            .await
            .map_err(|e| PluginError::SidecarWriteError(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), "Written spec");
        Ok(())
    }

    async fn read(&self, vmx_path: &Path) -> PluginResult<InstanceSpec> {
        let path = spec_path(vmx_path);
        let buf = tokio::fs::read(&path)
            .await
            .map_err(|e| PluginError::SidecarReadError(format!("{}: {e}", path.display())))?;

        serde_json::from_slice(&buf)
            .map_err(|e| PluginError::SidecarReadError(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn vmx_in(dir: &Path) -> PathBuf {
        dir.join("instance-1.vmx")
    }

    #[test]
    fn test_spec_path_is_next_to_vmx() {
        let path = spec_path(Path::new("/vms/instance-1/instance-1.vmx"));
        assert_eq!(path, PathBuf::from("/vms/instance-1/infrakit.spec"));
    }

    #[tokio::test]
    async fn test_write_then_read_keeps_tags_and_logical_id() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSpecRepository::new();
        let spec = InstanceSpec::new(json!({"VMX": "base", "MemorySizeMBs": 1024}))
            .with_tags(HashMap::from([
                ("env".to_string(), "test".to_string()),
                ("role".to_string(), "db".to_string()),
            ]))
            .with_logical_id("db-0");

        repo.write(&vmx_in(dir.path()), &spec).await.unwrap();
        let loaded = repo.read(&vmx_in(dir.path())).await.unwrap();

        assert_eq!(loaded.tags, spec.tags);
        assert_eq!(loaded.logical_id.as_deref(), Some("db-0"));
        assert_eq!(loaded, spec);
    }

    #[tokio::test]
    async fn test_sidecar_uses_envelope_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSpecRepository::new();
        let spec = InstanceSpec::new(json!({"VMX": "base"})).with_logical_id("web-1");

        repo.write(&vmx_in(dir.path()), &spec).await.unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join(SPEC_FILE_NAME))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["LogicalID"], "web-1");
        assert_eq!(value["Properties"]["VMX"], "base");
    }

    #[tokio::test]
    async fn test_read_missing_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSpecRepository::new().read(&vmx_in(dir.path())).await;
        assert!(matches!(result, Err(PluginError::SidecarReadError(_))));
    }

    #[tokio::test]
    async fn test_read_corrupt_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(SPEC_FILE_NAME), b"{not json")
            .await
            .unwrap();
        let result = FileSpecRepository::new().read(&vmx_in(dir.path())).await;
        assert!(matches!(result, Err(PluginError::SidecarReadError(_))));
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let vmx = dir.path().join("gone").join("instance-1.vmx");
        let result = FileSpecRepository::new()
            .write(&vmx, &InstanceSpec::default())
            .await;
        assert!(matches!(result, Err(PluginError::SidecarWriteError(_))));
    }
}
