use crate::features::host::HostError;
use thiserror::Error;

/// Plugin specific errors
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
    #[error("Host error: {0}")]
    HostConnectionError(String),
    #[error("Instance already exists: {0}")]
    InstanceExists(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Failed to write spec sidecar: {0}")]
    SidecarWriteError(String),
    #[error("Failed to read spec sidecar: {0}")]
    SidecarReadError(String),
    #[error("Power transition failed: {0}")]
    PowerTransitionError(String),
    #[error("Cleanup error: {0}")]
    CleanupError(String),
}

impl From<PluginError> for fusion_core::ErrorResponse {
    fn from(err: PluginError) -> Self {
        let (code, message) = match &err {
            PluginError::ValidationError(msg) => ("VALIDATION_ERROR", msg.clone()),
            PluginError::TemplateNotFound(msg) => ("TEMPLATE_NOT_FOUND", msg.clone()),
            PluginError::HostConnectionError(msg) => ("HOST_CONNECTION_ERROR", msg.clone()),
            PluginError::InstanceExists(msg) => ("INSTANCE_EXISTS", msg.clone()),
            PluginError::StorageError(msg) => ("STORAGE_ERROR", msg.clone()),
            PluginError::SidecarWriteError(msg) => ("SIDECAR_WRITE_ERROR", msg.clone()),
            PluginError::SidecarReadError(msg) => ("SIDECAR_READ_ERROR", msg.clone()),
            PluginError::PowerTransitionError(msg) => ("POWER_TRANSITION_ERROR", msg.clone()),
            PluginError::CleanupError(msg) => ("CLEANUP_ERROR", msg.clone()),
        };

        fusion_core::ErrorResponse::new(code, message)
    }
}

impl From<fusion_core::CoreError> for PluginError {
    fn from(err: fusion_core::CoreError) -> Self {
        PluginError::ValidationError(err.to_string())
    }
}

impl From<HostError> for PluginError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::VmNotFound(path) => PluginError::TemplateNotFound(path),
            other => PluginError::HostConnectionError(other.to_string()),
        }
    }
}

pub type PluginResult<T> = std::result::Result<T, PluginError>;
