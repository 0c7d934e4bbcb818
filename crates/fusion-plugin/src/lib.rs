pub mod features;
pub mod shared;

use crate::features::cleanup::{CleanupQueue, CleanupWorker};
use crate::features::host::Host;
use crate::features::instance_management::controller::InstanceController;
use crate::features::instance_management::service::{InstanceLayout, InstanceService};
use crate::features::power::PowerStatePoller;
use crate::features::spec_store::repo::FileSpecRepository;
use crate::shared::config::PluginConfig;
use crate::shared::error::{PluginError, PluginResult};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running instance plugin: the lifecycle controller plus the background
/// cleanup worker it feeds.
pub struct FusionPlugin {
    controller: Arc<InstanceController>,
    host: Arc<dyn Host>,
    cleanup: CleanupQueue,
    worker: JoinHandle<()>,
}

impl FusionPlugin {
    /// Create the instance directory if needed, start the cleanup worker and
    /// wire the lifecycle service against `host`.
    pub async fn start(mut config: PluginConfig, host: Arc<dyn Host>) -> PluginResult<Self> {
        tokio::fs::create_dir_all(&config.vm_dir)
            .await
            .map_err(|e| PluginError::StorageError(format!("{}: {e}", config.vm_dir.display())))?;
        // Instance paths are compared against the absolute paths the host reports.
        config.vm_dir = tokio::fs::canonicalize(&config.vm_dir)
            .await
            .map_err(|e| PluginError::StorageError(format!("{}: {e}", config.vm_dir.display())))?;
        if let Ok(vm_lib) = tokio::fs::canonicalize(&config.vm_lib).await {
            config.vm_lib = vm_lib;
        }

        let (cleanup, receiver) = CleanupQueue::bounded(config.cleanup_queue_capacity);
        let worker = CleanupWorker::spawn(receiver, config.vm_dir.clone());

        let service = InstanceService::new(
            host.clone(),
            Arc::new(FileSpecRepository::new()),
            cleanup.clone(),
            PowerStatePoller::new(config.poll_interval, config.power_timeout),
            InstanceLayout::new(config.vm_dir.clone(), config.vm_lib.clone()),
        )
        .with_vm_password(config.vm_password.clone());

        info!(
            vm_dir = %config.vm_dir.display(),
            vm_lib = %config.vm_lib.display(),
            "Instance plugin started"
        );

        Ok(Self {
            controller: Arc::new(InstanceController::new(Arc::new(service))),
            host,
            cleanup,
            worker,
        })
    }

    pub fn controller(&self) -> Arc<InstanceController> {
        self.controller.clone()
    }

    /// Stop accepting cleanup work, let the worker drain what is queued and
    /// release the host connection.
    pub async fn shutdown(self) {
        self.cleanup.close();
        if let Err(error) = self.worker.await {
            warn!(error = %error, "Cleanup worker ended abnormally");
        }
        self.host.disconnect().await;
        info!("Instance plugin stopped");
    }
}
