//! Fire-and-forget removal of destroyed instances' on-disk state.
//!
//! Destroy hands the `.vmx` path of a stopped VM to a bounded queue. A single
//! worker moves the instance directory under `{vm_dir}/.trash/` so the data
//! stays recoverable. Producers only ever wait for queue capacity, never for
//! the move itself.

use crate::shared::error::{PluginError, PluginResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const TRASH_DIR: &str = ".trash";

/// Producer side of the cleanup queue. Cheap to clone.
#[derive(Clone)]
pub struct CleanupQueue {
    sender: Arc<Mutex<Option<mpsc::Sender<PathBuf>>>>,
}

impl CleanupQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<PathBuf>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Arc::new(Mutex::new(Some(sender))),
            },
            receiver,
        )
    }

    /// Queue a `.vmx` path for trashing. Waits while the queue is full; never
    /// drops the request.
    pub async fn enqueue(&self, vmx_path: PathBuf) -> PluginResult<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| PluginError::CleanupError("Lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| PluginError::CleanupError("cleanup queue is closed".to_string()))?;

        sender
            .send(vmx_path)
            .await
            .map_err(|e| PluginError::CleanupError(format!("cleanup worker is gone: {}", e.0.display())))
    }

    /// Close the queue. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        match self.sender.lock() {
            Ok(mut sender) => sender.take().is_some(),
            Err(_) => false,
        }
    }
}

pub struct CleanupWorker;

impl CleanupWorker {
    /// Start the single worker task. It runs until the queue is closed and
    /// drained.
    pub fn spawn(mut receiver: mpsc::Receiver<PathBuf>, vm_dir: PathBuf) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(vmx_path) = receiver.recv().await {
                match trash_instance_dir(&vm_dir, &vmx_path).await {
                    Ok(destination) => debug!(
                        from = %vmx_path.display(),
                        to = %destination.display(),
                        "Moved instance to trash"
                    ),
                    Err(error) => warn!(
                        vmx_path = %vmx_path.display(),
                        error = %error,
                        "Failed to clean up instance directory"
                    ),
                }
            }
            info!("Cleanup worker stopped");
        })
    }
}

/// Move the directory containing `vmx_path` to `{vm_dir}/.trash/<name>`.
pub async fn trash_instance_dir(vm_dir: &Path, vmx_path: &Path) -> PluginResult<PathBuf> {
    let trash_dir = vm_dir.join(TRASH_DIR);
    tokio::fs::create_dir_all(&trash_dir)
        .await
        .map_err(|e| PluginError::CleanupError(format!("{}: {e}", trash_dir.display())))?;

    let instance_dir = vmx_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| {
            PluginError::CleanupError(format!("{} has no parent directory", vmx_path.display()))
        })?;
    let name = instance_dir.file_name().ok_or_else(|| {
        PluginError::CleanupError(format!("{} has no directory name", instance_dir.display()))
    })?;
    let destination = trash_dir.join(name);

    tokio::fs::rename(instance_dir, &destination)
        .await
        .map_err(|e| {
            PluginError::CleanupError(format!(
                "rename {} -> {}: {e}",
                instance_dir.display(),
                destination.display()
            ))
        })?;

    Ok(destination)
}
