//! Boundary to the hypervisor.
//!
//! Everything the lifecycle manager needs from VMware goes through [`Host`]
//! and [`VirtualMachine`]. The production implementation shells out to
//! `vmrun` (see [`vmrun::VmrunHost`]); tests use an in-memory fake.

pub mod command;
#[cfg(test)]
pub(crate) mod fake;
pub mod vmrun;
pub mod vmx;

use async_trait::async_trait;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to run {command}: {reason}")]
    Spawn { command: String, reason: String },
    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("{command} failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("VM not found: {0}")]
    VmNotFound(String),
    #[error("Unexpected host output: {0}")]
    Parse(String),
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl HostError {
    pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
        HostError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// VM power state bitmask, bit-compatible with VIX `VIX_POWERSTATE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerState(u32);

impl PowerState {
    pub const POWERING_OFF: Self = Self(0x0001);
    pub const POWERED_OFF: Self = Self(0x0002);
    pub const POWERING_ON: Self = Self(0x0004);
    pub const POWERED_ON: Self = Self(0x0008);
    pub const SUSPENDING: Self = Self(0x0010);
    pub const SUSPENDED: Self = Self(0x0020);
    pub const TOOLS_RUNNING: Self = Self(0x0040);
    pub const RESETTING: Self = Self(0x0080);
    pub const BLOCKED_ON_MSG: Self = Self(0x0100);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True when any bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for PowerState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolsState {
    #[default]
    Unknown,
    Running,
    Installed,
    NotInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOnMode {
    /// Headless.
    Normal,
    LaunchGui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOffMode {
    /// Hard power off.
    Normal,
    /// Ask the guest OS to shut down; needs running guest tools.
    FromGuest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneType {
    /// Independent copy of every disk.
    Full,
    Linked,
}

/// Handle to the hypervisor, opened once per process.
#[async_trait]
pub trait Host: Send + Sync {
    /// Open the VM defined by `vmx_path`.
    async fn open_vm(
        &self,
        vmx_path: &Path,
        password: Option<&str>,
    ) -> HostResult<Arc<dyn VirtualMachine>>;

    /// Definition paths of all VMs currently running on this host.
    async fn find_running(&self) -> HostResult<Vec<PathBuf>>;

    async fn disconnect(&self);
}

#[async_trait]
pub trait VirtualMachine: Send + Sync {
    async fn clone_vm(
        &self,
        clone_type: CloneType,
        destination: &Path,
    ) -> HostResult<Arc<dyn VirtualMachine>>;

    async fn set_display_name(&self, name: &str) -> HostResult<()>;

    async fn set_memory_size(&self, megabytes: u32) -> HostResult<()>;

    async fn set_vcpus(&self, count: u32) -> HostResult<()>;

    async fn power_on(&self, mode: PowerOnMode) -> HostResult<()>;

    async fn power_off(&self, mode: PowerOffMode) -> HostResult<()>;

    async fn is_running(&self) -> HostResult<bool>;

    async fn power_state(&self) -> HostResult<PowerState>;

    async fn tools_state(&self) -> HostResult<ToolsState>;

    async fn display_name(&self) -> HostResult<String>;

    async fn vmx_path(&self) -> HostResult<PathBuf>;
}
