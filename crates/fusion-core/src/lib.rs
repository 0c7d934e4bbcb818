pub mod tags;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub use tags::tags_match;

/// Name prefix shared by every instance identity.
pub const INSTANCE_ID_PREFIX: &str = "instance-";

pub const DEFAULT_MEMORY_SIZE_MBS: u32 = 512;
pub const DEFAULT_NUM_CPUS: u32 = 1;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Invalid properties: {0}")]
    InvalidProperties(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Identity of a provisioned instance.
///
/// Doubles as the VM display name and as the name of the directory holding
/// the cloned `.vmx`. It is assigned once at provision time and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Second-resolution identity. Two calls within the same second collide.
    pub fn from_timestamp(unix_seconds: i64) -> Self {
        Self(format!("{INSTANCE_ID_PREFIX}{unix_seconds}"))
    }

    pub fn generate() -> Self {
        Self::from_timestamp(Utc::now().timestamp())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Generic instance specification as supplied by the orchestrator.
///
/// This envelope is what gets persisted in the sidecar file, so its field
/// names must stay stable across releases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    #[serde(rename = "Properties", default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
    #[serde(rename = "Tags", default)]
    pub tags: HashMap<String, String>,
    #[serde(rename = "Init", default, skip_serializing_if = "String::is_empty")]
    pub init: String,
    #[serde(rename = "LogicalID", default, skip_serializing_if = "Option::is_none")]
    pub logical_id: Option<String>,
    #[serde(rename = "Attachments", default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl InstanceSpec {
    pub fn new(properties: serde_json::Value) -> Self {
        Self {
            properties: Some(properties),
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_logical_id(mut self, logical_id: impl Into<String>) -> Self {
        self.logical_id = Some(logical_id.into());
        self
    }
}

/// Concrete provisioning request decoded from `InstanceSpec::properties`.
///
/// Unknown keys are ignored so that newer orchestrators can send extra fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateInstanceRequest {
    #[serde(rename = "Tags")]
    pub tags: HashMap<String, String>,

    /// Short template name; the `.vmx` lives at
    /// `${vm_lib}/${vmx}.vmwarevm/${vmx}.vmx`.
    #[serde(rename = "VMX")]
    pub vmx: String,

    #[serde(rename = "MemorySizeMBs")]
    pub memory_size_mbs: u32,
    #[serde(rename = "NumCPUs")]
    pub num_cpus: u32,
    #[serde(rename = "LaunchGUI")]
    pub launch_gui: bool,
}

impl Default for CreateInstanceRequest {
    fn default() -> Self {
        Self {
            tags: HashMap::new(),
            vmx: String::new(),
            memory_size_mbs: DEFAULT_MEMORY_SIZE_MBS,
            num_cpus: DEFAULT_NUM_CPUS,
            launch_gui: false,
        }
    }
}

impl CreateInstanceRequest {
    /// Decode a request from raw properties, applying defaults for missing
    /// or zero memory/cpu values.
    pub fn from_properties(properties: &serde_json::Value) -> Result<Self> {
        let mut request: Self = serde_json::from_value(properties.clone())
            .map_err(|e| CoreError::InvalidProperties(e.to_string()))?;

        if request.memory_size_mbs == 0 {
            request.memory_size_mbs = DEFAULT_MEMORY_SIZE_MBS;
        }
        if request.num_cpus == 0 {
            request.num_cpus = DEFAULT_NUM_CPUS;
        }

        Ok(request)
    }
}

/// What `DescribeInstances` reports for each matching VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "ID")]
    pub id: InstanceId,
    #[serde(rename = "LogicalID", default, skip_serializing_if = "Option::is_none")]
    pub logical_id: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}
