pub use fusion_core::{CreateInstanceRequest, Description, InstanceId, InstanceSpec};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to provision a new instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    #[serde(rename = "Spec")]
    pub spec: InstanceSpec,
}

/// Request to destroy an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyRequest {
    #[serde(rename = "Instance")]
    pub instance_id: InstanceId,
}

/// Request to describe running instances, filtered by tags
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescribeRequest {
    #[serde(rename = "Tags", default)]
    pub tags: HashMap<String, String>,
}
