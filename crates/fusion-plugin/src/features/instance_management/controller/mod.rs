use crate::features::instance_management::service::InstanceService;
use crate::shared::types::{
    CreateInstanceRequest, DescribeRequest, Description, DestroyRequest, InstanceId,
    ProvisionRequest,
};
use fusion_core::ErrorResponse;
use std::sync::Arc;
use tracing::info;

/// Controller for the instance plugin operations
pub struct InstanceController {
    service: Arc<InstanceService>,
}

impl InstanceController {
    pub fn new(service: Arc<InstanceService>) -> Self {
        Self { service }
    }

    /// Handle validate request
    pub fn validate(
        &self,
        properties: &serde_json::Value,
    ) -> Result<CreateInstanceRequest, ErrorResponse> {
        info!("Received validate request");

        InstanceService::validate(properties).map_err(|e| e.into())
    }

    /// Handle provision request
    /// Thin wrapper that delegates to service
    pub async fn provision(&self, request: ProvisionRequest) -> Result<InstanceId, ErrorResponse> {
        info!(logical_id = ?request.spec.logical_id, "Received provision request");

        self.service
            .provision(request.spec)
            .await
            .map_err(|e| e.into())
    }

    /// Handle destroy request
    pub async fn destroy(&self, request: DestroyRequest) -> Result<(), ErrorResponse> {
        info!(instance_id = %request.instance_id, "Received destroy request");

        self.service
            .destroy(&request.instance_id)
            .await
            .map_err(|e| e.into())
    }

    /// Handle describe instances request
    pub async fn describe_instances(
        &self,
        request: DescribeRequest,
    ) -> Result<Vec<Description>, ErrorResponse> {
        info!(tags = ?request.tags, "Received describe instances request");

        self.service
            .describe_instances(&request.tags)
            .await
            .map_err(|e| e.into())
    }
}
