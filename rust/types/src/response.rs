use crate::identity::PhysicalResourceId;
use crate::request::ResourceRequest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Failed,
}

/// The response CloudFormation expects for every lifecycle event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReconciliationResult {
    pub status: Status,
    pub reason: String,
    pub physical_resource_id: PhysicalResourceId,
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_resource_id: Option<String>,
}

impl ReconciliationResult {
    pub fn success(physical_resource_id: PhysicalResourceId, reason: impl Into<String>) -> Self {
        Self::new(Status::Success, physical_resource_id, reason.into())
    }

    pub fn failed(physical_resource_id: PhysicalResourceId, reason: impl Into<String>) -> Self {
        Self::new(Status::Failed, physical_resource_id, reason.into())
    }

    fn new(status: Status, physical_resource_id: PhysicalResourceId, reason: String) -> Self {
        ReconciliationResult {
            status,
            reason,
            physical_resource_id,
            data: Map::new(),
            stack_id: None,
            request_id: None,
            logical_resource_id: None,
        }
    }

    /// Copies the correlation fields CloudFormation matches responses on.
    pub fn for_request(mut self, request: &ResourceRequest) -> Self {
        self.stack_id = request.stack_id.clone();
        self.request_id = request.request_id.clone();
        if !request.logical_resource_id.is_empty() {
            self.logical_resource_id = Some(request.logical_resource_id.clone());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
