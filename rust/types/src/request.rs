use crate::identity::PhysicalResourceId;
use crate::properties::{
    ConnectionSpec, DeletionPolicy, ExtensionProperties, PropertyError, RoleGrantProperties,
    SchemaProperties, UserProperties,
};
use pgcfn_error::{ErrorCodes, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Create => f.write_str("Create"),
            RequestType::Update => f.write_str("Update"),
            RequestType::Delete => f.write_str("Delete"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    User,
    Schema,
    Extension,
    RoleGrant,
}

impl ResourceKind {
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "Custom::PostgresDBUser" | "Custom::PostgreSQLUser" => Some(ResourceKind::User),
            "Custom::PostgreSQLSchema" => Some(ResourceKind::Schema),
            "Custom::PostgreSQLExtension" => Some(ResourceKind::Extension),
            "Custom::PostgreSQLRoleGrant" => Some(ResourceKind::RoleGrant),
            _ => None,
        }
    }

    /// Human-readable noun used in reasons ("Failed to create schema, ...").
    pub fn noun(&self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Schema => "schema",
            ResourceKind::Extension => "extension",
            ResourceKind::RoleGrant => "role grant",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// A CloudFormation custom-resource lifecycle event.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceRequest {
    pub request_type: RequestType,
    pub resource_type: String,
    #[serde(default)]
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<PhysicalResourceId>,
    #[serde(default)]
    pub resource_properties: Value,
    #[serde(default)]
    pub old_resource_properties: Option<Value>,
    #[serde(default)]
    pub stack_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(rename = "ResponseURL", default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub service_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unsupported resource type {0:?}")]
    UnsupportedResourceType(String),
}

impl ProviderError for RequestError {
    fn code(&self) -> ErrorCodes {
        match self {
            RequestError::Malformed(_) => ErrorCodes::InvalidArgument,
            RequestError::UnsupportedResourceType(_) => ErrorCodes::Unimplemented,
        }
    }
}

impl ResourceRequest {
    pub fn from_json(json: &str) -> Result<Self, RequestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn kind(&self) -> Result<ResourceKind, RequestError> {
        ResourceKind::from_resource_type(&self.resource_type)
            .ok_or_else(|| RequestError::UnsupportedResourceType(self.resource_type.clone()))
    }

    /// The physical id to report when this request fails: the sentinel for
    /// Create, the prior id otherwise.
    pub fn failure_physical_id(&self) -> PhysicalResourceId {
        match (self.request_type, &self.physical_resource_id) {
            (RequestType::Create, _) | (_, None) => PhysicalResourceId::could_not_create(),
            (_, Some(prior)) => prior.clone(),
        }
    }
}

/// Desired state of one resource, validated and tagged by kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceSpec {
    User(UserProperties),
    Schema(SchemaProperties),
    Extension(ExtensionProperties),
    RoleGrant(RoleGrantProperties),
}

impl ResourceSpec {
    pub fn parse(kind: ResourceKind, properties: &Value) -> Result<Self, PropertyError> {
        Ok(match kind {
            ResourceKind::User => ResourceSpec::User(UserProperties::parse(properties)?),
            ResourceKind::Schema => ResourceSpec::Schema(SchemaProperties::parse(properties)?),
            ResourceKind::Extension => {
                ResourceSpec::Extension(ExtensionProperties::parse(properties)?)
            }
            ResourceKind::RoleGrant => {
                ResourceSpec::RoleGrant(RoleGrantProperties::parse(properties)?)
            }
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::User(_) => ResourceKind::User,
            ResourceSpec::Schema(_) => ResourceKind::Schema,
            ResourceSpec::Extension(_) => ResourceKind::Extension,
            ResourceSpec::RoleGrant(_) => ResourceKind::RoleGrant,
        }
    }

    pub fn connection(&self) -> &ConnectionSpec {
        match self {
            ResourceSpec::User(props) => &props.database,
            ResourceSpec::Schema(props) => &props.database,
            ResourceSpec::Extension(props) => &props.database,
            ResourceSpec::RoleGrant(props) => &props.database,
        }
    }

    pub fn deletion_policy(&self) -> DeletionPolicy {
        match self {
            ResourceSpec::User(props) => props.deletion_policy,
            ResourceSpec::Schema(props) => props.deletion_policy,
            ResourceSpec::Extension(props) => props.deletion_policy,
            ResourceSpec::RoleGrant(props) => props.deletion_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_update_event() {
        let request = ResourceRequest::from_json(
            &json!({
                "RequestType": "Update",
                "ResponseURL": "https://example.com/response",
                "StackId": "arn:aws:cloudformation:eu-west-1:123456789012:stack/s/guid",
                "RequestId": "request-1",
                "ResourceType": "Custom::PostgreSQLSchema",
                "LogicalResourceId": "AppSchema",
                "PhysicalResourceId": "AppSchema",
                "ResourceProperties": {"Schema": "app"},
                "OldResourceProperties": {"Schema": "old_app"},
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(request.request_type, RequestType::Update);
        assert_eq!(request.kind().unwrap(), ResourceKind::Schema);
        assert_eq!(request.physical_resource_id.as_ref().unwrap(), "AppSchema");
        assert_eq!(request.response_url.as_deref(), Some("https://example.com/response"));
        assert_eq!(
            request.old_resource_properties,
            Some(json!({"Schema": "old_app"}))
        );
        assert_eq!(request.failure_physical_id(), "AppSchema");
    }

    #[test]
    fn test_resource_type_tags() {
        assert_eq!(
            ResourceKind::from_resource_type("Custom::PostgresDBUser"),
            Some(ResourceKind::User)
        );
        assert_eq!(
            ResourceKind::from_resource_type("Custom::PostgreSQLRoleGrant"),
            Some(ResourceKind::RoleGrant)
        );
        assert_eq!(ResourceKind::from_resource_type("Custom::MySQLUser"), None);
    }

    #[test]
    fn test_unsupported_resource_type() {
        let request = ResourceRequest::from_json(
            &json!({"RequestType": "Create", "ResourceType": "Custom::Other"}).to_string(),
        )
        .unwrap();
        let err = request.kind().unwrap_err();
        assert_eq!(err.code(), ErrorCodes::Unimplemented);
        assert_eq!(request.failure_physical_id(), "could-not-create");
    }

    #[test]
    fn test_malformed_request_type() {
        let err = ResourceRequest::from_json(
            &json!({"RequestType": "Replace", "ResourceType": "Custom::PostgreSQLSchema"})
                .to_string(),
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCodes::InvalidArgument);
    }
}
