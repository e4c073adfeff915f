use crate::properties::{RoleGrantProperties, UserProperties};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical id reported when a Create failed before anything existed.
/// CloudFormation replays Delete against it when rolling back.
pub const COULD_NOT_CREATE: &str = "could-not-create";

/// The opaque handle CloudFormation stores for a resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalResourceId(String);

impl PhysicalResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        PhysicalResourceId(id.into())
    }

    pub fn could_not_create() -> Self {
        PhysicalResourceId(COULD_NOT_CREATE.to_string())
    }

    pub fn is_could_not_create(&self) -> bool {
        self.0 == COULD_NOT_CREATE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhysicalResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for PhysicalResourceId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PhysicalResourceId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// `postgresql:<host>:<port>:<dbname>:<user>:<owned database>`
///
/// The last segment is the user name again when a same-named database is
/// provisioned and empty otherwise, so toggling `WithDatabase` yields a
/// different resource.
pub fn user_identity(props: &UserProperties) -> PhysicalResourceId {
    let owned_database = if props.with_database {
        props.user.as_str()
    } else {
        ""
    };
    PhysicalResourceId(format!(
        "postgresql:{}:{}:{}:{}:{}",
        props.database.host, props.database.port, props.database.dbname, props.user, owned_database
    ))
}

/// `grant:<database>:<role>:<grantee>`
pub fn role_grant_identity(props: &RoleGrantProperties) -> PhysicalResourceId {
    PhysicalResourceId(format!(
        "grant:{}:{}:{}",
        props.database.dbname, props.role, props.grantee
    ))
}

/// Schemas and extensions can be renamed in place, so their identity is the
/// stack-scoped logical id rather than anything derived from the name.
pub fn logical_identity(logical_resource_id: &str) -> PhysicalResourceId {
    PhysicalResourceId(logical_resource_id.to_string())
}
