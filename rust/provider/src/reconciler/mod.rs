mod extension;
mod role_grant;
mod schema;
mod user;

pub use extension::ExtensionReconciler;
pub use role_grant::RoleGrantReconciler;
pub use schema::SchemaReconciler;
pub use user::UserReconciler;

use crate::connection::ConnectionResolver;
use crate::secrets::SecretError;
use crate::session::{CatalogLookup, DdlError, Session, Statement};
use pgcfn_error::{ErrorCodes, ProviderError};
use pgcfn_types::{
    ConnectionSpec, Identifier, PhysicalResourceId, PropertyError, RequestType, ResourceRequest,
    ResourceSpec,
};
use thiserror::Error;

/// What a successful invocation reports back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub physical_id: PhysicalResourceId,
    pub reason: String,
}

impl Outcome {
    pub fn new(physical_id: PhysicalResourceId, reason: impl Into<String>) -> Self {
        Self {
            physical_id,
            reason: reason.into(),
        }
    }
}

/// Decided before any secret is read or connection is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Preflight {
    Proceed,
    /// Nothing to do; report success without touching the database.
    Skip(Outcome),
}

/// The request cannot be applied to the resource it targets.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConflictError {
    #[error("{field} cannot be changed on update, only the password of {prior} can be rotated")]
    IdentityChanged {
        field: String,
        prior: PhysicalResourceId,
    },
    #[error("the resource was never created")]
    NeverCreated,
    #[error("PhysicalResourceId is required for {0} requests")]
    MissingPhysicalId(RequestType),
}

impl ProviderError for ConflictError {
    fn code(&self) -> ErrorCodes {
        match self {
            ConflictError::MissingPhysicalId(_) => ErrorCodes::InvalidArgument,
            _ => ErrorCodes::FailedPrecondition,
        }
    }

    fn should_trace_error(&self) -> bool {
        false
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Ddl(#[from] DdlError),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error("the password of {0} was not resolved")]
    UnresolvedPassword(Identifier),
    #[error("cannot rename schema {from} to {to}, neither exists")]
    MissingSchema { from: Identifier, to: Identifier },
}

impl ProviderError for ReconcileError {
    fn code(&self) -> ErrorCodes {
        match self {
            ReconcileError::Ddl(err) => err.code(),
            ReconcileError::Secret(err) => err.code(),
            ReconcileError::Property(err) => err.code(),
            ReconcileError::UnresolvedPassword(_) => ErrorCodes::Internal,
            ReconcileError::MissingSchema { .. } => ErrorCodes::NotFound,
        }
    }
}

/// One reconciler per resource kind, selected by the request's resource type.
pub enum Reconciler {
    User(UserReconciler),
    Schema(SchemaReconciler),
    Extension(ExtensionReconciler),
    RoleGrant(RoleGrantReconciler),
}

impl Reconciler {
    pub fn new(spec: ResourceSpec, request: &ResourceRequest) -> Result<Self, PropertyError> {
        let old = request.old_resource_properties.as_ref();
        Ok(match spec {
            ResourceSpec::User(props) => Reconciler::User(UserReconciler::new(props, old)),
            ResourceSpec::Schema(props) => Reconciler::Schema(SchemaReconciler::new(
                props,
                &request.logical_resource_id,
                old,
            )?),
            ResourceSpec::Extension(props) => Reconciler::Extension(ExtensionReconciler::new(
                props,
                &request.logical_resource_id,
                old,
            )?),
            ResourceSpec::RoleGrant(props) => {
                Reconciler::RoleGrant(RoleGrantReconciler::new(props))
            }
        })
    }

    /// The physical id this resource should have given its current properties.
    pub fn identity(&self) -> PhysicalResourceId {
        match self {
            Reconciler::User(r) => r.identity(),
            Reconciler::Schema(r) => r.identity(),
            Reconciler::Extension(r) => r.identity(),
            Reconciler::RoleGrant(r) => r.identity(),
        }
    }

    pub fn connection(&self) -> &ConnectionSpec {
        match self {
            Reconciler::User(r) => &r.props().database,
            Reconciler::Schema(r) => &r.props().database,
            Reconciler::Extension(r) => &r.props().database,
            Reconciler::RoleGrant(r) => &r.props().database,
        }
    }

    /// `prior` is `None` only for Create.
    pub fn preflight(
        &self,
        action: RequestType,
        prior: Option<&PhysicalResourceId>,
    ) -> Result<Preflight, ConflictError> {
        let prior = match (action, prior) {
            (RequestType::Create, _) => return Ok(Preflight::Proceed),
            (_, Some(prior)) => prior,
            (action, None) => return Err(ConflictError::MissingPhysicalId(action)),
        };
        if action == RequestType::Update && prior.is_could_not_create() {
            return Err(ConflictError::NeverCreated);
        }
        match self {
            Reconciler::User(r) => r.preflight(action, prior),
            Reconciler::Schema(r) => Ok(r.preflight(action, prior)),
            Reconciler::Extension(r) => Ok(r.preflight(action, prior)),
            Reconciler::RoleGrant(r) => Ok(r.preflight(action, prior)),
        }
    }

    /// Reads secrets needed by the statements, as opposed to the connection.
    pub async fn resolve_secrets(
        &mut self,
        action: RequestType,
        resolver: &ConnectionResolver,
    ) -> Result<(), SecretError> {
        match self {
            Reconciler::User(r) if action != RequestType::Delete => {
                r.resolve_password(resolver).await
            }
            _ => Ok(()),
        }
    }

    pub async fn apply(
        &self,
        action: RequestType,
        prior: Option<&PhysicalResourceId>,
        session: &mut dyn Session,
    ) -> Result<Outcome, ReconcileError> {
        let prior = prior.cloned().unwrap_or_else(|| self.identity());
        match (self, action) {
            (Reconciler::User(r), RequestType::Create) => r.create(session).await,
            (Reconciler::User(r), RequestType::Update) => r.update(session, prior).await,
            (Reconciler::User(r), RequestType::Delete) => r.delete(session, prior).await,
            (Reconciler::Schema(r), RequestType::Create) => r.create(session).await,
            (Reconciler::Schema(r), RequestType::Update) => r.update(session, prior).await,
            (Reconciler::Schema(r), RequestType::Delete) => r.delete(session, prior).await,
            (Reconciler::Extension(r), RequestType::Create) => r.create(session).await,
            (Reconciler::Extension(r), RequestType::Update) => r.update(session, prior).await,
            (Reconciler::Extension(r), RequestType::Delete) => r.delete(session, prior).await,
            (Reconciler::RoleGrant(r), RequestType::Create | RequestType::Update) => {
                r.grant(session).await
            }
            (Reconciler::RoleGrant(r), RequestType::Delete) => r.delete(session, prior).await,
        }
    }
}

pub(crate) async fn execute(session: &mut dyn Session, statement: Statement) -> Result<(), DdlError> {
    tracing::info!(statement = %statement, "Executing");
    session.execute(&statement).await
}

pub(crate) async fn exists(session: &mut dyn Session, lookup: CatalogLookup) -> Result<bool, DdlError> {
    let found = session.exists(&lookup).await?;
    tracing::debug!(lookup = %lookup, found, "Catalog lookup");
    Ok(found)
}

/// Makes `member` a member of `role` unless it already is, or is `role`.
/// Returns whether a grant was issued.
pub(crate) async fn grant_membership(
    session: &mut dyn Session,
    role: &Identifier,
    member: &Identifier,
) -> Result<bool, DdlError> {
    if role == member {
        return Ok(false);
    }
    let lookup = CatalogLookup::Membership {
        role: role.clone(),
        member: member.clone(),
    };
    if exists(session, lookup).await? {
        return Ok(false);
    }
    execute(
        session,
        Statement::GrantRole {
            role: role.clone(),
            grantee: member.clone(),
        },
    )
    .await?;
    Ok(true)
}
