use super::{exists, execute, grant_membership, ConflictError, Outcome, Preflight, ReconcileError};
use crate::connection::ConnectionResolver;
use crate::secrets::SecretError;
use crate::session::{CatalogLookup, DdlError, Session, Statement};
use pgcfn_types::identity::user_identity;
use pgcfn_types::{DeletionPolicy, PhysicalResourceId, RequestType, Secret, UserProperties};
use serde_json::Value;

/// A login role, optionally with a same-named database it owns.
pub struct UserReconciler {
    props: UserProperties,
    old: Option<Value>,
    password: Option<Secret>,
}

impl UserReconciler {
    pub fn new(props: UserProperties, old: Option<&Value>) -> Self {
        Self {
            props,
            old: old.cloned(),
            password: None,
        }
    }

    pub fn props(&self) -> &UserProperties {
        &self.props
    }

    pub fn identity(&self) -> PhysicalResourceId {
        user_identity(&self.props)
    }

    pub(super) fn preflight(
        &self,
        action: RequestType,
        prior: &PhysicalResourceId,
    ) -> Result<Preflight, ConflictError> {
        if self.identity() == *prior {
            return Ok(Preflight::Proceed);
        }
        match action {
            RequestType::Update => Err(ConflictError::IdentityChanged {
                field: changed_identity_field(self.old.as_ref(), &self.props).to_string(),
                prior: prior.clone(),
            }),
            RequestType::Delete => Ok(Preflight::Skip(Outcome::new(
                prior.clone(),
                format!(
                    "{prior} does not belong to user {}, nothing to delete",
                    self.props.user
                ),
            ))),
            RequestType::Create => Ok(Preflight::Proceed),
        }
    }

    pub(super) async fn resolve_password(
        &mut self,
        resolver: &ConnectionResolver,
    ) -> Result<(), SecretError> {
        self.password = Some(resolver.resolve_password(&self.props.password).await?);
        Ok(())
    }

    fn password(&self) -> Result<&Secret, ReconcileError> {
        self.password
            .as_ref()
            .ok_or_else(|| ReconcileError::UnresolvedPassword(self.props.user.clone()))
    }

    fn rotate_password(&self, password: &Secret) -> Statement {
        Statement::AlterRolePassword {
            name: self.props.user.clone(),
            password: password.clone(),
        }
    }

    pub(super) async fn create(&self, session: &mut dyn Session) -> Result<Outcome, ReconcileError> {
        let password = self.password()?;
        let created = self.ensure_role(session, password).await?;
        if self.props.with_database {
            self.ensure_database(session).await?;
        }
        let reason = match (created, self.props.with_database) {
            (true, true) => format!("Created user {} with database", self.props.user),
            (true, false) => format!("Created user {}", self.props.user),
            (false, _) => format!("User {} already existed, password updated", self.props.user),
        };
        Ok(Outcome::new(self.identity(), reason))
    }

    pub(super) async fn update(
        &self,
        session: &mut dyn Session,
        prior: PhysicalResourceId,
    ) -> Result<Outcome, ReconcileError> {
        let password = self.password()?;
        execute(session, self.rotate_password(password)).await?;
        Ok(Outcome::new(
            prior,
            format!("Updated password of user {}", self.props.user),
        ))
    }

    pub(super) async fn delete(
        &self,
        session: &mut dyn Session,
        prior: PhysicalResourceId,
    ) -> Result<Outcome, ReconcileError> {
        let user = &self.props.user;
        let reason = match self.props.deletion_policy {
            DeletionPolicy::Drop => {
                // The database depends on its owner, so it goes first.
                if self.props.with_database
                    && exists(session, CatalogLookup::Database(user.clone())).await?
                {
                    execute(session, Statement::DropDatabase { name: user.clone() }).await?;
                }
                execute(session, Statement::DropRole { name: user.clone() }).await?;
                format!("Dropped user {user}")
            }
            DeletionPolicy::Retain => {
                if exists(session, CatalogLookup::Role(user.clone())).await? {
                    execute(session, Statement::AlterRoleNoLogin { name: user.clone() }).await?;
                    format!("Disabled login of user {user}")
                } else {
                    format!("User {user} does not exist")
                }
            }
        };
        Ok(Outcome::new(prior, reason))
    }

    /// Creates the role, or rotates its password when it already exists.
    /// Returns whether the role was created.
    async fn ensure_role(&self, session: &mut dyn Session, password: &Secret) -> Result<bool, DdlError> {
        let user = &self.props.user;
        if exists(session, CatalogLookup::Role(user.clone())).await? {
            execute(session, self.rotate_password(password)).await?;
            return Ok(false);
        }
        let create = Statement::CreateRole {
            name: user.clone(),
            password: password.clone(),
        };
        match execute(session, create).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_duplicate() => {
                tracing::warn!(user = %user, "Role was created concurrently, rotating its password instead");
                if !exists(session, CatalogLookup::Role(user.clone())).await? {
                    return Err(err);
                }
                execute(session, self.rotate_password(password)).await?;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Handing a database to another role requires membership in that role,
    /// so the connecting user is made a member for the duration.
    async fn ensure_database(&self, session: &mut dyn Session) -> Result<(), DdlError> {
        let user = &self.props.user;
        let admin = &self.props.database.user;
        let granted = grant_membership(session, user, admin).await?;
        let result = self.create_or_transfer_database(session).await;
        let revoked = if granted {
            execute(
                session,
                Statement::RevokeRole {
                    role: user.clone(),
                    grantee: admin.clone(),
                },
            )
            .await
        } else {
            Ok(())
        };
        result?;
        revoked
    }

    async fn create_or_transfer_database(&self, session: &mut dyn Session) -> Result<(), DdlError> {
        let user = &self.props.user;
        let transfer = Statement::AlterDatabaseOwner {
            name: user.clone(),
            owner: user.clone(),
        };
        if exists(session, CatalogLookup::Database(user.clone())).await? {
            return execute(session, transfer).await;
        }
        let create = Statement::CreateDatabase {
            name: user.clone(),
            owner: user.clone(),
        };
        match execute(session, create).await {
            Err(err) if err.is_duplicate() => {
                tracing::warn!(database = %user, "Database was created concurrently, transferring ownership instead");
                execute(session, transfer).await
            }
            result => result,
        }
    }
}

/// Names the property whose change moved the user to a different identity.
fn changed_identity_field(old: Option<&Value>, props: &UserProperties) -> &'static str {
    let Some(old) = old.and_then(|old| UserProperties::parse(old).ok()) else {
        return "PhysicalResourceId";
    };
    if old.user != props.user {
        "User"
    } else if old.with_database != props.with_database {
        "WithDatabase"
    } else if old.database.host != props.database.host {
        "Database.Host"
    } else if old.database.port != props.database.port {
        "Database.Port"
    } else if old.database.dbname != props.database.dbname {
        "Database.DBName"
    } else {
        "PhysicalResourceId"
    }
}
