use super::{exists, execute, Outcome, Preflight, ReconcileError};
use crate::session::{CatalogLookup, Session, Statement};
use pgcfn_types::identity::role_grant_identity;
use pgcfn_types::{DeletionPolicy, PhysicalResourceId, RequestType, RoleGrantProperties};

/// Membership of `grantee` in `role`.
pub struct RoleGrantReconciler {
    props: RoleGrantProperties,
}

impl RoleGrantReconciler {
    pub fn new(props: RoleGrantProperties) -> Self {
        Self { props }
    }

    pub fn props(&self) -> &RoleGrantProperties {
        &self.props
    }

    pub fn identity(&self) -> PhysicalResourceId {
        role_grant_identity(&self.props)
    }

    pub(super) fn preflight(&self, action: RequestType, prior: &PhysicalResourceId) -> Preflight {
        match action {
            RequestType::Delete if self.props.deletion_policy == DeletionPolicy::Retain => {
                Preflight::Skip(Outcome::new(
                    prior.clone(),
                    format!(
                        "Grant of {} to {} retained",
                        self.props.role, self.props.grantee
                    ),
                ))
            }
            _ => Preflight::Proceed,
        }
    }

    /// Granting an existing membership is accepted by the server, so Create
    /// and Update share this path.
    pub(super) async fn grant(&self, session: &mut dyn Session) -> Result<Outcome, ReconcileError> {
        let RoleGrantProperties { role, grantee, .. } = &self.props;
        execute(
            session,
            Statement::GrantRole {
                role: role.clone(),
                grantee: grantee.clone(),
            },
        )
        .await?;
        Ok(Outcome::new(
            self.identity(),
            format!("Granted {role} to {grantee}"),
        ))
    }

    pub(super) async fn delete(
        &self,
        session: &mut dyn Session,
        prior: PhysicalResourceId,
    ) -> Result<Outcome, ReconcileError> {
        let RoleGrantProperties { role, grantee, .. } = &self.props;
        for name in [role, grantee] {
            if !exists(session, CatalogLookup::Role(name.clone())).await? {
                return Ok(Outcome::new(
                    prior,
                    format!("Role {name} does not exist, nothing to revoke"),
                ));
            }
        }
        execute(
            session,
            Statement::RevokeRole {
                role: role.clone(),
                grantee: grantee.clone(),
            },
        )
        .await?;
        Ok(Outcome::new(prior, format!("Revoked {role} from {grantee}")))
    }
}
