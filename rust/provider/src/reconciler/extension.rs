use super::{execute, Outcome, Preflight, ReconcileError};
use crate::session::{Session, Statement};
use pgcfn_types::identity::logical_identity;
use pgcfn_types::{
    DeletionPolicy, ExtensionProperties, Identifier, PhysicalResourceId, PriorNames,
    PropertyError, RequestType,
};
use serde_json::Value;

pub struct ExtensionReconciler {
    props: ExtensionProperties,
    logical_id: String,
    prior_name: Identifier,
}

impl ExtensionReconciler {
    pub fn new(
        props: ExtensionProperties,
        logical_id: &str,
        old: Option<&Value>,
    ) -> Result<Self, PropertyError> {
        let prior = PriorNames::for_extension(old, &props)?;
        Ok(Self {
            props,
            logical_id: logical_id.to_string(),
            prior_name: prior.name,
        })
    }

    pub fn props(&self) -> &ExtensionProperties {
        &self.props
    }

    pub fn identity(&self) -> PhysicalResourceId {
        logical_identity(&self.logical_id)
    }

    pub(super) fn preflight(&self, action: RequestType, prior: &PhysicalResourceId) -> Preflight {
        let extension = &self.props.extension;
        match action {
            RequestType::Update if self.prior_name == *extension => Preflight::Skip(Outcome::new(
                prior.clone(),
                format!("Extension {extension} is unchanged"),
            )),
            RequestType::Delete if self.props.deletion_policy == DeletionPolicy::Retain => {
                Preflight::Skip(Outcome::new(
                    prior.clone(),
                    format!("Extension {extension} retained"),
                ))
            }
            _ => Preflight::Proceed,
        }
    }

    pub(super) async fn create(&self, session: &mut dyn Session) -> Result<Outcome, ReconcileError> {
        let extension = &self.props.extension;
        execute(session, Statement::CreateExtension { name: extension.clone() }).await?;
        Ok(Outcome::new(
            self.identity(),
            format!("Created extension {extension}"),
        ))
    }

    pub(super) async fn update(
        &self,
        session: &mut dyn Session,
        prior: PhysicalResourceId,
    ) -> Result<Outcome, ReconcileError> {
        let extension = &self.props.extension;
        execute(
            session,
            Statement::DropExtension {
                name: self.prior_name.clone(),
            },
        )
        .await?;
        execute(session, Statement::CreateExtension { name: extension.clone() }).await?;
        Ok(Outcome::new(
            prior,
            format!("Replaced extension {} with {extension}", self.prior_name),
        ))
    }

    pub(super) async fn delete(
        &self,
        session: &mut dyn Session,
        prior: PhysicalResourceId,
    ) -> Result<Outcome, ReconcileError> {
        let extension = &self.props.extension;
        execute(session, Statement::DropExtension { name: extension.clone() }).await?;
        Ok(Outcome::new(prior, format!("Dropped extension {extension}")))
    }
}
