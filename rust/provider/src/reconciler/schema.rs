use super::{exists, execute, grant_membership, Outcome, Preflight, ReconcileError};
use crate::session::{CatalogLookup, Session, Statement};
use pgcfn_types::identity::logical_identity;
use pgcfn_types::{
    DeletionPolicy, PhysicalResourceId, PriorNames, PropertyError, RequestType, SchemaProperties,
};
use serde_json::Value;

pub struct SchemaReconciler {
    props: SchemaProperties,
    logical_id: String,
    prior: PriorNames,
}

impl SchemaReconciler {
    pub fn new(
        props: SchemaProperties,
        logical_id: &str,
        old: Option<&Value>,
    ) -> Result<Self, PropertyError> {
        let prior = PriorNames::for_schema(old, &props)?;
        Ok(Self {
            props,
            logical_id: logical_id.to_string(),
            prior,
        })
    }

    pub fn props(&self) -> &SchemaProperties {
        &self.props
    }

    pub fn identity(&self) -> PhysicalResourceId {
        logical_identity(&self.logical_id)
    }

    fn owner_changed(&self) -> bool {
        self.prior.owner.as_ref() != Some(&self.props.owner)
    }

    fn renamed(&self) -> bool {
        self.prior.name != self.props.schema
    }

    pub(super) fn preflight(&self, action: RequestType, prior: &PhysicalResourceId) -> Preflight {
        match action {
            RequestType::Update if !self.owner_changed() && !self.renamed() => {
                Preflight::Skip(Outcome::new(
                    prior.clone(),
                    format!("Schema {} is unchanged", self.props.schema),
                ))
            }
            RequestType::Delete if self.props.deletion_policy == DeletionPolicy::Retain => {
                Preflight::Skip(Outcome::new(
                    prior.clone(),
                    format!("Schema {} retained", self.props.schema),
                ))
            }
            _ => Preflight::Proceed,
        }
    }

    pub(super) async fn create(&self, session: &mut dyn Session) -> Result<Outcome, ReconcileError> {
        let schema = &self.props.schema;
        let owner = &self.props.owner;
        grant_membership(session, owner, &self.props.database.user).await?;
        let reown = Statement::AlterSchemaOwner {
            name: schema.clone(),
            owner: owner.clone(),
        };
        if exists(session, CatalogLookup::Schema(schema.clone())).await? {
            execute(session, reown).await?;
        } else {
            let create = Statement::CreateSchema {
                name: schema.clone(),
                owner: owner.clone(),
            };
            match execute(session, create).await {
                Err(err) if err.is_duplicate() => {
                    tracing::warn!(schema = %schema, "Schema was created concurrently, changing its owner instead");
                    execute(session, reown).await?;
                }
                result => result?,
            }
        }
        Ok(Outcome::new(
            self.identity(),
            format!("Created schema {schema} owned by {owner}"),
        ))
    }

    /// Owner first, then name, both addressed through the old name.
    pub(super) async fn update(
        &self,
        session: &mut dyn Session,
        prior: PhysicalResourceId,
    ) -> Result<Outcome, ReconcileError> {
        let old_name = &self.prior.name;
        let new_name = &self.props.schema;
        // A replayed update may find the rename already applied.
        let old_exists =
            self.renamed() && exists(session, CatalogLookup::Schema(old_name.clone())).await?;
        if self.renamed()
            && !old_exists
            && !exists(session, CatalogLookup::Schema(new_name.clone())).await?
        {
            return Err(ReconcileError::MissingSchema {
                from: old_name.clone(),
                to: new_name.clone(),
            });
        }
        let current = if old_exists || !self.renamed() {
            old_name
        } else {
            new_name
        };
        if self.owner_changed() {
            grant_membership(session, &self.props.owner, &self.props.database.user).await?;
            execute(
                session,
                Statement::AlterSchemaOwner {
                    name: current.clone(),
                    owner: self.props.owner.clone(),
                },
            )
            .await?;
        }
        if old_exists {
            execute(
                session,
                Statement::RenameSchema {
                    from: old_name.clone(),
                    to: new_name.clone(),
                },
            )
            .await?;
        }
        Ok(Outcome::new(prior, format!("Updated schema {new_name}")))
    }

    pub(super) async fn delete(
        &self,
        session: &mut dyn Session,
        prior: PhysicalResourceId,
    ) -> Result<Outcome, ReconcileError> {
        let schema = &self.props.schema;
        execute(session, Statement::DropSchema { name: schema.clone() }).await?;
        Ok(Outcome::new(prior, format!("Dropped schema {schema}")))
    }
}
