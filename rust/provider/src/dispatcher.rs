use crate::config::ProviderServiceConfig;
use crate::connection::ConnectionResolver;
use crate::reconciler::{Outcome, Preflight, Reconciler};
use crate::secrets::SecretStore;
use async_trait::async_trait;
use pgcfn_config::registry::Registry;
use pgcfn_config::Configurable;
use pgcfn_error::ProviderError;
use pgcfn_types::{
    PhysicalResourceId, ReconciliationResult, RequestType, ResourceKind, ResourceRequest,
    ResourceSpec,
};
use tracing::Instrument;

/// Routes one lifecycle event to its reconciler and always produces a
/// result. Holds no per-request state.
#[derive(Clone)]
pub struct LifecycleDispatcher {
    resolver: ConnectionResolver,
}

impl LifecycleDispatcher {
    pub fn new(resolver: ConnectionResolver) -> Self {
        Self { resolver }
    }

    pub async fn handle_json(&self, event: &str) -> ReconciliationResult {
        match ResourceRequest::from_json(event) {
            Ok(request) => self.handle(&request).await,
            Err(err) => {
                tracing::error!(error = %err, "Rejected malformed request");
                ReconciliationResult::failed(
                    PhysicalResourceId::could_not_create(),
                    format!("Failed to handle request, {err}"),
                )
            }
        }
    }

    pub async fn handle(&self, request: &ResourceRequest) -> ReconciliationResult {
        let span = tracing::info_span!(
            "reconcile",
            request_type = %request.request_type,
            resource_type = %request.resource_type,
            logical_resource_id = %request.logical_resource_id,
            request_id = request.request_id.as_deref().unwrap_or_default(),
        );
        async {
            let result = match self.reconcile(request).await {
                Ok(outcome) => {
                    tracing::info!(physical_resource_id = %outcome.physical_id, reason = %outcome.reason, "Succeeded");
                    ReconciliationResult::success(outcome.physical_id, outcome.reason)
                }
                Err(err) => {
                    let noun = request.kind().map(|kind| kind.noun()).unwrap_or("resource");
                    let verb = request.request_type.to_string().to_lowercase();
                    if err.should_trace_error() {
                        tracing::error!(code = err.code().name(), error = %err, "Failed to {verb} {noun}");
                    } else {
                        tracing::warn!(code = err.code().name(), error = %err, "Failed to {verb} {noun}");
                    }
                    ReconciliationResult::failed(
                        request.failure_physical_id(),
                        format!("Failed to {verb} {noun}, {err}"),
                    )
                }
            };
            result.for_request(request)
        }
        .instrument(span)
        .await
    }

    async fn reconcile(&self, request: &ResourceRequest) -> Result<Outcome, Box<dyn ProviderError>> {
        let prior = request.physical_resource_id.as_ref();
        // CloudFormation replays Delete after a failed Create. Nothing exists,
        // and the properties may be the reason the Create failed.
        if request.request_type == RequestType::Delete
            && prior.is_some_and(|id| id.is_could_not_create())
        {
            return Ok(Outcome::new(
                PhysicalResourceId::could_not_create(),
                "Resource was never created, nothing to delete",
            ));
        }
        let kind: ResourceKind = request.kind().map_err(|e| e.boxed())?;
        let spec = ResourceSpec::parse(kind, &request.resource_properties).map_err(|e| e.boxed())?;
        let mut reconciler = Reconciler::new(spec, request).map_err(|e| e.boxed())?;
        if let Preflight::Skip(outcome) = reconciler
            .preflight(request.request_type, prior)
            .map_err(|e| e.boxed())?
        {
            return Ok(outcome);
        }
        reconciler
            .resolve_secrets(request.request_type, &self.resolver)
            .await
            .map_err(|e| e.boxed())?;

        let mut session = self
            .resolver
            .connect(reconciler.connection())
            .await
            .map_err(|e| e.boxed())?;
        let result = reconciler
            .apply(request.request_type, prior, session.as_mut())
            .await;
        if let Err(err) = session.close().await {
            tracing::warn!(error = %err, "Failed to close session");
        }
        result.map_err(|e| e.boxed())
    }
}

#[async_trait]
impl Configurable<ProviderServiceConfig> for LifecycleDispatcher {
    async fn try_from_config(
        config: &ProviderServiceConfig,
        registry: &Registry,
    ) -> Result<Self, Box<dyn ProviderError>> {
        SecretStore::try_from_config(&config.secrets, registry).await?;
        let resolver = ConnectionResolver::try_from_config(&config.connection, registry).await?;
        Ok(Self::new(resolver))
    }
}
