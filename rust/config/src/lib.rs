pub mod helpers;
pub mod registry;

use async_trait::async_trait;
use pgcfn_error::ProviderError;
use registry::Registry;

/// Components that are built from a configuration section.
///
/// Implementations may pull shared components out of the registry (for
/// example the secret store) and should register themselves when other
/// components depend on them.
#[async_trait]
pub trait Configurable<T, E = Box<dyn ProviderError>> {
    async fn try_from_config(config: &T, registry: &Registry) -> Result<Self, E>
    where
        Self: Sized;
}
