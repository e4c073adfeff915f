use parking_lot::Mutex;
use pgcfn_error::{ErrorCodes, ProviderError};
use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use thiserror::Error;

pub trait Injectable: Any + Send + Sync + Clone {}

/// Holds the process-wide components (secret store, connector) that are
/// built once and handed to every invocation.
///
/// Values are cloned on retrieval, so stored types should be cheap to clone
/// and share their state (usually through an inner `Arc`).
#[derive(Default, Clone)]
pub struct Registry {
    storage: Arc<Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Component [{0}] was not registered")]
    TypeNotFound(String),
}

impl ProviderError for RegistryError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Internal
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register<T: Injectable>(&self, value: T) {
        let mut storage = self.storage.lock();
        storage.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Injectable>(&self) -> Result<T, RegistryError> {
        let storage = self.storage.lock();
        storage
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
            .ok_or(RegistryError::TypeNotFound(type_name::<T>().to_string()))
    }
}
