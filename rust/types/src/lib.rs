mod identifier;
pub mod identity;
pub mod properties;
mod request;
mod response;

pub use identifier::*;
pub use identity::{PhysicalResourceId, COULD_NOT_CREATE};
pub use properties::{
    ConnectionSpec, DeletionPolicy, ExtensionProperties, PasswordSource, PriorNames,
    PropertyError, RoleGrantProperties, SchemaProperties, Secret, UserProperties,
};
pub use request::*;
pub use response::*;
