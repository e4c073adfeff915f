use crate::identifier::Identifier;
use pgcfn_error::{ErrorCodes, ProviderError};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5432;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropertyError {
    #[error("{0} property is required")]
    Missing(String),
    #[error("{field} property is invalid: {message}")]
    Invalid { field: String, message: String },
    #[error("exactly one of {0}Password or {0}PasswordParameterName is required")]
    PasswordSource(String),
}

impl PropertyError {
    pub fn field(&self) -> &str {
        match self {
            PropertyError::Missing(field) => field,
            PropertyError::Invalid { field, .. } => field,
            PropertyError::PasswordSource(prefix) => prefix,
        }
    }
}

impl ProviderError for PropertyError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }

    fn should_trace_error(&self) -> bool {
        false
    }
}

/// Deserializes a CloudFormation property object, naming the failing field
/// by its full path (`Database.Port`).
fn from_properties<T: DeserializeOwned>(value: &Value) -> Result<T, PropertyError> {
    if !value.is_object() {
        return Err(PropertyError::Invalid {
            field: "ResourceProperties".to_string(),
            message: "expected an object".to_string(),
        });
    }
    serde_path_to_error::deserialize(value).map_err(|err| {
        let field = match err.path().to_string() {
            path if path == "." => "ResourceProperties".to_string(),
            path => path,
        };
        PropertyError::Invalid {
            field,
            message: err.into_inner().to_string(),
        }
    })
}

fn required<T>(value: Option<T>, prefix: &str, field: &str) -> Result<T, PropertyError> {
    value.ok_or_else(|| PropertyError::Missing(format!("{prefix}{field}")))
}

fn password_source(
    prefix: &str,
    literal: Option<String>,
    parameter: Option<String>,
) -> Result<PasswordSource, PropertyError> {
    match (literal, parameter) {
        (Some(password), None) => Ok(PasswordSource::Literal(Secret::new(password))),
        (None, Some(name)) if !name.is_empty() => Ok(PasswordSource::Parameter(name)),
        _ => Err(PropertyError::PasswordSource(prefix.to_string())),
    }
}

/// CloudFormation hands scalar properties to custom resources as strings,
/// so numbers and booleans are accepted in either form.
mod scalar {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn text<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(D::Error::custom("expected a string")),
        }
    }

    pub fn port<'de, D>(d: D) -> Result<Option<u16>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };
        port.and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .map(Some)
            .ok_or_else(|| D::Error::custom("expected an integer between 1 and 65535"))
    }

    pub fn flag<'de, D>(d: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(D::Error::custom(format!("{s:?} is not a boolean"))),
            },
            Some(_) => Err(D::Error::custom("expected a boolean")),
        }
    }
}

/// A password value. Formatting never reveals it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PasswordSource {
    Literal(Secret),
    /// Name of an SSM parameter holding the password.
    Parameter(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Retain,
    Drop,
}

impl<'de> Deserialize<'de> for DeletionPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let policy = String::deserialize(deserializer)?;
        if policy.eq_ignore_ascii_case("drop") {
            Ok(DeletionPolicy::Drop)
        } else if policy.eq_ignore_ascii_case("retain") {
            Ok(DeletionPolicy::Retain)
        } else {
            Err(D::Error::custom(format!(
                "{policy:?} is not one of Drop, Retain"
            )))
        }
    }
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionPolicy::Retain => f.write_str("Retain"),
            DeletionPolicy::Drop => f.write_str("Drop"),
        }
    }
}

/// Where and as whom to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub dbname: Identifier,
    pub user: Identifier,
    pub password: PasswordSource,
}

/// The `Database` object as CloudFormation sends it. Required fields are
/// optional here so a missing one is reported by name.
#[derive(Deserialize)]
#[serde(rename = "Database", rename_all = "PascalCase")]
struct ConnectionFields {
    #[serde(default, deserialize_with = "scalar::text")]
    host: Option<String>,
    #[serde(default, deserialize_with = "scalar::port")]
    port: Option<u16>,
    #[serde(default, rename = "DBName")]
    dbname: Option<Identifier>,
    #[serde(default)]
    user: Option<Identifier>,
    #[serde(default, deserialize_with = "scalar::text")]
    password: Option<String>,
    #[serde(default, deserialize_with = "scalar::text")]
    password_parameter_name: Option<String>,
}

impl ConnectionFields {
    const PREFIX: &'static str = "Database.";

    fn into_spec(self) -> Result<ConnectionSpec, PropertyError> {
        let host = required(self.host, Self::PREFIX, "Host")?;
        if host.is_empty() {
            return Err(PropertyError::Invalid {
                field: format!("{}Host", Self::PREFIX),
                message: "must not be empty".to_string(),
            });
        }
        Ok(ConnectionSpec {
            host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            dbname: required(self.dbname, Self::PREFIX, "DBName")?,
            user: required(self.user, Self::PREFIX, "User")?,
            password: password_source(
                Self::PREFIX,
                self.password,
                self.password_parameter_name,
            )?,
        })
    }
}

fn connection(database: Option<ConnectionFields>) -> Result<ConnectionSpec, PropertyError> {
    required(database, "", "Database")?.into_spec()
}

/// `Custom::PostgresDBUser`: a login role and optionally a database it owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProperties {
    pub user: Identifier,
    pub password: PasswordSource,
    pub with_database: bool,
    pub deletion_policy: DeletionPolicy,
    pub database: ConnectionSpec,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserFields {
    #[serde(default)]
    user: Option<Identifier>,
    #[serde(default, deserialize_with = "scalar::text")]
    password: Option<String>,
    #[serde(default, deserialize_with = "scalar::text")]
    password_parameter_name: Option<String>,
    #[serde(default, deserialize_with = "scalar::flag")]
    with_database: Option<bool>,
    #[serde(default)]
    deletion_policy: Option<DeletionPolicy>,
    #[serde(default)]
    database: Option<ConnectionFields>,
}

impl UserProperties {
    pub fn parse(value: &Value) -> Result<Self, PropertyError> {
        let fields: UserFields = from_properties(value)?;
        Ok(UserProperties {
            user: required(fields.user, "", "User")?,
            password: password_source("", fields.password, fields.password_parameter_name)?,
            with_database: fields.with_database.unwrap_or(false),
            deletion_policy: fields.deletion_policy.unwrap_or(DeletionPolicy::Retain),
            database: connection(fields.database)?,
        })
    }
}

/// `Custom::PostgreSQLSchema`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaProperties {
    pub schema: Identifier,
    pub owner: Identifier,
    pub deletion_policy: DeletionPolicy,
    pub database: ConnectionSpec,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SchemaFields {
    #[serde(default)]
    schema: Option<Identifier>,
    #[serde(default)]
    owner: Option<Identifier>,
    #[serde(default)]
    deletion_policy: Option<DeletionPolicy>,
    #[serde(default)]
    database: Option<ConnectionFields>,
}

impl SchemaProperties {
    pub fn parse(value: &Value) -> Result<Self, PropertyError> {
        let fields: SchemaFields = from_properties(value)?;
        Ok(SchemaProperties {
            schema: required(fields.schema, "", "Schema")?,
            owner: required(fields.owner, "", "Owner")?,
            deletion_policy: fields.deletion_policy.unwrap_or(DeletionPolicy::Retain),
            database: connection(fields.database)?,
        })
    }
}

/// `Custom::PostgreSQLExtension`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionProperties {
    pub extension: Identifier,
    pub deletion_policy: DeletionPolicy,
    pub database: ConnectionSpec,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExtensionFields {
    #[serde(default)]
    extension: Option<Identifier>,
    #[serde(default)]
    deletion_policy: Option<DeletionPolicy>,
    #[serde(default)]
    database: Option<ConnectionFields>,
}

impl ExtensionProperties {
    pub fn parse(value: &Value) -> Result<Self, PropertyError> {
        let fields: ExtensionFields = from_properties(value)?;
        Ok(ExtensionProperties {
            extension: required(fields.extension, "", "Extension")?,
            deletion_policy: fields.deletion_policy.unwrap_or(DeletionPolicy::Drop),
            database: connection(fields.database)?,
        })
    }
}

/// `Custom::PostgreSQLRoleGrant`: membership of `grantee` in `role`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleGrantProperties {
    pub role: Identifier,
    pub grantee: Identifier,
    pub deletion_policy: DeletionPolicy,
    pub database: ConnectionSpec,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleGrantFields {
    #[serde(default)]
    role: Option<Identifier>,
    #[serde(default)]
    grantee: Option<Identifier>,
    #[serde(default)]
    deletion_policy: Option<DeletionPolicy>,
    #[serde(default)]
    database: Option<ConnectionFields>,
}

impl RoleGrantProperties {
    pub fn parse(value: &Value) -> Result<Self, PropertyError> {
        let fields: RoleGrantFields = from_properties(value)?;
        Ok(RoleGrantProperties {
            role: required(fields.role, "", "Role")?,
            grantee: required(fields.grantee, "", "Grantee")?,
            deletion_policy: fields.deletion_policy.unwrap_or(DeletionPolicy::Drop),
            database: connection(fields.database)?,
        })
    }
}

/// The subset of `OldResourceProperties` that drives in-place renames.
///
/// Fields absent from the old properties fall back to the new value, so a
/// missing field never looks like a change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriorNames {
    pub name: Identifier,
    pub owner: Option<Identifier>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PriorFields {
    #[serde(default)]
    schema: Option<Identifier>,
    #[serde(default)]
    extension: Option<Identifier>,
    #[serde(default)]
    owner: Option<Identifier>,
}

impl PriorFields {
    fn parse(old: Option<&Value>) -> Result<Self, PropertyError> {
        Ok(old
            .map(from_properties::<PriorFields>)
            .transpose()?
            .unwrap_or_default())
    }
}

impl PriorNames {
    pub fn for_schema(old: Option<&Value>, props: &SchemaProperties) -> Result<Self, PropertyError> {
        let prior = PriorFields::parse(old)?;
        Ok(PriorNames {
            name: prior.schema.unwrap_or_else(|| props.schema.clone()),
            owner: Some(prior.owner.unwrap_or_else(|| props.owner.clone())),
        })
    }

    pub fn for_extension(
        old: Option<&Value>,
        props: &ExtensionProperties,
    ) -> Result<Self, PropertyError> {
        let prior = PriorFields::parse(old)?;
        Ok(PriorNames {
            name: prior.extension.unwrap_or_else(|| props.extension.clone()),
            owner: None,
        })
    }
}
