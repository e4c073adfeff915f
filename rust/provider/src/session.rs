use async_trait::async_trait;
use pgcfn_error::{sqlstate_code, ErrorCodes, ProviderError};
use pgcfn_types::{Identifier, Secret};
use std::fmt;
use thiserror::Error;

/// SQLSTATEs raised when an object we are about to create appeared
/// concurrently (duplicate_object, duplicate_database, duplicate_schema).
const DUPLICATE_SQLSTATES: [&str; 3] = ["42710", "42P04", "42P06"];

/// A DDL statement the reconcilers issue.
///
/// Identifiers are interpolated double-quoted so the server stores exactly
/// the name the catalog lookups bind. Passwords are rendered as escaped
/// string literals in `sql()` and redacted by `Display`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    CreateRole { name: Identifier, password: Secret },
    AlterRolePassword { name: Identifier, password: Secret },
    AlterRoleNoLogin { name: Identifier },
    DropRole { name: Identifier },
    CreateDatabase { name: Identifier, owner: Identifier },
    AlterDatabaseOwner { name: Identifier, owner: Identifier },
    DropDatabase { name: Identifier },
    GrantRole { role: Identifier, grantee: Identifier },
    RevokeRole { role: Identifier, grantee: Identifier },
    CreateSchema { name: Identifier, owner: Identifier },
    AlterSchemaOwner { name: Identifier, owner: Identifier },
    RenameSchema { from: Identifier, to: Identifier },
    DropSchema { name: Identifier },
    CreateExtension { name: Identifier },
    DropExtension { name: Identifier },
}

/// Quotes a string literal the way PostgreSQL's `quote_literal` does.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}

impl Statement {
    fn render(&self, redact: bool) -> String {
        let password = |secret: &Secret| {
            if redact {
                "'***'".to_string()
            } else {
                quote_literal(secret.expose())
            }
        };
        match self {
            Statement::CreateRole { name, password: p } => format!(
                "CREATE ROLE {} LOGIN ENCRYPTED PASSWORD {}",
                name.quoted(),
                password(p)
            ),
            Statement::AlterRolePassword { name, password: p } => format!(
                "ALTER ROLE {} LOGIN ENCRYPTED PASSWORD {}",
                name.quoted(),
                password(p)
            ),
            Statement::AlterRoleNoLogin { name } => format!("ALTER ROLE {} NOLOGIN", name.quoted()),
            Statement::DropRole { name } => format!("DROP ROLE IF EXISTS {}", name.quoted()),
            Statement::CreateDatabase { name, owner } => {
                format!("CREATE DATABASE {} OWNER {}", name.quoted(), owner.quoted())
            }
            Statement::AlterDatabaseOwner { name, owner } => {
                format!("ALTER DATABASE {} OWNER TO {}", name.quoted(), owner.quoted())
            }
            Statement::DropDatabase { name } => {
                format!("DROP DATABASE IF EXISTS {}", name.quoted())
            }
            Statement::GrantRole { role, grantee } => {
                format!("GRANT {} TO {}", role.quoted(), grantee.quoted())
            }
            Statement::RevokeRole { role, grantee } => {
                format!("REVOKE {} FROM {}", role.quoted(), grantee.quoted())
            }
            Statement::CreateSchema { name, owner } => {
                format!("CREATE SCHEMA {} AUTHORIZATION {}", name.quoted(), owner.quoted())
            }
            Statement::AlterSchemaOwner { name, owner } => {
                format!("ALTER SCHEMA {} OWNER TO {}", name.quoted(), owner.quoted())
            }
            Statement::RenameSchema { from, to } => {
                format!("ALTER SCHEMA {} RENAME TO {}", from.quoted(), to.quoted())
            }
            Statement::DropSchema { name } => {
                format!("DROP SCHEMA IF EXISTS {} CASCADE", name.quoted())
            }
            Statement::CreateExtension { name } => {
                format!("CREATE EXTENSION IF NOT EXISTS {}", name.quoted())
            }
            Statement::DropExtension { name } => {
                format!("DROP EXTENSION IF EXISTS {} CASCADE", name.quoted())
            }
        }
    }

    /// The statement text sent to the server, including secrets.
    pub fn sql(&self) -> String {
        self.render(false)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

/// Existence checks against the system catalogs, keyed by exact name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogLookup {
    Role(Identifier),
    Database(Identifier),
    Schema(Identifier),
    /// Whether `member` is a direct member of `role`.
    Membership { role: Identifier, member: Identifier },
}

impl CatalogLookup {
    pub fn query(&self) -> &'static str {
        match self {
            CatalogLookup::Role(_) => {
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_roles WHERE rolname = $1)"
            }
            CatalogLookup::Database(_) => {
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1)"
            }
            CatalogLookup::Schema(_) => {
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)"
            }
            CatalogLookup::Membership { .. } => {
                r#"SELECT EXISTS (
                    SELECT 1
                    FROM pg_catalog.pg_auth_members m
                    JOIN pg_catalog.pg_roles r ON r.oid = m.roleid
                    JOIN pg_catalog.pg_roles u ON u.oid = m.member
                    WHERE r.rolname = $1 AND u.rolname = $2
                )"#
            }
        }
    }

    pub fn binds(&self) -> Vec<&str> {
        match self {
            CatalogLookup::Role(name)
            | CatalogLookup::Database(name)
            | CatalogLookup::Schema(name) => vec![name.as_str()],
            CatalogLookup::Membership { role, member } => vec![role.as_str(), member.as_str()],
        }
    }
}

impl fmt::Display for CatalogLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogLookup::Role(name) => write!(f, "role {name}"),
            CatalogLookup::Database(name) => write!(f, "database {name}"),
            CatalogLookup::Schema(name) => write!(f, "schema {name}"),
            CatalogLookup::Membership { role, member } => {
                write!(f, "membership of {member} in {role}")
            }
        }
    }
}

/// A statement or catalog lookup failed.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{statement} failed: {message}")]
pub struct DdlError {
    /// Redacted statement text.
    pub statement: String,
    pub sqlstate: Option<String>,
    pub message: String,
}

impl DdlError {
    pub fn new(statement: impl fmt::Display, sqlstate: Option<String>, message: impl Into<String>) -> Self {
        DdlError {
            statement: statement.to_string(),
            sqlstate,
            message: message.into(),
        }
    }

    /// The object already exists, typically because a concurrent invocation
    /// created it between our existence check and our statement.
    pub fn is_duplicate(&self) -> bool {
        self.sqlstate
            .as_deref()
            .is_some_and(|code| DUPLICATE_SQLSTATES.contains(&code))
    }
}

impl ProviderError for DdlError {
    fn code(&self) -> ErrorCodes {
        self.sqlstate
            .as_deref()
            .map(sqlstate_code)
            .unwrap_or(ErrorCodes::Internal)
    }
}

/// A live, exclusively owned database session in autocommit mode.
#[async_trait]
pub trait Session: Send {
    async fn execute(&mut self, statement: &Statement) -> Result<(), DdlError>;
    async fn exists(&mut self, lookup: &CatalogLookup) -> Result<bool, DdlError>;
    /// Terminates the session. Further calls fail.
    async fn close(&mut self) -> Result<(), DdlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Identifier {
        Identifier::new(name).unwrap()
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("pw"), "'pw'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(r"a\b"), r"E'a\\b'");
        assert_eq!(quote_literal(r"'; DROP ROLE x; --\"), r"E'''; DROP ROLE x; --\\'");
    }

    #[test]
    fn test_password_is_redacted_for_display() {
        let statement = Statement::CreateRole {
            name: ident("alice"),
            password: Secret::new("hunter2"),
        };
        assert_eq!(
            statement.sql(),
            r#"CREATE ROLE "alice" LOGIN ENCRYPTED PASSWORD 'hunter2'"#
        );
        assert_eq!(
            statement.to_string(),
            r#"CREATE ROLE "alice" LOGIN ENCRYPTED PASSWORD '***'"#
        );
        let err = DdlError::new(&statement, None, "boom");
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn test_rendered_ddl() {
        assert_eq!(
            Statement::RenameSchema {
                from: ident("s1"),
                to: ident("s2")
            }
            .sql(),
            r#"ALTER SCHEMA "s1" RENAME TO "s2""#
        );
        assert_eq!(
            Statement::DropExtension {
                name: ident("pgcrypto")
            }
            .sql(),
            r#"DROP EXTENSION IF EXISTS "pgcrypto" CASCADE"#
        );
        assert_eq!(
            Statement::CreateDatabase {
                name: ident("alice"),
                owner: ident("alice")
            }
            .sql(),
            r#"CREATE DATABASE "alice" OWNER "alice""#
        );
    }

    #[test]
    fn test_duplicate_detection_and_codes() {
        let err = DdlError::new("CREATE ROLE a", Some("42710".to_string()), "exists");
        assert!(err.is_duplicate());
        assert_eq!(err.code(), ErrorCodes::AlreadyExists);
        let err = DdlError::new("DROP ROLE a", Some("2BP01".to_string()), "in use");
        assert!(!err.is_duplicate());
        assert_eq!(err.code(), ErrorCodes::FailedPrecondition);
    }

    #[test]
    fn test_lookup_binds() {
        let lookup = CatalogLookup::Membership {
            role: ident("alice"),
            member: ident("postgres"),
        };
        assert_eq!(lookup.binds(), vec!["alice", "postgres"]);
        assert!(lookup.query().contains("pg_auth_members"));
    }
}
